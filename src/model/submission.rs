use crate::model::common::{
    deserialize_flexible_string, deserialize_flexible_u64, deserialize_string_list,
};
use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The fields of a submissions document the summary cares about. Everything is optional.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionDocument {
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    pub cik: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    pub entity_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    pub sic: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    pub sic_description: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    pub state_of_incorporation: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    pub state_of_incorporation_description: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    pub fiscal_year_end: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_list")]
    pub tickers: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_string_list")]
    pub exchanges: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    pub ein: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    pub website: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    pub investor_website: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    pub flags: Option<String>,
    #[serde(default, deserialize_with = "deserialize_former_names")]
    pub former_names: Vec<FormerName>,
    #[serde(default, deserialize_with = "deserialize_filings")]
    pub filings: Option<Filings>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct FormerName {
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    pub from: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    pub to: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Filings {
    #[serde(default)]
    pub recent: Option<RecentFilings>,
}

/// `recent` is normally columnar (one array per field); some payloads send one object per filing.
#[derive(Debug, Clone)]
pub enum RecentFilings {
    Columnar { accession_numbers: usize },
    Rows(usize),
    Unknown,
}

impl RecentFilings {
    pub fn count(&self) -> usize {
        match self {
            RecentFilings::Columnar { accession_numbers } => *accession_numbers,
            RecentFilings::Rows(n) => *n,
            RecentFilings::Unknown => 0,
        }
    }
}

impl<'de> Deserialize<'de> for RecentFilings {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Object(map) => match map.get("accessionNumber") {
                Some(Value::Array(arr)) => RecentFilings::Columnar {
                    accession_numbers: arr.len(),
                },
                Some(Value::String(s)) if !s.trim().is_empty() => RecentFilings::Columnar {
                    accession_numbers: 1,
                },
                _ => RecentFilings::Unknown,
            },
            Value::Array(rows) => RecentFilings::Rows(rows.len()),
            _ => RecentFilings::Unknown,
        })
    }
}

fn deserialize_former_names<'de, D>(deserializer: D) -> Result<Vec<FormerName>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter(Value::is_object)
            .filter_map(|item| serde_json::from_value::<FormerName>(item).ok())
            .collect()),
        Value::Object(_) => Ok(serde_json::from_value::<FormerName>(value)
            .into_iter()
            .collect()),
        _ => Ok(Vec::new()),
    }
}

/// A `filings` value that is not an object is treated as absent rather than failing the document.
fn deserialize_filings<'de, D>(deserializer: D) -> Result<Option<Filings>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if !value.is_object() {
        return Ok(None);
    }
    Ok(serde_json::from_value::<Filings>(value).ok())
}

impl SubmissionDocument {
    pub fn filings_count(&self) -> usize {
        self.filings
            .as_ref()
            .and_then(|f| f.recent.as_ref())
            .map_or(0, RecentFilings::count)
    }

    pub fn from_value(payload: &Value) -> Result<Self, serde_json::Error> {
        SubmissionDocument::deserialize(payload)
    }
}
