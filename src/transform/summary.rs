use crate::logging::{log, LogLevel};
use crate::model::entity::EntityId;
use crate::model::submission::{FormerName, SubmissionDocument};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Derived per-entity record written next to the full payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionSummary {
    pub cik: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub sic: Option<String>,
    #[serde(default)]
    pub sic_description: Option<String>,
    #[serde(default)]
    pub state_of_incorporation: Option<String>,
    #[serde(default)]
    pub state_of_incorporation_description: Option<String>,
    #[serde(default)]
    pub fiscal_year_end: Option<String>,
    #[serde(default)]
    pub tickers: Vec<String>,
    #[serde(default)]
    pub exchanges: Vec<String>,
    #[serde(default)]
    pub ein: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub investor_website: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub flags: Option<String>,
    #[serde(default)]
    pub former_names: Vec<FormerName>,
    #[serde(rename = "filings_count", default)]
    pub filings_count: usize,
    #[serde(rename = "download_timestamp", default)]
    pub download_timestamp: String,
}

/// Extracts the summary. A payload with unexpected shapes yields an empty summary, never an error.
pub fn summarize(id: &EntityId, payload: &Value, fetched_at: DateTime<Utc>) -> SubmissionSummary {
    let parsed = if payload.is_object() {
        SubmissionDocument::from_value(payload).map_err(|e| e.to_string())
    } else {
        Err("payload is not a JSON object".to_string())
    };
    let doc = match parsed {
        Ok(doc) => doc,
        Err(e) => {
            log(
                LogLevel::Warning,
                &format!(
                    "Summary [{}] - payload fields not understood ({}); writing empty summary.",
                    id, e
                ),
            );
            SubmissionDocument::default()
        }
    };
    let filings_count = doc.filings_count();

    SubmissionSummary {
        cik: id.to_string(),
        name: doc.name,
        entity_type: doc.entity_type,
        sic: doc.sic,
        sic_description: doc.sic_description,
        state_of_incorporation: doc.state_of_incorporation,
        state_of_incorporation_description: doc.state_of_incorporation_description,
        fiscal_year_end: doc.fiscal_year_end,
        tickers: doc.tickers,
        exchanges: doc.exchanges,
        ein: doc.ein,
        description: doc.description,
        website: doc.website,
        investor_website: doc.investor_website,
        category: doc.category,
        phone: doc.phone,
        flags: doc.flags,
        former_names: doc.former_names,
        filings_count,
        download_timestamp: fetched_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    }
}
