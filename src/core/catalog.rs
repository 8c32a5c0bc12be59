use crate::error::{AppError, AppResult};
use crate::logging::{log, LogLevel};
use crate::model::common::{deserialize_flexible_string, deserialize_flexible_u64};
use crate::model::entity::EntityId;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogEntry {
    pub ticker: Option<String>,
    pub name: Option<String>,
}

/// Distinct canonical entity IDs with whatever ticker/name the catalog offered for them.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: BTreeMap<EntityId, CatalogEntry>,
    declared_total: Option<u64>,
}

impl Catalog {
    pub fn from_ids<I: IntoIterator<Item = EntityId>>(ids: I) -> Self {
        Catalog {
            entries: ids
                .into_iter()
                .map(|id| (id, CatalogEntry::default()))
                .collect(),
            declared_total: None,
        }
    }

    /// Sorted ascending, no duplicates.
    pub fn ids(&self) -> Vec<EntityId> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &EntityId) -> Option<&CatalogEntry> {
        self.entries.get(id)
    }

    /// `metadata.total_companies` when the file declares it, else the number of distinct IDs.
    pub fn total_declared(&self) -> u64 {
        self.declared_total.unwrap_or(self.entries.len() as u64)
    }
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum CatalogFile {
    Database {
        #[serde(default)]
        metadata: Option<CatalogMetadata>,
        companies: Vec<CompanyRecord>,
    },
    Records(Vec<CompanyRecord>),
    TickerMap(BTreeMap<String, CompanyRecord>),
}

#[derive(Deserialize, Debug, Default)]
struct CatalogMetadata {
    #[serde(default, deserialize_with = "deserialize_flexible_u64")]
    total_companies: Option<u64>,
}

#[derive(Deserialize, Debug, Default)]
struct CompanyRecord {
    #[serde(default, alias = "cik_str", deserialize_with = "deserialize_flexible_string")]
    cik: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    cik_raw: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    ticker: Option<String>,
    #[serde(
        default,
        alias = "title",
        alias = "name",
        deserialize_with = "deserialize_flexible_string"
    )]
    company_name: Option<String>,
}

/// Reads the catalog at `path`. Any unreadable file or unparseable identifier is fatal.
pub async fn load_catalog(path: &Path) -> AppResult<Catalog> {
    let bytes = fs::read(path)
        .await
        .map_err(|e| AppError::catalog(path, format!("cannot read file: {}", e)))?;
    let catalog = parse_catalog(&bytes).map_err(|reason| AppError::catalog(path, reason))?;

    log(
        LogLevel::Success,
        &format!(
            "Loaded {} unique entity ID(s) from catalog '{}'.",
            catalog.len(),
            path.display()
        ),
    );
    Ok(catalog)
}

fn parse_catalog(bytes: &[u8]) -> Result<Catalog, String> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| format!("invalid JSON: {}", e))?;
    let file: CatalogFile = serde_json::from_value(value)
        .map_err(|_| "unrecognised layout; expected {\"companies\": [...]}, an array of records, or a ticker map".to_string())?;

    let (declared_total, records): (Option<u64>, Vec<CompanyRecord>) = match file {
        CatalogFile::Database {
            metadata,
            companies,
        } => (metadata.and_then(|m| m.total_companies), companies),
        CatalogFile::Records(records) => (None, records),
        CatalogFile::TickerMap(map) => (None, map.into_values().collect()),
    };

    let mut entries: BTreeMap<EntityId, CatalogEntry> = BTreeMap::new();
    let mut skipped = 0usize;
    for (index, record) in records.into_iter().enumerate() {
        let Some(raw_id) = record.cik.or(record.cik_raw) else {
            skipped += 1;
            continue;
        };
        let id = EntityId::parse(&raw_id)
            .map_err(|e| format!("record #{}: {}", index, e))?;
        entries.entry(id).or_insert(CatalogEntry {
            ticker: record.ticker.map(|t| t.to_uppercase()),
            name: record.company_name,
        });
    }

    if skipped > 0 {
        log(
            LogLevel::Warning,
            &format!("Catalog: skipped {} record(s) without an identifier.", skipped),
        );
    }
    if entries.is_empty() {
        log(
            LogLevel::Warning,
            "Catalog contains no entity identifiers; nothing to download.",
        );
    }

    Ok(Catalog {
        entries,
        declared_total,
    })
}
