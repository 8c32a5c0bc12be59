use crate::error::{AppError, AppResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub const ENTITY_ID_WIDTH: usize = 10;

static ENTITY_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?i:CIK)?\s*(\d+)$").expect("entity id pattern is valid"));

/// Canonical, zero-padded 10 digit CIK. Ordering is numeric because the width is fixed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(String);

impl EntityId {
    pub fn parse(raw: &str) -> AppResult<Self> {
        let trimmed = raw.trim();
        let digits = ENTITY_ID_RE
            .captures(trimmed)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .ok_or_else(|| AppError::InvalidEntityId(raw.to_string()))?;

        let significant = digits.trim_start_matches('0');
        if significant.len() > ENTITY_ID_WIDTH {
            return Err(AppError::InvalidEntityId(raw.to_string()));
        }
        Ok(EntityId(format!(
            "{:0>width$}",
            significant,
            width = ENTITY_ID_WIDTH
        )))
    }

    pub fn from_number(n: u64) -> AppResult<Self> {
        Self::parse(&n.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EntityId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityId::parse(s)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        EntityId::parse(&raw).map_err(serde::de::Error::custom)
    }
}
