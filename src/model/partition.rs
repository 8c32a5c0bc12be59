use crate::error::{AppError, AppResult};
use chrono::{Local, NaiveDate};
use std::fmt;

const PARTITION_FORMAT: &str = "%Y%m%d";

/// Date namespace grouping one day's output. Re-running within the same partition resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunPartition {
    date: NaiveDate,
}

impl RunPartition {
    pub fn today() -> Self {
        RunPartition {
            date: Local::now().date_naive(),
        }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        RunPartition { date }
    }

    pub fn parse(raw: &str) -> AppResult<Self> {
        NaiveDate::parse_from_str(raw.trim(), PARTITION_FORMAT)
            .map(Self::from_date)
            .map_err(|e| {
                AppError::Argument(format!(
                    "Partition must look like YYYYMMDD, got '{}': {}",
                    raw, e
                ))
            })
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn key(&self) -> String {
        self.date.format(PARTITION_FORMAT).to_string()
    }
}

impl fmt::Display for RunPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}
