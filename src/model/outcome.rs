use crate::model::entity::EntityId;
use serde::Serialize;
use std::path::Path;

/// Result of one entity's fetch task within a round. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchOutcome {
    #[serde(rename = "cik")]
    entity_id: EntityId,
    success: bool,
    #[serde(rename = "company_name")]
    display_name: String,
    #[serde(rename = "file_path")]
    resource_path: String,
    error_message: String,
    attempt_count: u32,
}

impl FetchOutcome {
    /// Found on disk from an earlier run in the same partition; no request was made.
    pub fn resumed(entity_id: EntityId, path: &Path, display_name: Option<String>) -> Self {
        FetchOutcome {
            entity_id,
            success: true,
            display_name: display_name.unwrap_or_default(),
            resource_path: path.display().to_string(),
            error_message: String::new(),
            attempt_count: 0,
        }
    }

    pub fn fetched(
        entity_id: EntityId,
        path: &Path,
        display_name: Option<String>,
        attempt_count: u32,
    ) -> Self {
        FetchOutcome {
            entity_id,
            success: true,
            display_name: display_name.unwrap_or_default(),
            resource_path: path.display().to_string(),
            error_message: String::new(),
            attempt_count: attempt_count.max(1),
        }
    }

    pub fn failed(entity_id: EntityId, error_message: String, attempt_count: u32) -> Self {
        let error_message = if error_message.trim().is_empty() {
            "unknown error".to_string()
        } else {
            error_message
        };
        FetchOutcome {
            entity_id,
            success: false,
            display_name: String::new(),
            resource_path: String::new(),
            error_message,
            attempt_count,
        }
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }
    pub fn success(&self) -> bool {
        self.success
    }
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }
    pub fn error_message(&self) -> &str {
        &self.error_message
    }
    pub fn resource_path(&self) -> &str {
        &self.resource_path
    }
    pub fn display_name(&self) -> &str {
        &self.display_name
    }
    pub fn was_resumed(&self) -> bool {
        self.success && self.attempt_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> EntityId {
        EntityId::parse("320193").unwrap()
    }

    #[test]
    fn error_message_empty_iff_success() {
        let ok = FetchOutcome::fetched(id(), Path::new("/tmp/x.json"), None, 2);
        assert!(ok.success() && ok.error_message().is_empty() && !ok.resource_path().is_empty());

        let bad = FetchOutcome::failed(id(), String::new(), 3);
        assert!(!bad.success() && !bad.error_message().is_empty() && bad.resource_path().is_empty());
    }

    #[test]
    fn only_resumed_outcomes_have_zero_attempts() {
        let resumed = FetchOutcome::resumed(id(), Path::new("/tmp/x.json"), None);
        assert!(resumed.was_resumed());
        let fetched = FetchOutcome::fetched(id(), Path::new("/tmp/x.json"), None, 0);
        assert_eq!(fetched.attempt_count(), 1);
        assert!(!fetched.was_resumed());
    }

    #[test]
    fn serializes_with_report_field_names() {
        let ok = FetchOutcome::fetched(id(), Path::new("p.json"), Some("Apple Inc.".into()), 1);
        let v = serde_json::to_value(&ok).unwrap();
        assert_eq!(v["cik"], "0000320193");
        assert_eq!(v["company_name"], "Apple Inc.");
        assert_eq!(v["file_path"], "p.json");
        assert_eq!(v["attempt_count"], 1);
    }
}
