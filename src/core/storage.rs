use crate::config;
use crate::error::{AppError, AppResult};
use crate::io;
use crate::logging::{log, LogLevel};
use crate::model::entity::EntityId;
use crate::model::partition::RunPartition;
use crate::transform::summary::SubmissionSummary;
use serde::de::IgnoredAny;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// On-disk layout of one partition:
///
/// ```text
/// <root>/<YYYYMMDD>/CIK/<cik>/submissions.json
/// <root>/<YYYYMMDD>/CIK/<cik>/summary.json
/// <root>/<YYYYMMDD>/download_results.json
/// <root>/<YYYYMMDD>/<YYYYMMDD>.md
/// ```
///
/// Distinct IDs map to distinct directories, so nothing here needs a lock.
#[derive(Debug, Clone)]
pub struct PartitionStore {
    root: PathBuf,
    partition: RunPartition,
}

impl PartitionStore {
    pub fn new<P: Into<PathBuf>>(root: P, partition: RunPartition) -> Self {
        PartitionStore {
            root: root.into(),
            partition,
        }
    }

    pub fn partition_dir(&self) -> PathBuf {
        self.root.join(self.partition.key())
    }

    pub fn entities_dir(&self) -> PathBuf {
        self.partition_dir().join(config::ENTITY_DIR)
    }

    pub fn entity_dir(&self, id: &EntityId) -> PathBuf {
        self.entities_dir().join(id.as_str())
    }

    pub fn payload_path(&self, id: &EntityId) -> PathBuf {
        self.entity_dir(id).join(config::PAYLOAD_FILE)
    }

    pub fn summary_path(&self, id: &EntityId) -> PathBuf {
        self.entity_dir(id).join(config::SUMMARY_FILE)
    }

    pub fn results_path(&self) -> PathBuf {
        self.partition_dir().join(config::RESULTS_FILE)
    }

    pub fn report_path(&self) -> PathBuf {
        self.partition_dir()
            .join(format!("{}.md", self.partition.key()))
    }

    /// Path of a usable payload from an earlier fetch in this partition, if any.
    ///
    /// Zero-length, unreadable or malformed files count as not done, so the entity is fetched again.
    pub async fn already_done(&self, id: &EntityId) -> Option<PathBuf> {
        let path = self.payload_path(id);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                log(
                    LogLevel::Warning,
                    &format!(
                        "Resume [{}] - stored payload unreadable ({}); fetching again.",
                        id, e
                    ),
                );
                return None;
            }
        };

        if bytes.is_empty() {
            log(
                LogLevel::Warning,
                &format!("Resume [{}] - stored payload is empty; fetching again.", id),
            );
            return None;
        }

        if let Err(e) = serde_json::from_slice::<IgnoredAny>(&bytes) {
            log(
                LogLevel::Warning,
                &format!(
                    "Resume [{}] - stored payload is not valid JSON ({}); fetching again.",
                    id, e
                ),
            );
            return None;
        }

        Some(path)
    }

    /// Best-effort company name from a stored summary.
    pub async fn resumed_display_name(&self, id: &EntityId) -> Option<String> {
        let bytes = fs::read(self.summary_path(id)).await.ok()?;
        serde_json::from_slice::<SubmissionSummary>(&bytes)
            .ok()
            .and_then(|s| s.name)
    }

    /// Writes the summary, then the payload. A present payload therefore implies a present summary.
    pub async fn persist(
        &self,
        id: &EntityId,
        payload: Value,
        summary: SubmissionSummary,
    ) -> AppResult<PathBuf> {
        let dir = self.entity_dir(id);
        io::ensure_dir(&dir).await.map_err(into_persist)?;

        let summary_path = self.summary_path(id);
        io::save_json(&summary_path, summary, &format!("Summary [{}]", id))
            .await
            .map_err(into_persist)?;

        let payload_path = self.payload_path(id);
        io::save_json(&payload_path, payload, &format!("Submissions [{}]", id))
            .await
            .map_err(into_persist)?;

        Ok(payload_path)
    }

    /// Counts entity directories holding a non-empty payload, independent of any in-memory state.
    pub async fn count_entity_folders(&self) -> AppResult<usize> {
        let base = self.entities_dir();
        let mut entries = match fs::read_dir(&base).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(io::map_io_error(e, &base)),
        };

        let mut count = 0usize;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io::map_io_error(e, &base))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if !is_dir || EntityId::parse(&entry.file_name().to_string_lossy()).is_err() {
                continue;
            }
            if has_content(&entry.path().join(config::PAYLOAD_FILE)).await {
                count += 1;
            }
        }
        Ok(count)
    }
}

async fn has_content(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

fn into_persist(e: AppError) -> AppError {
    match e {
        AppError::Persist(_) => e,
        other => AppError::Persist(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store(dir: &Path) -> PartitionStore {
        PartitionStore::new(dir, RunPartition::parse("20240501").unwrap())
    }

    #[test]
    fn layout_paths() {
        let s = PartitionStore::new("/data/submissions", RunPartition::parse("20240501").unwrap());
        let id = EntityId::parse("320193").unwrap();
        assert!(s
            .payload_path(&id)
            .ends_with("20240501/CIK/0000320193/submissions.json"));
        assert!(s.summary_path(&id).ends_with("CIK/0000320193/summary.json"));
        assert!(s.results_path().ends_with("20240501/download_results.json"));
        assert!(s.report_path().ends_with("20240501/20240501.md"));
    }

    #[tokio::test]
    async fn persisted_entity_is_resumable() {
        let tmp = tempfile::tempdir().unwrap();
        let s = store(tmp.path());
        let id = EntityId::parse("320193").unwrap();
        assert!(s.already_done(&id).await.is_none());

        let summary = SubmissionSummary {
            cik: id.to_string(),
            name: Some("Apple Inc.".into()),
            ..Default::default()
        };
        let path = s
            .persist(&id, json!({"name": "Apple Inc."}), summary)
            .await
            .unwrap();

        assert_eq!(s.already_done(&id).await, Some(path));
        assert_eq!(s.resumed_display_name(&id).await.as_deref(), Some("Apple Inc."));
        assert_eq!(s.count_entity_folders().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn empty_or_corrupt_payload_fails_open() {
        let tmp = tempfile::tempdir().unwrap();
        let s = store(tmp.path());
        let empty = EntityId::parse("1").unwrap();
        let corrupt = EntityId::parse("2").unwrap();

        for id in [&empty, &corrupt] {
            std::fs::create_dir_all(s.entity_dir(id)).unwrap();
        }
        std::fs::write(s.payload_path(&empty), b"").unwrap();
        std::fs::write(s.payload_path(&corrupt), b"{\"trunc").unwrap();

        assert!(s.already_done(&empty).await.is_none());
        assert!(s.already_done(&corrupt).await.is_none());
        // the corrupt file still has bytes on disk; the empty one does not
        assert_eq!(s.count_entity_folders().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn folder_count_ignores_stray_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let s = store(tmp.path());
        assert_eq!(s.count_entity_folders().await.unwrap(), 0);

        std::fs::create_dir_all(s.entities_dir().join("not-a-cik")).unwrap();
        std::fs::write(s.entities_dir().join("not-a-cik").join(config::PAYLOAD_FILE), b"{}").unwrap();
        std::fs::write(s.entities_dir().join("README"), b"x").unwrap();
        assert_eq!(s.count_entity_folders().await.unwrap(), 0);
    }
}
