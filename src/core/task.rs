use crate::api::client::SubmissionFetcher;
use crate::config::RetryPolicy;
use crate::core::storage::PartitionStore;
use crate::error::AppResult;
use crate::logging::{log, LogLevel};
use crate::model::entity::EntityId;
use crate::model::outcome::FetchOutcome;
use crate::transform::summary;
use crate::utils;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Fetch-and-persist for one entity with bounded, strictly sequential retries.
#[derive(Clone)]
pub struct FetchTask {
    fetcher: Arc<dyn SubmissionFetcher>,
    store: PartitionStore,
    policy: RetryPolicy,
    token: CancellationToken,
}

impl FetchTask {
    pub fn new(
        fetcher: Arc<dyn SubmissionFetcher>,
        store: PartitionStore,
        policy: RetryPolicy,
        token: CancellationToken,
    ) -> Self {
        FetchTask {
            fetcher,
            store,
            policy,
            token,
        }
    }

    pub async fn run(&self, id: EntityId) -> FetchOutcome {
        if let Some(path) = self.store.already_done(&id).await {
            let name = self.store.resumed_display_name(&id).await;
            log(
                LogLevel::Debug,
                &format!("CIK {} already stored at {}; skipping.", id, path.display()),
            );
            return FetchOutcome::resumed(id, &path, name);
        }

        let max_attempts = self.policy.max_attempts.max(1);
        let mut errors: Vec<String> = Vec::new();

        for attempt in 1..=max_attempts {
            let result = self.attempt(&id).await;
            // The polite delay follows every request, whatever the result.
            let polite_done = utils::sleep_or_cancel(self.policy.polite_delay, &self.token).await;

            match result {
                Ok((path, name)) => {
                    return FetchOutcome::fetched(id, &path, name, attempt);
                }
                Err(e) => {
                    log(
                        LogLevel::Warning,
                        &format!(
                            "Attempt {}/{} failed for CIK {}: {}",
                            attempt, max_attempts, id, e
                        ),
                    );
                    errors.push(format!("attempt {}: {}", attempt, e));

                    if !e.is_retryable() {
                        return FetchOutcome::failed(id, errors.join("; "), attempt);
                    }
                    if attempt == max_attempts {
                        break;
                    }
                    let backoff_done = polite_done
                        && utils::sleep_or_cancel(self.policy.retry_delay(attempt), &self.token)
                            .await;
                    if !backoff_done {
                        errors.push("cancelled before next attempt".to_string());
                        return FetchOutcome::failed(id, errors.join("; "), attempt);
                    }
                }
            }
        }

        FetchOutcome::failed(id, errors.join("; "), max_attempts)
    }

    async fn attempt(&self, id: &EntityId) -> AppResult<(PathBuf, Option<String>)> {
        let payload = self.fetcher.fetch(id).await?;
        let summary = summary::summarize(id, &payload, Utc::now());
        let name = summary.name.clone();
        let path = self.store.persist(id, payload, summary).await?;
        Ok((path, name))
    }
}
