use crate::core::ledger::RunLedger;
use crate::core::report::{self, RoundStats};
use crate::core::task::FetchTask;
use crate::logging::{log, LogLevel};
use crate::model::entity::EntityId;
use crate::model::outcome::FetchOutcome;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// One pass over `pending` with at most `workers` tasks alive at any instant.
///
/// IDs not yet submitted when `token` fires or `deadline` passes are left untouched in the
/// ledger's pending set. Tasks already running are allowed to finish.
pub async fn run_round(
    task: &FetchTask,
    ledger: &Arc<RunLedger>,
    pending: Vec<EntityId>,
    workers: usize,
    token: &CancellationToken,
    deadline: Option<Instant>,
    round: u32,
) -> Vec<FetchOutcome> {
    let mut stats = RoundStats {
        total_tasks: pending.len(),
        ..Default::default()
    };
    let log_interval = std::cmp::max(10, (pending.len() / 10).max(1));
    let mut outcomes = Vec::with_capacity(pending.len());

    let gate = token.clone();
    let mut in_flight = stream::iter(pending)
        .take_while(move |_| {
            let open = !gate.is_cancelled() && deadline.map_or(true, |d| Instant::now() < d);
            futures::future::ready(open)
        })
        .map(|id| {
            let task = task.clone();
            let ledger = ledger.clone();
            let handle_id = id.clone();
            let handle = tokio::spawn(async move {
                let outcome = task.run(id).await;
                ledger.record(outcome.clone());
                outcome
            });
            async move { (handle_id, handle.await) }
        })
        .buffer_unordered(workers.max(1));

    while let Some((id, joined)) = in_flight.next().await {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                log(
                    LogLevel::Error,
                    &format!("Fetch task for CIK {} panicked: {}", id, e),
                );
                let outcome = FetchOutcome::failed(id, format!("task aborted: {}", e), 1);
                ledger.record(outcome.clone());
                outcome
            }
        };

        stats.add(&outcome);
        let processed = stats.get_processed();
        if processed % log_interval == 0 || processed == stats.total_tasks {
            report::log_progress(round, &stats);
        }
        outcomes.push(outcome);
    }

    if outcomes.len() < stats.total_tasks {
        let why = if token.is_cancelled() {
            "cancelled"
        } else {
            "time limit reached"
        };
        log(
            LogLevel::Warning,
            &format!(
                "Round {} {}: {} of {} CIK(s) were never submitted.",
                round,
                why,
                stats.total_tasks - outcomes.len(),
                stats.total_tasks
            ),
        );
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::SubmissionFetcher;
    use crate::config::RetryPolicy;
    use crate::core::storage::PartitionStore;
    use crate::error::{AppError, AppResult};
    use crate::model::partition::RunPartition;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Gauge {
        live: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl SubmissionFetcher for Gauge {
        async fn fetch(&self, id: &EntityId) -> AppResult<Value> {
            let now = self.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.live.fetch_sub(1, Ordering::SeqCst);
            if id.as_str().ends_with('7') {
                return Err(AppError::Transport("HTTP 503".into()));
            }
            Ok(json!({"cik": id.as_str()}))
        }
    }

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            polite_delay: Duration::ZERO,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_exceeds_worker_bound() {
        let tmp = tempfile::tempdir().unwrap();
        let gauge = Arc::new(Gauge::default());
        let token = CancellationToken::new();
        let task = FetchTask::new(
            gauge.clone(),
            PartitionStore::new(tmp.path(), RunPartition::parse("20240501").unwrap()),
            quick_policy(),
            token.clone(),
        );
        let ids: Vec<EntityId> = (1..=20).map(|n| EntityId::from_number(n).unwrap()).collect();
        let ledger = Arc::new(RunLedger::new(ids.clone()));

        let outcomes = run_round(&task, &ledger, ids, 3, &token, None, 1).await;

        assert_eq!(outcomes.len(), 20);
        assert!(gauge.peak.load(Ordering::SeqCst) <= 3);
        let counts = ledger.counts();
        assert_eq!(counts.failed, 2); // 7 and 17
        assert_eq!(counts.completed, 18);
    }

    #[tokio::test]
    async fn cancelled_round_submits_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let gauge = Arc::new(Gauge::default());
        let token = CancellationToken::new();
        token.cancel();
        let task = FetchTask::new(
            gauge,
            PartitionStore::new(tmp.path(), RunPartition::parse("20240501").unwrap()),
            quick_policy(),
            token.clone(),
        );
        let ids = vec![EntityId::from_number(1).unwrap()];
        let ledger = Arc::new(RunLedger::new(ids.clone()));

        assert!(run_round(&task, &ledger, ids, 2, &token, None, 1).await.is_empty());
        assert_eq!(ledger.counts().pending, 1);
    }

    #[tokio::test]
    async fn passed_deadline_submits_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let gauge = Arc::new(Gauge::default());
        let token = CancellationToken::new();
        let task = FetchTask::new(
            gauge.clone(),
            PartitionStore::new(tmp.path(), RunPartition::parse("20240501").unwrap()),
            quick_policy(),
            token.clone(),
        );
        let ids: Vec<EntityId> = (1..=3).map(|n| EntityId::from_number(n).unwrap()).collect();
        let ledger = Arc::new(RunLedger::new(ids.clone()));

        let outcomes = run_round(&task, &ledger, ids, 2, &token, Some(Instant::now()), 1).await;

        assert!(outcomes.is_empty());
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 0);
        assert_eq!(ledger.counts().pending, 3);
    }
}
