use crate::api::client::{SubmissionFetcher, SubmissionsClient};
use crate::config::{RunSettings, SettingsRecord};
use crate::core::catalog::{self, Catalog};
use crate::core::ledger::{LedgerSnapshot, RunLedger};
use crate::core::report::{self, ReportContext, RoundStats};
use crate::core::scheduler;
use crate::core::storage::PartitionStore;
use crate::core::task::FetchTask;
use crate::error::AppResult;
use crate::logging::{log, LogLevel};
use crate::model::entity::EntityId;
use crate::model::outcome::FetchOutcome;
use crate::utils;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A round finished with nothing left to retry.
    Converged,
    RoundLimit,
    TimeLimit,
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::Converged => "all CIKs resolved",
            StopReason::RoundLimit => "round limit reached",
            StopReason::TimeLimit => "time limit reached",
            StopReason::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub snapshot: LedgerSnapshot,
    pub rounds: u32,
    pub stop_reason: StopReason,
    pub folders_on_disk: usize,
    pub results_path: PathBuf,
    pub report_path: PathBuf,
    pub exit_code: i32,
}

/// Bulk mode entry point: load the catalog, fetch everything, report.
pub async fn run_bulk(
    catalog_path: &Path,
    settings: RunSettings,
    token: CancellationToken,
) -> AppResult<i32> {
    settings.validate()?;
    let catalog = catalog::load_catalog(catalog_path).await?;
    let client = SubmissionsClient::new(&settings.url_template, &settings.user_agent)?;
    let summary = run_pipeline(&catalog, Arc::new(client), &settings, token).await?;
    Ok(summary.exit_code)
}

/// Single mode: one entity through the same resume/retry/persist path as bulk mode.
pub async fn run_single(
    raw_id: &str,
    settings: RunSettings,
    token: CancellationToken,
) -> AppResult<i32> {
    settings.validate()?;
    let id = EntityId::parse(raw_id)?;
    let client = SubmissionsClient::new(&settings.url_template, &settings.user_agent)?;
    let store = PartitionStore::new(&settings.output_root, settings.partition);
    let task = FetchTask::new(Arc::new(client), store, settings.retry.clone(), token);

    log(
        LogLevel::Step,
        &format!("Fetching submissions for CIK {} ({})", id, settings.partition),
    );
    let outcome = task.run(id).await;
    if outcome.success() {
        let how = if outcome.was_resumed() {
            "already present"
        } else {
            "downloaded"
        };
        log(
            LogLevel::Success,
            &format!(
                "CIK {} {} ({}) after {} attempt(s).",
                outcome.entity_id(),
                how,
                outcome.display_name(),
                outcome.attempt_count()
            ),
        );
        println!("{}", outcome.resource_path());
        Ok(0)
    } else {
        log(
            LogLevel::Error,
            &format!(
                "CIK {} failed after {} attempt(s): {}",
                outcome.entity_id(),
                outcome.attempt_count(),
                outcome.error_message()
            ),
        );
        Ok(1)
    }
}

/// Records every ID with a usable payload already on disk as completed, before any round starts.
async fn resume_from_disk(
    store: &PartitionStore,
    ids: Vec<EntityId>,
    ledger: &RunLedger,
    parallelism: usize,
) -> usize {
    stream::iter(ids)
        .map(|id| async move {
            let path = store.already_done(&id).await?;
            let name = store.resumed_display_name(&id).await;
            Some(FetchOutcome::resumed(id, &path, name))
        })
        .buffer_unordered(parallelism.max(1) * 4)
        .filter_map(futures::future::ready)
        .fold(0usize, |count, outcome| {
            ledger.record(outcome);
            futures::future::ready(count + 1)
        })
        .await
}

/// Runs rounds over the catalog until convergence or a stop condition, then writes the report.
pub async fn run_pipeline(
    catalog: &Catalog,
    fetcher: Arc<dyn SubmissionFetcher>,
    settings: &RunSettings,
    token: CancellationToken,
) -> AppResult<RunSummary> {
    let overall_start_time = Instant::now();
    let store = PartitionStore::new(&settings.output_root, settings.partition);

    log(
        LogLevel::Step,
        &format!(
            "Starting submissions download for {} CIK(s) at {}",
            catalog.len(),
            Utc::now().format("%Y-%m-%d %H:%M:%S %Z")
        ),
    );
    log(
        LogLevel::Info,
        &format!("Output Directory: {}", store.partition_dir().display()),
    );
    log(
        LogLevel::Info,
        &format!(
            "Workers: {}, retry attempts: {}, delay: {:?}, polite delay: {:?}, backoff x{}, max rounds: {}",
            settings.workers,
            settings.retry.max_attempts,
            settings.retry.base_delay,
            settings.retry.polite_delay,
            settings.retry.backoff_multiplier,
            settings.max_rounds
        ),
    );

    let task = FetchTask::new(fetcher, store.clone(), settings.retry.clone(), token.clone());
    let ledger = Arc::new(RunLedger::new(catalog.ids()));
    let resumed = resume_from_disk(&store, catalog.ids(), &ledger, settings.workers).await;
    if resumed > 0 {
        log(
            LogLevel::Info,
            &format!(
                "{} of {} CIK(s) already stored in partition {}; skipping them.",
                resumed,
                catalog.len(),
                settings.partition
            ),
        );
    }
    let mut pending = ledger.pending();
    let mut rounds = 0u32;
    let deadline = settings
        .max_elapsed
        .and_then(|limit| overall_start_time.checked_add(limit));

    let stop_reason = loop {
        if pending.is_empty() {
            break StopReason::Converged;
        }
        if token.is_cancelled() {
            break StopReason::Cancelled;
        }

        rounds += 1;
        let round_start = Instant::now();
        log(
            LogLevel::Step,
            &format!("--- Round {}: {} CIK(s) pending ---", rounds, pending.len()),
        );
        let submitted = pending.len();
        let outcomes = scheduler::run_round(
            &task,
            &ledger,
            pending,
            settings.workers,
            &token,
            deadline,
            rounds,
        )
        .await;

        let mut stats = RoundStats {
            total_tasks: submitted,
            ..Default::default()
        };
        outcomes.iter().for_each(|o| stats.add(o));
        report::log_round_completion(rounds, &stats, round_start.elapsed());

        if token.is_cancelled() {
            break StopReason::Cancelled;
        }
        pending = ledger.advance_round();
        if pending.is_empty() {
            break StopReason::Converged;
        }
        if rounds >= settings.max_rounds {
            break StopReason::RoundLimit;
        }
        if deadline.map_or(false, |d| Instant::now() >= d) {
            break StopReason::TimeLimit;
        }

        log(
            LogLevel::Info,
            &format!(
                "{} CIK(s) failed this round; retrying in {:?}.",
                pending.len(),
                settings.round_pause
            ),
        );
        if !utils::sleep_or_cancel(settings.round_pause, &token).await {
            break StopReason::Cancelled;
        }
    };

    let level = if stop_reason == StopReason::Converged {
        LogLevel::Success
    } else {
        LogLevel::Warning
    };
    log(
        level,
        &format!("Stopped after {} round(s): {}.", rounds, stop_reason),
    );

    let snapshot = ledger.finish();
    let folders_on_disk = match store.count_entity_folders().await {
        Ok(n) => n,
        Err(e) => {
            log(
                LogLevel::Warning,
                &format!("Could not count entity folders: {}", e),
            );
            snapshot.completed.len()
        }
    };
    if folders_on_disk != snapshot.completed.len() {
        log(
            LogLevel::Warning,
            &format!(
                "Folder count on disk ({}) differs from completed CIKs in this run ({}).",
                folders_on_disk,
                snapshot.completed.len()
            ),
        );
    }

    let ctx = ReportContext {
        catalog,
        snapshot: &snapshot,
        settings: SettingsRecord::from(settings),
        partition_key: settings.partition.key(),
        folders_on_disk,
        rounds,
        cancelled: stop_reason == StopReason::Cancelled,
        generated_at: Utc::now(),
    };
    let (results_path, report_path) = report::write_artifacts(&store, &ctx).await?;
    report::print_summary(&ctx, overall_start_time.elapsed());
    let exit_code = report::determine_exit_code(&snapshot);

    Ok(RunSummary {
        snapshot,
        rounds,
        stop_reason,
        folders_on_disk,
        results_path,
        report_path,
        exit_code,
    })
}
