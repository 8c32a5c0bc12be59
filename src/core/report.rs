use crate::config::{self, SettingsRecord};
use crate::core::catalog::Catalog;
use crate::core::ledger::LedgerSnapshot;
use crate::core::storage::PartitionStore;
use crate::error::AppResult;
use crate::io;
use crate::logging::{log, LogLevel};
use crate::model::entity::EntityId;
use crate::model::outcome::FetchOutcome;
use crate::utils;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;

/// Per-round tallies used for progress lines.
#[derive(Debug, Clone, Default)]
pub struct RoundStats {
    pub ok: usize,
    pub fail: usize,
    pub resumed: usize,
    pub total_tasks: usize,
}

impl RoundStats {
    pub fn add(&mut self, outcome: &FetchOutcome) {
        if outcome.was_resumed() {
            self.resumed += 1;
        } else if outcome.success() {
            self.ok += 1;
        } else {
            self.fail += 1;
        }
    }
    pub fn get_processed(&self) -> usize {
        self.ok + self.fail + self.resumed
    }
}

pub fn log_progress(round: u32, stats: &RoundStats) {
    if stats.total_tasks == 0 {
        return;
    }
    let processed = stats.get_processed();
    let percentage = (processed as f32 / stats.total_tasks.max(1) as f32) * 100.0;
    log(
        LogLevel::Info,
        &format!(
            "Round {} progress: {}/{} ({:.1}%) [OK: {}, Resumed: {}, Fail: {}]",
            round, processed, stats.total_tasks, percentage, stats.ok, stats.resumed, stats.fail
        ),
    );
}

pub fn log_round_completion(round: u32, stats: &RoundStats, elapsed: Duration) {
    let level = if stats.fail > 0 {
        LogLevel::Warning
    } else {
        LogLevel::Success
    };
    log(
        level,
        &format!(
            "--- Round {} complete ({} OK, {} Resumed, {} Fail / {} Submitted) | Elapsed: {:?} ---",
            round, stats.ok, stats.resumed, stats.fail, stats.total_tasks, elapsed
        ),
    );
}

/// Everything the end-of-run artifacts are built from.
pub struct ReportContext<'a> {
    pub catalog: &'a Catalog,
    pub snapshot: &'a LedgerSnapshot,
    pub settings: SettingsRecord,
    pub partition_key: String,
    pub folders_on_disk: usize,
    pub rounds: u32,
    pub cancelled: bool,
    pub generated_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct ResultsFile<'a> {
    timestamp: String,
    partition: &'a str,
    total_ciks: usize,
    successful: usize,
    failed: usize,
    resumed: usize,
    rounds: u32,
    cancelled: bool,
    folders_on_disk: usize,
    settings: &'a SettingsRecord,
    results: &'a [FetchOutcome],
}

impl ReportContext<'_> {
    fn succeeded(&self) -> usize {
        self.snapshot.completed.len()
    }

    fn failed(&self) -> usize {
        self.snapshot.unresolved.len()
    }

    pub fn results_json(&self) -> AppResult<Vec<u8>> {
        let file = ResultsFile {
            timestamp: self.generated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            partition: &self.partition_key,
            total_ciks: self.catalog.len(),
            successful: self.succeeded(),
            failed: self.failed(),
            resumed: self.snapshot.resumed_count(),
            rounds: self.rounds,
            cancelled: self.cancelled,
            folders_on_disk: self.folders_on_disk,
            settings: &self.settings,
            results: &self.snapshot.outcomes,
        };
        Ok(serde_json::to_vec_pretty(&file)?)
    }

    fn ticker(&self, id: &EntityId) -> String {
        self.catalog
            .get(id)
            .and_then(|e| e.ticker.clone())
            .unwrap_or_else(|| "N/A".to_string())
    }

    fn display_name(&self, id: &EntityId, outcome: Option<&FetchOutcome>) -> String {
        outcome
            .map(FetchOutcome::display_name)
            .filter(|n| !n.trim().is_empty())
            .map(str::to_string)
            .or_else(|| self.catalog.get(id).and_then(|e| e.name.clone()))
            .unwrap_or_else(|| "Unknown".to_string())
    }

    /// Markdown status report: summary statistics, then succeeded and failed tables sorted by ID.
    pub fn render_markdown(&self) -> String {
        let latest = self.snapshot.latest_outcomes();
        let declared = self.catalog.total_declared();
        let mut out = String::new();

        let _ = writeln!(out, "# SEC Submissions Download Report - {}\n", self.partition_key);
        let _ = writeln!(out, "## Summary Statistics\n");
        let _ = writeln!(out, "- **Total Companies in Database**: {}", declared);
        let _ = writeln!(out, "- **Total Folders Created**: {}", self.folders_on_disk);
        let _ = writeln!(out, "- **Successfully Downloaded**: {}", self.succeeded());
        let _ = writeln!(out, "- **Failed Downloads**: {}", self.failed());
        let _ = writeln!(
            out,
            "- **Already Present Before Run**: {}",
            self.snapshot.resumed_count()
        );
        let _ = writeln!(out, "- **Download Rounds**: {}", self.rounds);
        if self.cancelled {
            let _ = writeln!(out, "- **Run Cancelled**: yes");
        }
        let _ = writeln!(
            out,
            "- **Download Date**: {}",
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        if declared > 0 {
            let rate = self.folders_on_disk as f64 / declared as f64 * 100.0;
            let _ = writeln!(out, "- **Completion Rate**: {:.2}%", rate);
        }

        let _ = writeln!(out, "\n## Downloaded Companies\n");
        let _ = writeln!(out, "| CIK | Ticker | Company Name | Status |");
        let _ = writeln!(out, "|-----|--------|--------------|--------|");
        for id in &self.snapshot.completed {
            let outcome = latest.get(id).copied();
            let status = if outcome.map_or(false, FetchOutcome::was_resumed) {
                "✅ Already present"
            } else {
                "✅ Downloaded"
            };
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} |",
                id,
                cell(&self.ticker(id)),
                cell(&self.display_name(id, outcome)),
                status
            );
        }

        if !self.snapshot.unresolved.is_empty() {
            let _ = writeln!(out, "\n## Failed Downloads\n");
            let _ = writeln!(out, "| CIK | Ticker | Company Name | Error |");
            let _ = writeln!(out, "|-----|--------|--------------|-------|");
            for id in &self.snapshot.unresolved {
                let outcome = latest.get(id).copied();
                let error = outcome
                    .map(|o| o.error_message().to_string())
                    .unwrap_or_else(|| "not attempted before the run stopped".to_string());
                let _ = writeln!(
                    out,
                    "| {} | {} | {} | {} |",
                    id,
                    cell(&self.ticker(id)),
                    cell(&self.display_name(id, outcome)),
                    cell(&utils::truncate_chars(&error, config::ERROR_SNIPPET_LEN))
                );
            }
        }
        out
    }
}

fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\n', '\r'], " ")
}

pub async fn write_artifacts(
    store: &PartitionStore,
    ctx: &ReportContext<'_>,
) -> AppResult<(PathBuf, PathBuf)> {
    io::ensure_dir(&store.partition_dir()).await?;

    let results_path = store.results_path();
    io::write_file_async(&results_path, &ctx.results_json()?).await?;
    log(
        LogLevel::Info,
        &format!("Download results saved to: {}", results_path.display()),
    );

    let report_path = store.report_path();
    io::save_text(&report_path, &ctx.render_markdown(), "Status Report").await?;
    log(
        LogLevel::Info,
        &format!("Status report created: {}", report_path.display()),
    );
    Ok((results_path, report_path))
}

pub fn print_summary(ctx: &ReportContext<'_>, duration: Duration) {
    let sep = "=".repeat(60);
    println!("\n{}\n{:^60}\n{}", sep, "Final Summary", sep);
    println!("Partition:         {}", ctx.partition_key);
    println!("Total Run Time:    {:.3?}", duration);
    println!("{}", "-".repeat(60));
    println!("{:<28} {:>10}", "Total CIKs processed", ctx.catalog.len());
    println!("{:<28} {:>10}", "Successfully downloaded", ctx.succeeded());
    println!("{:<28} {:>10}", "Already existed", ctx.snapshot.resumed_count());
    println!("{:<28} {:>10}", "Failed downloads", ctx.failed());
    println!("{:<28} {:>10}", "Folders on disk", ctx.folders_on_disk);
    println!("{:<28} {:>10}", "Rounds", ctx.rounds);
    println!("{}", sep);

    if ctx.failed() > 0 {
        let latest = ctx.snapshot.latest_outcomes();
        println!("Failed CIKs:");
        for id in &ctx.snapshot.unresolved {
            let msg = latest
                .get(id)
                .map(|o| o.error_message().to_string())
                .unwrap_or_else(|| "not attempted".to_string());
            println!("  {}: {}", id, utils::truncate_chars(&msg, config::ERROR_SNIPPET_LEN));
        }
        log(
            LogLevel::Error,
            &format!(
                "Run completed with {} unresolved CIK(s). Check the status report.",
                ctx.failed()
            ),
        );
    } else if ctx.cancelled {
        log(LogLevel::Warning, "Run cancelled before all CIKs were attempted.");
    } else {
        log(LogLevel::Success, "All downloads completed successfully!");
    }

    log(
        LogLevel::Step,
        &format!(
            "--- Run Finished at {} ---",
            Utc::now().format("%Y-%m-%d %H:%M:%S %Z")
        ),
    );
}

pub fn determine_exit_code(snapshot: &LedgerSnapshot) -> i32 {
    if snapshot.unresolved.is_empty() {
        0
    } else {
        1
    }
}
