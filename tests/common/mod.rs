#![allow(dead_code)]

use async_trait::async_trait;
use edgar_sync::api::client::SubmissionFetcher;
use edgar_sync::config::{RetryPolicy, RunSettings};
use edgar_sync::error::{AppError, AppResult};
use edgar_sync::model::entity::EntityId;
use edgar_sync::model::partition::RunPartition;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn cik(n: u64) -> EntityId {
    EntityId::from_number(n).unwrap()
}

/// In-memory fetcher with scripted failures, per-ID call counts and a concurrency gauge.
#[derive(Default)]
pub struct ScriptedFetcher {
    fail_first: HashMap<EntityId, usize>,
    always_fail: HashSet<EntityId>,
    latency: Duration,
    calls: Mutex<HashMap<EntityId, usize>>,
    total: AtomicUsize,
    live: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first(mut self, id: EntityId, times: usize) -> Self {
        self.fail_first.insert(id, times);
        self
    }

    pub fn always_failing(mut self, id: EntityId) -> Self {
        self.always_fail.insert(id);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, id: &EntityId) -> usize {
        self.calls.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubmissionFetcher for ScriptedFetcher {
    async fn fetch(&self, id: &EntityId) -> AppResult<Value> {
        let now = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
        let call_no = {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.entry(id.clone()).or_insert(0);
            *n += 1;
            *n
        };

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.live.fetch_sub(1, Ordering::SeqCst);

        let scripted = self.fail_first.get(id).copied().unwrap_or(0);
        if self.always_fail.contains(id) || call_no <= scripted {
            return Err(AppError::Transport(
                "HTTP 503 (Service Unavailable). Body: upstream is overloaded, please slow down".into(),
            ));
        }

        Ok(json!({
            "cik": id.as_str().trim_start_matches('0'),
            "name": format!("Company {}", id),
            "tickers": ["TCK"],
            "exchanges": ["NYSE"],
            "filings": {"recent": {"accessionNumber": ["0001-24-000001", "0001-24-000002"]}}
        }))
    }
}

pub fn fast_settings(root: &Path, workers: usize, attempts: u32, max_rounds: u32) -> RunSettings {
    RunSettings {
        workers,
        retry: RetryPolicy {
            max_attempts: attempts,
            base_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            polite_delay: Duration::ZERO,
        },
        max_rounds,
        max_elapsed: None,
        round_pause: Duration::ZERO,
        output_root: root.to_path_buf(),
        user_agent: "Integration Tests tests@example.test".into(),
        partition: RunPartition::parse("20240501").unwrap(),
        ..RunSettings::default()
    }
}
