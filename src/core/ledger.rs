use crate::model::entity::EntityId;
use crate::model::outcome::FetchOutcome;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct LedgerState {
    completed: BTreeSet<EntityId>,
    failed: BTreeSet<EntityId>,
    pending: BTreeSet<EntityId>,
    outcomes: Vec<FetchOutcome>,
}

/// Run-wide bookkeeping shared by every in-flight task.
///
/// All mutation happens under the one mutex; no guard is ever held across an `.await`.
#[derive(Debug, Default)]
pub struct RunLedger {
    state: Mutex<LedgerState>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerCounts {
    pub completed: usize,
    pub failed: usize,
    pub pending: usize,
    pub outcomes: usize,
}

/// Final state once the run stops. Anything still failed or pending is unresolved.
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    pub completed: BTreeSet<EntityId>,
    pub unresolved: BTreeSet<EntityId>,
    pub outcomes: Vec<FetchOutcome>,
}

impl LedgerSnapshot {
    /// Most recent outcome per entity, keyed (and so sorted) by ID.
    pub fn latest_outcomes(&self) -> BTreeMap<&EntityId, &FetchOutcome> {
        let mut latest = BTreeMap::new();
        for outcome in &self.outcomes {
            latest.insert(outcome.entity_id(), outcome);
        }
        latest
    }

    pub fn resumed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.was_resumed()).count()
    }
}

impl RunLedger {
    pub fn new<I: IntoIterator<Item = EntityId>>(pending: I) -> Self {
        RunLedger {
            state: Mutex::new(LedgerState {
                pending: pending.into_iter().collect(),
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Merges one outcome. Success moves the ID to `completed` for good; failure parks it in `failed`.
    pub fn record(&self, outcome: FetchOutcome) {
        let mut state = self.lock();
        let id = outcome.entity_id().clone();
        state.pending.remove(&id);
        if outcome.success() {
            state.failed.remove(&id);
            state.completed.insert(id);
        } else if !state.completed.contains(&id) {
            state.failed.insert(id);
        }
        state.outcomes.push(outcome);
    }

    /// Round boundary: this round's failures become the next round's pending set.
    pub fn advance_round(&self) -> Vec<EntityId> {
        let mut state = self.lock();
        let failed = std::mem::take(&mut state.failed);
        state.pending.extend(failed);
        state.pending.iter().cloned().collect()
    }

    pub fn pending(&self) -> Vec<EntityId> {
        self.lock().pending.iter().cloned().collect()
    }

    pub fn counts(&self) -> LedgerCounts {
        let state = self.lock();
        LedgerCounts {
            completed: state.completed.len(),
            failed: state.failed.len(),
            pending: state.pending.len(),
            outcomes: state.outcomes.len(),
        }
    }

    /// Drains the ledger into its final snapshot.
    pub fn finish(&self) -> LedgerSnapshot {
        let state = std::mem::take(&mut *self.lock());
        let unresolved = state
            .failed
            .union(&state.pending)
            .filter(|id| !state.completed.contains(*id))
            .cloned()
            .collect();
        LedgerSnapshot {
            completed: state.completed,
            unresolved,
            outcomes: state.outcomes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Arc;

    fn id(n: u64) -> EntityId {
        EntityId::from_number(n).unwrap()
    }

    #[test]
    fn failures_return_to_pending_only_at_round_boundary() {
        let ledger = RunLedger::new([id(1), id(2)]);
        ledger.record(FetchOutcome::fetched(id(1), Path::new("a"), None, 1));
        ledger.record(FetchOutcome::failed(id(2), "boom".into(), 3));

        let counts = ledger.counts();
        assert_eq!((counts.completed, counts.failed, counts.pending), (1, 1, 0));

        assert_eq!(ledger.advance_round(), vec![id(2)]);
        let counts = ledger.counts();
        assert_eq!((counts.completed, counts.failed, counts.pending), (1, 0, 1));
    }

    #[test]
    fn completed_and_failed_stay_disjoint() {
        let ledger = RunLedger::new([id(7)]);
        ledger.record(FetchOutcome::failed(id(7), "first".into(), 3));
        ledger.advance_round();
        ledger.record(FetchOutcome::fetched(id(7), Path::new("a"), None, 2));
        // a late failure for an already-completed entity must not resurrect it
        ledger.record(FetchOutcome::failed(id(7), "late".into(), 1));

        let snap = ledger.finish();
        assert!(snap.completed.contains(&id(7)));
        assert!(snap.unresolved.is_empty());
        assert_eq!(snap.outcomes.len(), 3);
    }

    #[test]
    fn leftover_pending_is_unresolved() {
        let ledger = RunLedger::new([id(1), id(2), id(3)]);
        ledger.record(FetchOutcome::failed(id(1), "x".into(), 1));
        let snap = ledger.finish();
        let unresolved: Vec<_> = snap.unresolved.into_iter().collect();
        assert_eq!(unresolved, vec![id(1), id(2), id(3)]);
    }

    #[test]
    fn concurrent_records_are_not_lost() {
        let ids: Vec<EntityId> = (1..=200).map(id).collect();
        let ledger = Arc::new(RunLedger::new(ids.clone()));
        let handles: Vec<_> = ids
            .chunks(25)
            .map(|chunk| {
                let ledger = ledger.clone();
                let chunk = chunk.to_vec();
                std::thread::spawn(move || {
                    for id in chunk {
                        ledger.record(FetchOutcome::fetched(id, Path::new("p"), None, 1));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let counts = ledger.counts();
        assert_eq!(counts.completed, 200);
        assert_eq!(counts.outcomes, 200);
        assert_eq!(counts.pending, 0);
    }
}
