use std::{
    collections::VecDeque,
    sync::{PoisonError, RwLock},
};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::run::IngestionRun;

/// ステータスAPI向けの読み取り専用スナップショット。
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub last_run_started_at: Option<DateTime<Utc>>,
    pub last_run_finished_at: Option<DateTime<Utc>>,
    pub total_stored_count: Option<u64>,
    pub next_scheduled_at: Option<DateTime<Utc>>,
    pub in_progress: bool,
    pub last_run: Option<IngestionRun>,
}

/// In-memory history of recent runs, newest first.
#[derive(Debug)]
pub(crate) struct RunLedger {
    capacity: usize,
    inner: RwLock<LedgerState>,
}

#[derive(Debug, Default)]
struct LedgerState {
    current: Option<IngestionRun>,
    finished: VecDeque<IngestionRun>,
}

impl RunLedger {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: RwLock::new(LedgerState::default()),
        }
    }

    pub(crate) fn begin(&self, run: IngestionRun) {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        state.current = Some(run);
    }

    pub(crate) fn finish(&self, run: IngestionRun) {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if state
            .current
            .as_ref()
            .is_some_and(|current| current.run_id == run.run_id)
        {
            state.current = None;
        }
        state.finished.push_front(run);
        state.finished.truncate(self.capacity);
    }

    /// The running sweep if there is one, otherwise the newest finished run.
    pub(crate) fn most_recent(&self) -> Option<IngestionRun> {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        state
            .current
            .clone()
            .or_else(|| state.finished.front().cloned())
    }

    pub(crate) fn in_progress(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .is_some()
    }

    pub(crate) fn history(&self) -> Vec<IngestionRun> {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        state.current.iter().chain(state.finished.iter()).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::scheduler::run::{RunState, TriggerKind};

    fn finished_run() -> IngestionRun {
        let mut run = IngestionRun::pending(Uuid::new_v4(), TriggerKind::Scheduled);
        run.state = RunState::Completed;
        run.finished_at = Some(Utc::now());
        run
    }

    #[test]
    fn running_sweep_is_most_recent_until_finished() {
        let ledger = RunLedger::new(5);
        let earlier = finished_run();
        ledger.finish(earlier.clone());

        let mut running = IngestionRun::pending(Uuid::new_v4(), TriggerKind::Admin);
        running.state = RunState::Running;
        ledger.begin(running.clone());

        assert!(ledger.in_progress());
        assert_eq!(ledger.most_recent().map(|r| r.run_id), Some(running.run_id));

        running.state = RunState::Completed;
        ledger.finish(running.clone());
        assert!(!ledger.in_progress());
        let history: Vec<_> = ledger.history().into_iter().map(|r| r.run_id).collect();
        assert_eq!(history, [running.run_id, earlier.run_id]);
    }

    #[test]
    fn history_is_bounded() {
        let ledger = RunLedger::new(2);
        for _ in 0..5 {
            ledger.finish(finished_run());
        }
        assert_eq!(ledger.history().len(), 2);
    }

    #[test]
    fn empty_ledger_has_no_recent_run() {
        let ledger = RunLedger::new(3);
        assert!(ledger.most_recent().is_none());
        assert!(!ledger.in_progress());
    }
}
