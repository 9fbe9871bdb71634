use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::pipeline::{PartitionReport, PlanError, SweepReport};

/// `PENDING → RUNNING → {COMPLETED, FAILED}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }
}

/// スイープを起動した契機。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Startup,
    Scheduled,
    Admin,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TriggerKind::Startup => "startup",
            TriggerKind::Scheduled => "scheduled",
            TriggerKind::Admin => "admin",
        })
    }
}

/// 1回のスイープの記録。
///
/// `inserted_count + duplicate_count + unwritten_count == fetched_count` は常に成り立ち、
/// COMPLETED の実行では `unwritten_count == 0`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestionRun {
    pub run_id: Uuid,
    pub trigger: TriggerKind,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub requested_count: usize,
    pub fetched_count: usize,
    pub inserted_count: usize,
    pub duplicate_count: usize,
    pub run_duplicate_count: usize,
    pub store_duplicate_count: usize,
    pub malformed_count: usize,
    pub unwritten_count: usize,
    pub error: Option<String>,
    pub partitions: Vec<PartitionReport>,
}

impl IngestionRun {
    #[must_use]
    pub fn pending(run_id: Uuid, trigger: TriggerKind) -> Self {
        Self {
            run_id,
            trigger,
            state: RunState::Pending,
            started_at: Utc::now(),
            finished_at: None,
            requested_count: 0,
            fetched_count: 0,
            inserted_count: 0,
            duplicate_count: 0,
            run_duplicate_count: 0,
            store_duplicate_count: 0,
            malformed_count: 0,
            unwritten_count: 0,
            error: None,
            partitions: Vec::new(),
        }
    }

    pub(crate) fn start(&mut self) {
        self.state = RunState::Running;
        self.started_at = Utc::now();
    }

    /// Folds a finished sweep into the run and moves it to its terminal state.
    pub(crate) fn finish(&mut self, report: SweepReport) {
        let mut errors = report.partition_errors();
        if report.cancelled {
            errors.push("cancelled before all partitions were swept".to_string());
        }

        self.requested_count = report.requested;
        self.fetched_count = report.fetched;
        self.malformed_count = report.malformed;
        self.run_duplicate_count = report.run_duplicates;
        self.partitions = report.partitions;

        match report.write {
            Ok(written) => {
                self.inserted_count = written.inserted;
                self.store_duplicate_count = written.store_duplicates;
                self.unwritten_count = 0;
                self.state = RunState::Completed;
            }
            Err(failure) => {
                self.inserted_count = failure.committed.inserted;
                self.store_duplicate_count = failure.committed.store_duplicates;
                self.unwritten_count = failure.unwritten;
                errors.push(format!("persistence: {failure}"));
                self.state = RunState::Failed;
            }
        }

        self.duplicate_count = self.run_duplicate_count + self.store_duplicate_count;
        self.error = (!errors.is_empty()).then(|| errors.join("; "));
        self.finished_at = Some(Utc::now());
    }

    /// The plan was invalid: the run fails without touching the upstream.
    pub(crate) fn reject(&mut self, error: &PlanError) {
        self.state = RunState::Failed;
        self.error = Some(format!("configuration: {error}"));
        self.finished_at = Some(Utc::now());
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_seconds(&self) -> Option<f64> {
        let finished = self.finished_at?;
        let millis = (finished - self.started_at).num_milliseconds().max(0);
        Some(millis as f64 / 1000.0)
    }
}
