use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    observability::metrics::Metrics,
    pipeline::{CategoryPlan, IngestionPipeline},
    store::PaperStore,
};

use super::{
    cadence::IntervalCadence,
    ledger::{RunLedger, StatusSnapshot},
    run::{IngestionRun, RunState, TriggerKind},
};

/// Exclusive right to run one sweep. Dropping it frees the scheduler.
#[derive(Debug)]
pub struct RunPermit {
    run_id: Uuid,
    trigger: TriggerKind,
    _guard: OwnedMutexGuard<()>,
}

impl RunPermit {
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }
}

#[derive(Debug)]
pub enum TriggerOutcome {
    Ran(IngestionRun),
    /// 実行中のスイープがあったため起動しなかった（キューイングはしない）。
    Skipped,
}

/// 取り込みスイープを1つずつ実行し、その履歴を保持する。
#[derive(Clone)]
pub struct Scheduler {
    pipeline: Arc<IngestionPipeline>,
    store: Arc<dyn PaperStore>,
    ledger: Arc<RunLedger>,
    cadence: IntervalCadence,
    metrics: Arc<Metrics>,
    run_lock: Arc<Mutex<()>>,
    shutdown: CancellationToken,
}

impl Scheduler {
    #[must_use]
    pub fn new(
        pipeline: Arc<IngestionPipeline>,
        store: Arc<dyn PaperStore>,
        cadence: IntervalCadence,
        history: usize,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            pipeline,
            store,
            ledger: Arc::new(RunLedger::new(history)),
            cadence,
            metrics,
            run_lock: Arc::new(Mutex::new(())),
            shutdown: CancellationToken::new(),
        }
    }

    /// Token observed between partitions; cancelling it abandons the running sweep.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub(crate) fn cadence(&self) -> IntervalCadence {
        self.cadence
    }

    /// 実行権の取得を試みる。実行中なら `None` を返し、スキップとして記録する。
    #[must_use]
    pub fn try_acquire(&self, trigger: TriggerKind) -> Option<RunPermit> {
        match Arc::clone(&self.run_lock).try_lock_owned() {
            Ok(guard) => Some(RunPermit {
                run_id: Uuid::now_v7(),
                trigger,
                _guard: guard,
            }),
            Err(_) => {
                self.metrics.runs_skipped.inc();
                info!(%trigger, "sweep already in progress; trigger skipped");
                None
            }
        }
    }

    /// Runs a sweep unless one is already in progress.
    pub async fn trigger(&self, plan: &CategoryPlan, trigger: TriggerKind) -> TriggerOutcome {
        match self.try_acquire(trigger) {
            Some(permit) => TriggerOutcome::Ran(self.run_sweep(permit, plan).await),
            None => TriggerOutcome::Skipped,
        }
    }

    /// 1回のスイープを実行する。エラーは返さず、常に COMPLETED か FAILED の実行記録を返す。
    pub async fn run_sweep(&self, permit: RunPermit, plan: &CategoryPlan) -> IngestionRun {
        let mut run = IngestionRun::pending(permit.run_id, permit.trigger);
        run.start();
        self.ledger.begin(run.clone());
        self.metrics.sweep_in_progress.set(1.0);
        info!(
            run_id = %run.run_id,
            trigger = %run.trigger,
            partitions = plan.partitions().len(),
            "ingest sweep started"
        );

        match self.pipeline.execute(run.run_id, plan, &self.shutdown).await {
            Ok(report) => run.finish(report),
            Err(plan_error) => {
                warn!(run_id = %run.run_id, error = %plan_error, "sweep rejected: invalid category plan");
                run.reject(&plan_error);
            }
        }

        self.record_outcome(&run);
        self.ledger.finish(run.clone());
        drop(permit);
        run
    }

    #[allow(clippy::cast_precision_loss)]
    fn record_outcome(&self, run: &IngestionRun) {
        let metrics = &self.metrics;
        metrics.sweep_in_progress.set(0.0);
        if let Some(seconds) = run.duration_seconds() {
            metrics.sweep_duration.observe(seconds);
        }
        metrics.records_fetched.inc_by(run.fetched_count as f64);
        metrics.records_inserted.inc_by(run.inserted_count as f64);
        metrics.run_duplicates.inc_by(run.run_duplicate_count as f64);
        metrics.store_duplicates.inc_by(run.store_duplicate_count as f64);
        metrics.records_malformed.inc_by(run.malformed_count as f64);

        match run.state {
            RunState::Completed => {
                metrics.runs_completed.inc();
                if let Some(finished) = run.finished_at {
                    metrics.last_success_timestamp.set(finished.timestamp() as f64);
                }
                info!(
                    run_id = %run.run_id,
                    fetched = run.fetched_count,
                    inserted = run.inserted_count,
                    duplicates = run.duplicate_count,
                    malformed = run.malformed_count,
                    error = run.error.as_deref().unwrap_or(""),
                    "ingest sweep completed"
                );
            }
            _ => {
                metrics.runs_failed.inc();
                error!(
                    run_id = %run.run_id,
                    fetched = run.fetched_count,
                    inserted = run.inserted_count,
                    unwritten = run.unwritten_count,
                    error = run.error.as_deref().unwrap_or(""),
                    "ingest sweep failed"
                );
            }
        }
    }

    /// 直近の実行と保存件数のスナップショット。
    pub async fn status(&self) -> StatusSnapshot {
        let last_run = self.ledger.most_recent();
        let total_stored_count = match self.store.count_records().await {
            Ok(count) => Some(count),
            Err(store_error) => {
                warn!(error = %store_error, "failed to count stored records");
                None
            }
        };
        let last_run_finished_at = last_run.as_ref().and_then(|run| run.finished_at);

        StatusSnapshot {
            last_run_started_at: last_run.as_ref().map(|run| run.started_at),
            last_run_finished_at,
            total_stored_count,
            next_scheduled_at: last_run_finished_at
                .map(|finished| self.cadence.next_scheduled_at(finished)),
            in_progress: self.ledger.in_progress(),
            last_run,
        }
    }

    #[must_use]
    pub fn history(&self) -> Vec<IngestionRun> {
        self.ledger.history()
    }

    /// ストアへの疎通確認（readiness 用）。
    pub async fn store_ready(&self) -> bool {
        match self.store.ping().await {
            Ok(()) => true,
            Err(store_error) => {
                warn!(error = %store_error, "store ping failed");
                false
            }
        }
    }
}
