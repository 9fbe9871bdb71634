use std::time::Duration;

use tokio::{task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    pipeline::CategoryPlan,
    scheduler::{RunState, Scheduler, TriggerKind, TriggerOutcome},
};

/// 起動直後に1回、その後は固定間隔でスイープを起動するデーモン。
///
/// `shutdown` がキャンセルされると待機中でも即座に終了する。
pub fn spawn_ingest_daemon(
    scheduler: Scheduler,
    plan: CategoryPlan,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    IngestDaemon {
        scheduler,
        plan,
        shutdown,
    }
    .spawn()
}

struct IngestDaemon {
    scheduler: Scheduler,
    plan: CategoryPlan,
    shutdown: CancellationToken,
}

impl IngestDaemon {
    fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(self) {
        let cadence = self.scheduler.cadence();
        let mut wait = cadence.startup_delay();
        let mut trigger = TriggerKind::Startup;
        let mut consecutive_failures = 0_u32;

        loop {
            info!(
                %trigger,
                wait_seconds = wait.as_secs(),
                "next ingest sweep scheduled"
            );
            if !self.wait_or_shutdown(wait).await {
                info!("ingest daemon stopping");
                return;
            }

            let outcome = match self.scheduler.trigger(&self.plan, trigger).await {
                TriggerOutcome::Ran(run) => Some(run.state),
                TriggerOutcome::Skipped => None,
            };
            match outcome {
                Some(RunState::Failed) => consecutive_failures = consecutive_failures.saturating_add(1),
                Some(_) => consecutive_failures = 0,
                None => {}
            }
            wait = cadence.delay_after(outcome, consecutive_failures);
            trigger = TriggerKind::Scheduled;
        }
    }

    /// Returns `false` once shutdown was requested.
    async fn wait_or_shutdown(&self, wait: Duration) -> bool {
        tokio::select! {
            () = self.shutdown.cancelled() => false,
            () = sleep(wait) => !self.shutdown.is_cancelled(),
        }
    }
}
