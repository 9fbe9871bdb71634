pub mod cadence;
pub mod daemon;
pub(crate) mod jobs;
pub(crate) mod ledger;
pub mod run;

pub use cadence::IntervalCadence;
pub use jobs::{RunPermit, Scheduler, TriggerOutcome};
pub use ledger::StatusSnapshot;
pub use run::{IngestionRun, RunState, TriggerKind};
