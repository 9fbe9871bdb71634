use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::util::retry::RetryConfig;

use super::run::RunState;

/// 起動後の遅延と固定間隔で次のスイープまでの待機時間を決める。
#[derive(Debug, Clone, Copy)]
pub struct IntervalCadence {
    startup_delay: Duration,
    interval: Duration,
    failure_backoff: RetryConfig,
}

impl IntervalCadence {
    /// After a FAILED run the next sweep is brought forward by jittered
    /// backoff, never later than one interval.
    #[must_use]
    pub fn new(startup_delay: Duration, interval: Duration, failure_backoff: RetryConfig) -> Self {
        Self {
            startup_delay,
            interval,
            failure_backoff: failure_backoff.capped_at(interval),
        }
    }

    #[must_use]
    pub fn startup_delay(&self) -> Duration {
        self.startup_delay
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// `outcome` is `None` when the trigger was skipped.
    pub(crate) fn delay_after(&self, outcome: Option<RunState>, consecutive_failures: u32) -> Duration {
        match outcome {
            Some(RunState::Failed) if consecutive_failures > 0 => {
                self.failure_backoff.delay_for_attempt(consecutive_failures)
            }
            _ => self.interval,
        }
    }

    /// `last_finished_at + interval`
    pub(crate) fn next_scheduled_at(&self, last_finished_at: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.interval)
            .ok()
            .and_then(|interval| last_finished_at.checked_add_signed(interval))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cadence() -> IntervalCadence {
        IntervalCadence::new(
            Duration::from_secs(5),
            Duration::from_secs(86_400),
            RetryConfig::new(Duration::from_secs(60), Duration::from_secs(3_600)),
        )
    }

    fn parse_utc(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    #[test]
    fn completed_and_skipped_runs_wait_one_interval() {
        let cadence = cadence();
        assert_eq!(cadence.delay_after(Some(RunState::Completed), 0), cadence.interval());
        assert_eq!(cadence.delay_after(None, 0), cadence.interval());
    }

    #[test]
    fn failed_run_retries_sooner() {
        let cadence = cadence();
        let delay = cadence.delay_after(Some(RunState::Failed), 1);
        assert!(delay <= Duration::from_secs(60));
    }

    #[test]
    fn failure_backoff_never_exceeds_interval() {
        let cadence = IntervalCadence::new(
            Duration::ZERO,
            Duration::from_secs(30),
            RetryConfig::new(Duration::from_secs(60), Duration::from_secs(3_600)),
        );
        for failures in 1..10 {
            assert!(cadence.delay_after(Some(RunState::Failed), failures) <= Duration::from_secs(30));
        }
    }

    #[test]
    fn next_scheduled_is_finish_plus_interval() {
        let finished = parse_utc("2025-11-08T04:00:00Z");
        assert_eq!(
            cadence().next_scheduled_at(finished),
            parse_utc("2025-11-09T04:00:00Z")
        );
    }
}
