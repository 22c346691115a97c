//! Bounded read-back polling.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Shortest interval a schedule will sleep between probes.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// How long to wait for a resource and how often to look for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub budget: Duration,
    pub interval: Duration,
}

impl PollSchedule {
    /// An `interval` below [`MIN_POLL_INTERVAL`] is raised to it.
    pub fn new(budget: Duration, interval: Duration) -> Self {
        Self {
            budget,
            interval: interval.max(MIN_POLL_INTERVAL),
        }
    }
}

/// How a polling loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The probe reported the resource present
    Visible { attempts: u32, elapsed: Duration },
    /// The budget ran out first
    TimedOut { attempts: u32, elapsed: Duration },
}

impl PollOutcome {
    pub fn is_visible(&self) -> bool {
        matches!(self, PollOutcome::Visible { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Visible { attempts, .. } | PollOutcome::TimedOut { attempts, .. } => *attempts,
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            PollOutcome::Visible { elapsed, .. } | PollOutcome::TimedOut { elapsed, .. } => *elapsed,
        }
    }
}

/// Run `probe` until it returns true or the budget is spent.
///
/// The probe always runs at least once. After a negative probe the loop
/// sleeps one interval if less than `budget` has elapsed, otherwise it gives
/// up, so a timeout is reported no later than `budget + interval` plus the
/// duration of the last probe.
pub async fn poll_until<F, Fut>(schedule: PollSchedule, mut probe: F) -> PollOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if probe().await {
            return PollOutcome::Visible {
                attempts,
                elapsed: start.elapsed(),
            };
        }

        let elapsed = start.elapsed();
        if elapsed < schedule.budget {
            tokio::time::sleep(schedule.interval).await;
        } else {
            return PollOutcome::TimedOut { attempts, elapsed };
        }
    }
}
