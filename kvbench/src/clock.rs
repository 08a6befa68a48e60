//! The run clock shared by all workers.

use std::time::Duration;

use tokio::time::Instant;

/// Deadline used when the run duration does not fit the clock, roughly 30 years.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Reference instant and deadline of a run.
///
/// Captured once when the run starts and copied into every worker, so all reported offsets are
/// relative to the same `t0`.
#[derive(Clone, Copy, Debug)]
pub struct RunClock {
    t0: Instant,
    deadline: Instant,
}

impl RunClock {
    /// Starts the clock now, with a deadline `duration` from now.
    ///
    /// Durations too large for the clock run until a deadline far in the future instead.
    pub fn start(duration: Duration) -> Self {
        let t0 = Instant::now();
        let deadline = t0
            .checked_add(duration)
            .unwrap_or_else(|| t0 + FAR_FUTURE);
        Self { t0, deadline }
    }

    /// Offset of `instant` from the start of the run.
    pub fn offset(&self, instant: Instant) -> Duration {
        instant.saturating_duration_since(self.t0)
    }

    /// Time passed since the start of the run.
    pub fn elapsed(&self) -> Duration {
        self.t0.elapsed()
    }

    /// Returns `true` once the deadline has been reached.
    pub fn is_over(&self) -> bool {
        Instant::now() >= self.deadline
    }
}
