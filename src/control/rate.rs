//! Fixed-rate cycle scheduling
//!
//! Tracks the deadline of the current cycle. On time, the next deadline is
//! exactly one period later, so the rate does not drift. After an overrun
//! the schedule restarts from the moment the overrun was noticed: missed
//! cycles are dropped, never replayed.

use std::time::{Duration, Instant};

/// Deadline tracker for a fixed-rate loop
#[derive(Debug, Clone)]
pub struct Rate {
    period: Duration,
    deadline: Instant,
}

impl Rate {
    /// Create a rate whose first cycle starts at `start`
    pub fn new(period: Duration, start: Instant) -> Self {
        Self {
            period,
            deadline: start + period,
        }
    }

    /// Create from a frequency in Hz (must be > 0)
    pub fn from_hz(hz: f64, start: Instant) -> Self {
        Self::new(Duration::from_secs_f64(1.0 / hz), start)
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// End of the current cycle
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// How far past the deadline `now` is, if at all
    pub fn overrun(&self, now: Instant) -> Option<Duration> {
        (now > self.deadline).then(|| now - self.deadline)
    }

    /// Move to the next cycle after waiting out the current one
    pub fn advance(&mut self) {
        self.deadline += self.period;
    }

    /// Restart the schedule at `now` (used after an overrun)
    pub fn reset(&mut self, now: Instant) {
        self.deadline = now + self.period;
    }
}
