//! Time sources for the control loop.
//!
//! The loop reads two clocks: a monotonic [`Instant`] for latch and rate
//! arithmetic, and wall time for record timestamps. [`ManualClock`] lets
//! tests step both deterministically.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Source of monotonic and wall-clock time
pub trait Clock: Send {
    /// Monotonic now
    fn now(&self) -> Instant;

    /// Wall time in microseconds since the Unix epoch
    fn wall_time_us(&self) -> u64;
}

/// Real system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn wall_time_us(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0)
    }
}

/// Clock that only moves when told to
///
/// Clones share the same time, so a test keeps one handle while the
/// control loop owns another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    wall_origin_us: u64,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    /// Start at t = 0
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            wall_origin_us: SystemClock.wall_time_us(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }

    /// Move time forward by fractional seconds
    pub fn advance_secs(&self, secs: f64) {
        self.advance(Duration::from_secs_f64(secs));
    }

    /// Jump to an absolute offset from t = 0. Never moves backwards.
    pub fn set_elapsed(&self, elapsed: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        if elapsed > *offset {
            *offset = elapsed;
        }
    }

    /// Time since t = 0
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The instant corresponding to t = 0
    pub fn origin(&self) -> Instant {
        self.origin
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn wall_time_us(&self) -> u64 {
        self.wall_origin_us + self.elapsed().as_micros() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new();
        let handle = clock.clone();
        let start = clock.now();

        handle.advance(Duration::from_millis(250));
        assert_eq!(clock.now() - start, Duration::from_millis(250));
        assert_eq!(
            clock.wall_time_us() - handle.wall_origin_us,
            250_000
        );
    }

    #[test]
    fn test_manual_clock_never_moves_backwards() {
        let clock = ManualClock::new();
        clock.set_elapsed(Duration::from_secs(2));
        clock.set_elapsed(Duration::from_secs(1));
        assert_eq!(clock.elapsed(), Duration::from_secs(2));
    }

    #[test]
    fn test_system_clock_wall_time() {
        // Anything after 2020-01-01 is plausible
        assert!(SystemClock.wall_time_us() > 1_577_836_800_000_000);
    }
}
