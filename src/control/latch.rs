//! Command latch: the velocity-command watchdog state

use crate::core::types::VelocityCommand;
use std::time::{Duration, Instant};

/// Last received velocity command and when it arrived
///
/// Written by the command-arrival path, read by the tick path. Both run
/// on the control loop thread, so no lock is needed.
#[derive(Debug, Clone)]
pub struct CommandLatch {
    last_command: VelocityCommand,
    last_arrival: Instant,
}

impl CommandLatch {
    /// Create a latch that counts as freshly armed at `now`
    ///
    /// Starting from "now" keeps the watchdog quiet until a full latch
    /// duration has passed without any command.
    pub fn new(now: Instant) -> Self {
        Self {
            last_command: VelocityCommand::stop(),
            last_arrival: now,
        }
    }

    /// Store `cmd` as the latest command, arrived at `now`
    ///
    /// The arrival instant never moves backwards.
    pub fn record(&mut self, cmd: VelocityCommand, now: Instant) {
        self.last_command = cmd;
        if now > self.last_arrival {
            self.last_arrival = now;
        }
    }

    /// Re-arm at `now` without changing the stored command
    pub fn rearm(&mut self, now: Instant) {
        if now > self.last_arrival {
            self.last_arrival = now;
        }
    }

    /// True once `latch_duration` has passed since the last arrival
    pub fn is_expired(&self, now: Instant, latch_duration: Duration) -> bool {
        now.saturating_duration_since(self.last_arrival) >= latch_duration
    }

    /// Time since the last arrival
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_arrival)
    }

    pub fn last_command(&self) -> VelocityCommand {
        self.last_command
    }

    pub fn last_arrival(&self) -> Instant {
        self.last_arrival
    }
}
