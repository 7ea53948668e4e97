//! Fixed-rate control loop: telemetry publication and the command watchdog
//!
//! # Tick
//!
//! ```text
//! ┌──────────────────────────┐
//! │ 1. pose(), velocity()    │  fault/timeout -> no record this tick
//! │ 2. publish record        │
//! │ 3. latch expired?        │  yes -> drive(0, 0), every tick
//! └──────────────────────────┘
//! ```
//!
//! Telemetry always goes out before the watchdog check, so a record shows
//! the state the robot was in before any stop issued in the same tick.
//!
//! # Commands
//!
//! Commands are applied the moment they arrive: [`ControlLoop::run`] waits
//! on the command channel until the next tick deadline and hands every
//! command straight to [`ControlLoop::on_command`]. After an overrunning
//! tick there is nothing to wait for, so queued commands are drained
//! before the next tick starts. Command latency is
//! therefore independent of the tick rate, while worst-case stop latency
//! is `latch_duration + one period`.
//!
//! # Ownership
//!
//! The loop owns the transport for its whole lifetime. [`ControlLoop::shutdown`]
//! disconnects it and also runs from `Drop`, so the link is released on
//! every exit path.

use super::latch::CommandLatch;
use super::rate::Rate;
use crate::config::Config;
use crate::core::clock::{Clock, SystemClock};
use crate::core::telemetry::TelemetrySink;
use crate::core::transport::RobotTransport;
use crate::core::types::{ControlMode, FrameIds, TelemetryRecord, VelocityCommand};
use crate::error::{Error, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Settings the control loop needs from the full [`Config`]
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Tick rate in Hz
    pub loop_hz: f64,
    /// Time without a command before the robot is stopped
    pub latch_duration: Duration,
    /// Transport device identifier
    pub device: String,
    /// Transport baud rate
    pub baud: u32,
    /// Control authority requested at startup
    pub mode: ControlMode,
    /// Frame relation stamped on every record
    pub frames: FrameIds,
}

impl LoopConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            loop_hz: config.control.loop_hz,
            latch_duration: config.control.latch(),
            device: config.robot.device.clone(),
            baud: config.robot.baud,
            mode: config.robot.mode,
            frames: config.frames.clone(),
        }
    }

    /// Tick period
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.loop_hz)
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Outcome of a successful tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    /// Sequence number of the record published this tick
    pub sequence: u64,
    /// Whether the watchdog issued a stop this tick
    pub stopped: bool,
}

/// Counters kept over the lifetime of the loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Ticks executed
    pub ticks: u64,
    /// Records published
    pub published: u64,
    /// Recoverable faults (ticks or commands)
    pub faults: u64,
    /// Watchdog stop commands issued
    pub stops: u64,
    /// Ticks that ran past their period
    pub overruns: u64,
    /// Velocity commands received
    pub commands: u64,
}

/// Control loop owning the robot transport, telemetry sink, and latch
pub struct ControlLoop<T: RobotTransport, S: TelemetrySink, C: Clock = SystemClock> {
    config: LoopConfig,
    transport: T,
    sink: S,
    clock: C,
    latch: CommandLatch,
    /// Sequence number for the next published record
    next_sequence: u64,
    /// Latch was expired on the previous check (for transition logging)
    latch_expired: bool,
    /// `shutdown()` already ran
    closed: bool,
    stats: LoopStats,
}

impl<T: RobotTransport, S: TelemetrySink> ControlLoop<T, S, SystemClock> {
    /// Create a loop driven by the system clock
    pub fn new(config: LoopConfig, transport: T, sink: S) -> Self {
        Self::with_clock(config, transport, sink, SystemClock)
    }
}

impl<T: RobotTransport, S: TelemetrySink, C: Clock> ControlLoop<T, S, C> {
    /// Create a loop with an explicit time source
    pub fn with_clock(config: LoopConfig, transport: T, sink: S, clock: C) -> Self {
        let latch = CommandLatch::new(clock.now());
        Self {
            config,
            transport,
            sink,
            clock,
            latch,
            next_sequence: 0,
            latch_expired: false,
            closed: false,
            stats: LoopStats::default(),
        }
    }

    // === Lifecycle ===

    /// Connect to the robot and prepare for ticking
    ///
    /// A connection failure is returned as [`Error::ConnectionFailed`]; the
    /// caller must not start the loop after any error from here.
    pub fn initialize(&mut self) -> Result<()> {
        log::info!(
            "ControlLoop: loop rate {:.2}Hz, latch duration {:.2}s",
            self.config.loop_hz,
            self.config.latch_duration.as_secs_f64()
        );
        log::info!(
            "ControlLoop: Connecting to {} at {} baud",
            self.config.device,
            self.config.baud
        );

        if let Err(e) = self.transport.connect(&self.config.device, self.config.baud) {
            let err = match e {
                e @ Error::ConnectionFailed { .. } => e,
                other => Error::ConnectionFailed {
                    device: self.config.device.clone(),
                    baud: self.config.baud,
                    reason: other.to_string(),
                },
            };
            log::error!("ControlLoop: Failed to establish connection with robot: {}", err);
            return Err(err);
        }
        log::info!("ControlLoop: Connection established");

        self.transport.set_mode(self.config.mode)?;
        log::info!("ControlLoop: Robot in {:?} mode", self.config.mode);

        match self.transport.battery() {
            Ok(battery) => match battery.percent() {
                Some(percent) => log::info!("ControlLoop: Battery level {:.2} %", percent),
                None => log::info!(
                    "ControlLoop: Battery charge {}mAh (capacity unknown)",
                    battery.charge_mah
                ),
            },
            Err(Error::NotSupported(_)) => {
                log::debug!("ControlLoop: Transport does not report battery state")
            }
            Err(e) => log::warn!("ControlLoop: Battery query failed: {}", e),
        }

        self.latch.rearm(self.clock.now());
        self.latch_expired = false;
        Ok(())
    }

    /// Stop the robot and release the transport
    ///
    /// Runs once; later calls (including the one from `Drop`) do nothing.
    /// Disconnect is attempted even if `initialize` failed part way.
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        log::info!("ControlLoop: Shutting down");

        if self.transport.is_connected()
            && let Err(e) = self.transport.drive(0.0, 0.0)
        {
            log::warn!("ControlLoop: Final stop command failed: {}", e);
        }
        if let Err(e) = self.transport.disconnect() {
            log::error!("ControlLoop: Disconnect failed: {}", e);
        }

        log::info!(
            "ControlLoop: Stopped after {} ticks ({} published, {} faults, {} watchdog stops, {} overruns, {} commands)",
            self.stats.ticks,
            self.stats.published,
            self.stats.faults,
            self.stats.stops,
            self.stats.overruns,
            self.stats.commands
        );
    }

    // === Command path ===

    /// Record a command in the latch, then forward it to the robot
    pub fn on_command(&mut self, cmd: VelocityCommand) -> Result<()> {
        let now = self.clock.now();
        self.latch.record(cmd, now);
        self.stats.commands += 1;

        if self.latch_expired {
            log::info!("ControlLoop: Commands resumed");
            self.latch_expired = false;
        }
        log::trace!(
            "ControlLoop: Command linear={:.3}m/s angular={:.3}rad/s",
            cmd.linear,
            cmd.angular
        );

        self.transport.drive(cmd.linear, cmd.angular)
    }

    // === Tick path ===

    /// Run one cycle: publish telemetry, then enforce the latch
    ///
    /// The watchdog check runs even when telemetry failed. Recoverable
    /// errors (see [`Error::is_recoverable`]) are counted as faults and
    /// leave the loop able to tick again.
    pub fn tick(&mut self) -> Result<TickReport> {
        let now = self.clock.now();
        self.stats.ticks += 1;

        let published = self.publish_telemetry();
        let watchdog = self.enforce_latch(now);

        let result = match (published, watchdog) {
            (Ok(sequence), Ok(stopped)) => Ok(TickReport { sequence, stopped }),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(_)) => Err(e),
            (Err(telemetry_err), Err(watchdog_err)) => {
                if !watchdog_err.is_recoverable() && telemetry_err.is_recoverable() {
                    log::error!("ControlLoop: Telemetry also failed: {}", telemetry_err);
                    Err(watchdog_err)
                } else {
                    log::error!("ControlLoop: Watchdog stop also failed: {}", watchdog_err);
                    Err(telemetry_err)
                }
            }
        };

        if let Err(ref e) = result
            && e.is_recoverable()
        {
            self.stats.faults += 1;
        }
        result
    }

    /// Fetch pose and velocity, build a record, and publish it
    fn publish_telemetry(&mut self) -> Result<u64> {
        let budget = self.config.period();
        let fetch_start = self.clock.now();

        let pose = self.transport.pose()?;
        let velocity = self.transport.velocity()?;

        let elapsed = self.clock.now().saturating_duration_since(fetch_start);
        if elapsed > budget {
            return Err(Error::Timeout {
                operation: "pose/velocity snapshot",
                elapsed_ms: elapsed.as_secs_f64() * 1000.0,
                budget_ms: budget.as_secs_f64() * 1000.0,
            });
        }

        let sequence = self.next_sequence;
        let record = TelemetryRecord::new(
            sequence,
            self.clock.wall_time_us(),
            pose,
            velocity,
            self.config.frames.clone(),
        );
        self.sink.publish(&record)?;

        self.next_sequence += 1;
        self.stats.published += 1;
        Ok(sequence)
    }

    /// Issue a stop if no command arrived within the latch duration
    ///
    /// Returns whether a stop was sent.
    fn enforce_latch(&mut self, now: Instant) -> Result<bool> {
        if !self.latch.is_expired(now, self.config.latch_duration) {
            return Ok(false);
        }

        if !self.latch_expired {
            log::warn!(
                "ControlLoop: No command for {:.2}s, stopping robot",
                self.latch.age(now).as_secs_f64()
            );
            self.latch_expired = true;
        }

        self.stats.stops += 1;
        self.transport.drive(0.0, 0.0)?;
        Ok(true)
    }

    // === Drive loop ===

    /// Tick at the configured rate until `running` is cleared
    ///
    /// Between ticks, commands from `commands` are applied as they arrive.
    /// Recoverable errors are logged and the loop continues; anything else
    /// is returned. The caller still owns shutdown (or relies on `Drop`).
    pub fn run(
        &mut self,
        commands: &Receiver<VelocityCommand>,
        running: &AtomicBool,
    ) -> Result<LoopStats> {
        let mut rate = Rate::from_hz(self.config.loop_hz, self.clock.now());
        let mut last_log = self.clock.now();

        log::info!("ControlLoop: Running at {:.1}Hz", self.config.loop_hz);

        while running.load(Ordering::Relaxed) {
            match self.tick() {
                Ok(report) => log::trace!(
                    "ControlLoop: Tick {} published (stopped={})",
                    report.sequence,
                    report.stopped
                ),
                Err(e) if e.is_recoverable() => log::error!("ControlLoop: Tick failed: {}", e),
                Err(e) => {
                    log::error!("ControlLoop: Unrecoverable error: {}", e);
                    return Err(e);
                }
            }

            let now = self.clock.now();
            if let Some(late) = rate.overrun(now) {
                self.stats.overruns += 1;
                if self.stats.overruns % 10 == 1 {
                    log::warn!(
                        "ControlLoop: Loop running slowly - {:.1}ms late (period {:.1}ms), {} overruns",
                        late.as_secs_f64() * 1000.0,
                        rate.period().as_secs_f64() * 1000.0,
                        self.stats.overruns
                    );
                }
                rate.reset(now);
                self.drain_pending(commands, running)?;
            } else {
                self.dispatch_until(rate.deadline(), commands, running)?;
                rate.advance();
            }

            if now.saturating_duration_since(last_log) >= Duration::from_secs(1) {
                log::debug!(
                    "ControlLoop: ticks={} published={} faults={} stops={} overruns={} commands={}",
                    self.stats.ticks,
                    self.stats.published,
                    self.stats.faults,
                    self.stats.stops,
                    self.stats.overruns,
                    self.stats.commands
                );
                last_log = now;
            }
        }

        log::info!("ControlLoop: Run loop exited");
        Ok(self.stats)
    }

    /// Apply commands as they arrive until `deadline`
    fn dispatch_until(
        &mut self,
        deadline: Instant,
        commands: &Receiver<VelocityCommand>,
        running: &AtomicBool,
    ) -> Result<()> {
        loop {
            match commands.recv_deadline(deadline) {
                Ok(cmd) => self.apply_command(cmd)?,
                Err(RecvTimeoutError::Timeout) => return Ok(()),
                Err(RecvTimeoutError::Disconnected) => return channel_closed(running),
            }
        }
    }

    /// Apply every command already queued, without waiting
    ///
    /// Used after an overrunning tick, when there is no time left to wait.
    fn drain_pending(
        &mut self,
        commands: &Receiver<VelocityCommand>,
        running: &AtomicBool,
    ) -> Result<()> {
        loop {
            match commands.try_recv() {
                Ok(cmd) => self.apply_command(cmd)?,
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => return channel_closed(running),
            }
        }
    }

    fn apply_command(&mut self, cmd: VelocityCommand) -> Result<()> {
        match self.on_command(cmd) {
            Ok(()) => Ok(()),
            Err(e) if e.is_recoverable() => {
                self.stats.faults += 1;
                log::error!("ControlLoop: Failed to apply command: {}", e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    // === Accessors ===

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn latch(&self) -> &CommandLatch {
        &self.latch
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

/// Command server exits on shutdown; only an unexpected exit is an error
fn channel_closed(running: &AtomicBool) -> Result<()> {
    if running.load(Ordering::Relaxed) {
        Err(Error::ChannelClosed)
    } else {
        Ok(())
    }
}

impl<T: RobotTransport, S: TelemetrySink, C: Clock> Drop for ControlLoop<T, S, C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
