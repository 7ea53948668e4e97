//! Periodic control and telemetry loop
//!
//! - [`latch::CommandLatch`]: last command and its arrival time
//! - [`rate::Rate`]: fixed-rate deadline tracking
//! - [`control_loop::ControlLoop`]: tick, watchdog, command dispatch

pub mod control_loop;
pub mod latch;
pub mod rate;

pub use control_loop::{ControlLoop, LoopConfig, LoopStats, TickReport};
pub use latch::CommandLatch;
pub use rate::Rate;
