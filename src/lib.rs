//! create-bridge - Real-time adapter for differential-drive robots
//!
//! Sits between a command client and an iRobot Create (or a simulated
//! robot). Velocity commands arrive over TCP and are applied immediately;
//! a fixed-rate loop publishes pose and velocity over UDP and stops the
//! robot when commands stop arriving.
//!
//! ```text
//!  client ──TCP cmd──▶ CommandServer ──channel──▶ ControlLoop ──▶ RobotTransport
//!  client ◀──UDP telemetry── UdpTelemetrySink ◀──────┘
//! ```

pub mod config;
pub mod control;
pub mod core;
pub mod devices;
pub mod error;
pub mod streaming;

// Re-export commonly used types
pub use config::Config;
pub use control::{ControlLoop, LoopConfig, LoopStats};
pub use crate::core::types::{Pose, TelemetryRecord, Velocity, VelocityCommand};
pub use error::{Error, Result};
