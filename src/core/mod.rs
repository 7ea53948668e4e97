//! Core abstractions shared by the control loop and its collaborators.
//!
//! - [`transport::RobotTransport`]: Trait to implement for new robots
//! - [`telemetry::TelemetrySink`]: Where per-tick records go
//! - [`clock::Clock`]: Monotonic and wall time, swappable in tests
//! - [`types`]: Commands, poses, velocities, telemetry records

pub mod clock;
pub mod telemetry;
pub mod transport;
pub mod types;
