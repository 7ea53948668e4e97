//! Messages exchanged with the command client
//!
//! - Inbound (TCP): [`Message::Command`] carrying a velocity command
//! - Outbound (UDP): [`Message::Telemetry`] carrying one tick's record

use crate::core::types::{TelemetryRecord, VelocityCommand};
use serde::{Deserialize, Serialize};

/// Top-level wire message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Desired body velocity (client -> bridge)
    Command(VelocityCommand),
    /// Pose and velocity snapshot (bridge -> client)
    Telemetry(TelemetryRecord),
}

impl Message {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Command(_) => "command",
            Message::Telemetry(_) => "telemetry",
        }
    }
}
