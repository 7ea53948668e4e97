//! Error types for create-bridge

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// create-bridge error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration values are out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Robot link could not be opened at startup
    #[error("Failed to connect to {device} at {baud} baud: {reason}")]
    ConnectionFailed {
        /// Device identifier (serial path or "mock")
        device: String,
        /// Requested baud rate
        baud: u32,
        /// Underlying cause
        reason: String,
    },

    /// Transport call was made before `connect` succeeded
    #[error("Transport not connected")]
    NotConnected,

    /// A single transport call failed; the link may recover
    #[error("Transport fault: {0}")]
    Transport(String),

    /// A transport call did not complete within its budget
    #[error("Transport timeout: {operation} took {elapsed_ms:.1}ms (budget {budget_ms:.1}ms)")]
    Timeout {
        /// Operation that ran over
        operation: &'static str,
        /// Measured duration in milliseconds
        elapsed_ms: f64,
        /// Allowed duration in milliseconds
        budget_ms: f64,
    },

    /// The robot link is gone and will not come back
    #[error("Robot link lost: {0}")]
    LinkLost(String),

    /// Telemetry could not be delivered
    #[error("Telemetry publish failed: {0}")]
    Telemetry(String),

    /// Wire serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Command channel closed while the loop was running
    #[error("Command channel disconnected")]
    ChannelClosed,

    /// Operation not supported by this transport
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// Unknown device type in configuration
    #[error("Unknown device type: {0}")]
    UnknownDevice(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the control loop may keep running after this error.
    ///
    /// Recoverable errors are confined to a single tick: the fault is
    /// logged, no telemetry is published for that tick, and the next
    /// tick runs normally.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::Timeout { .. } | Error::Telemetry(_)
        )
    }
}

/// Route panics through the logger before the default hook runs
///
/// A panic on the control loop thread still unwinds through the loop's
/// `Drop`, which stops and disconnects the robot; this makes sure the
/// cause is in the log as well. The process then exits with code 101.
pub fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let thread = std::thread::current();
        log::error!(
            "Fatal: thread '{}' panicked: {}",
            thread.name().unwrap_or("<unnamed>"),
            info
        );
        default_hook(info);
    }));
}
