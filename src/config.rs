//! Configuration for create-bridge
//!
//! Loaded once at startup from a TOML file. Every section has defaults, so
//! a partial file (or none at all) is valid.
//!
//! ```toml
//! [robot]
//! type = "create"
//! device = "/dev/ttyUSB0"
//! baud = 115200
//! mode = "full"
//!
//! [control]
//! loop_hz = 10.0
//! latch_duration = 0.5
//!
//! [frames]
//! reference = "odom"
//! body = "base_footprint"
//!
//! [network]
//! bind_address = "0.0.0.0:5555"
//! wire_format = "json"
//! ```

use crate::core::types::{ControlMode, FrameIds};
use crate::error::{Error, Result};
use crate::streaming::WireFormat;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub robot: RobotConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub frames: FrameIds,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub mock: MockConfig,
}

/// Robot link settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RobotConfig {
    /// Transport implementation: "create" (serial Open Interface) or "mock"
    #[serde(rename = "type")]
    pub device_type: String,
    /// Serial device path
    pub device: String,
    /// Serial baud rate (115200 for Create 2, 57600 for Create 1)
    pub baud: u32,
    /// Control authority requested at startup
    pub mode: ControlMode,
    /// Distance between wheel contact points in meters
    pub wheel_base: f32,
    /// Serial read timeout for sensor queries in milliseconds
    pub sensor_timeout_ms: u64,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            device_type: "create".to_string(),
            device: "/dev/ttyUSB0".to_string(),
            baud: 115200,
            mode: ControlMode::Full,
            wheel_base: 0.235,
            sensor_timeout_ms: 50,
        }
    }
}

/// Control loop timing
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Tick rate in Hz
    pub loop_hz: f64,
    /// Seconds without a command before the robot is stopped
    pub latch_duration: f64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            loop_hz: 10.0,
            latch_duration: 0.5,
        }
    }
}

impl ControlConfig {
    /// Tick period derived from `loop_hz`
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.loop_hz)
    }

    pub fn latch(&self) -> Duration {
        Duration::from_secs_f64(self.latch_duration)
    }
}

/// Command and telemetry endpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// TCP bind address for inbound velocity commands
    pub bind_address: String,
    /// UDP port telemetry is sent to on the connected client's host.
    /// Defaults to the TCP port.
    pub udp_port: Option<u16>,
    /// Payload encoding for both directions
    pub wire_format: WireFormat,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5555".to_string(),
            udp_port: None,
            wire_format: WireFormat::Json,
        }
    }
}

impl NetworkConfig {
    /// Port parsed from `bind_address`, 5555 if it cannot be parsed
    pub fn port(&self) -> u16 {
        self.bind_address
            .rsplit(':')
            .next()
            .and_then(|p| p.parse().ok())
            .unwrap_or(5555)
    }

    /// UDP telemetry port
    pub fn udp_port(&self) -> u16 {
        self.udp_port.unwrap_or_else(|| self.port())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). RUST_LOG overrides it.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Simulated robot used when `robot.type = "mock"`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MockConfig {
    pub start_x: f32,
    pub start_y: f32,
    pub start_yaw: f32,
    /// Linear velocity limit in m/s
    pub max_linear_speed: f32,
    /// Angular velocity limit in rad/s
    pub max_angular_speed: f32,
    pub battery_charge_mah: u16,
    pub battery_capacity_mah: u16,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            start_x: 0.0,
            start_y: 0.0,
            start_yaw: 0.0,
            max_linear_speed: 0.5,
            max_angular_speed: 4.25,
            battery_charge_mah: 2400,
            battery_capacity_mah: 3000,
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use create_bridge::config::Config;
    ///
    /// let config = Config::load("create-bridge.toml")?;
    /// # Ok::<(), create_bridge::Error>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the control loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(self.control.loop_hz.is_finite() && self.control.loop_hz > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "control.loop_hz must be > 0 (got {})",
                self.control.loop_hz
            )));
        }
        if !(self.control.latch_duration.is_finite() && self.control.latch_duration > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "control.latch_duration must be > 0 (got {})",
                self.control.latch_duration
            )));
        }
        if !Duration::try_from_secs_f64(1.0 / self.control.loop_hz)
            .is_ok_and(|period| !period.is_zero())
        {
            return Err(Error::InvalidConfig(format!(
                "control.loop_hz out of range (got {})",
                self.control.loop_hz
            )));
        }
        if Duration::try_from_secs_f64(self.control.latch_duration).is_err() {
            return Err(Error::InvalidConfig(format!(
                "control.latch_duration out of range (got {})",
                self.control.latch_duration
            )));
        }
        if self.robot.baud == 0 {
            return Err(Error::InvalidConfig("robot.baud must be > 0".to_string()));
        }
        if self.robot.device.is_empty() {
            return Err(Error::InvalidConfig(
                "robot.device must not be empty".to_string(),
            ));
        }
        if self.robot.wheel_base <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "robot.wheel_base must be > 0 (got {})",
                self.robot.wheel_base
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.control.loop_hz, 10.0);
        assert_eq!(config.control.latch_duration, 0.5);
        assert_eq!(config.robot.device, "/dev/ttyUSB0");
        assert_eq!(config.robot.baud, 115200);
        assert_eq!(config.robot.mode, ControlMode::Full);
        assert_eq!(config.frames.reference, "odom");
        assert_eq!(config.frames.body, "base_footprint");
        assert_eq!(config.control.period(), Duration::from_millis(100));
        assert_eq!(config.control.latch(), Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = Config::from_toml(
            r#"
[control]
loop_hz = 20.0
"#,
        )
        .unwrap();
        assert_eq!(config.control.loop_hz, 20.0);
        assert_eq!(config.control.latch_duration, 0.5);
        assert_eq!(config.robot.baud, 115200);
        assert_eq!(config.network.port(), 5555);
    }

    #[test]
    fn test_toml_deserialization() {
        let config = Config::from_toml(
            r#"
[robot]
type = "mock"
device = "/dev/ttyACM0"
baud = 57600
mode = "safe"

[control]
loop_hz = 50.0
latch_duration = 0.25

[frames]
reference = "world"
body = "base_link"

[network]
bind_address = "127.0.0.1:6000"
udp_port = 6001
wire_format = "postcard"

[logging]
level = "debug"
"#,
        )
        .unwrap();
        assert_eq!(config.robot.device_type, "mock");
        assert_eq!(config.robot.device, "/dev/ttyACM0");
        assert_eq!(config.robot.baud, 57600);
        assert_eq!(config.robot.mode, ControlMode::Safe);
        assert_eq!(config.control.period(), Duration::from_millis(20));
        assert_eq!(config.frames.reference, "world");
        assert_eq!(config.frames.body, "base_link");
        assert_eq!(config.network.port(), 6000);
        assert_eq!(config.network.udp_port(), 6001);
        assert_eq!(config.network.wire_format, WireFormat::Postcard);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = Config::from_toml("[control]\nloop_hz = 0.0\n").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));

        let err = Config::from_toml("[control]\nlatch_duration = -1.0\n").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));

        let err = Config::from_toml("[robot]\nbaud = 0\n").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_unrepresentable_durations_rejected() {
        let err = Config::from_toml("[control]\nlatch_duration = 1e20\n").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(ref msg) if msg.contains("latch_duration")));

        let err = Config::from_toml("[control]\nloop_hz = 1e-20\n").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(ref msg) if msg.contains("loop_hz")));

        let err = Config::from_toml("[control]\nloop_hz = 1e300\n").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_malformed_toml() {
        let err = Config::from_toml("[control\nloop_hz = 10").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[robot]\ndevice = \"/dev/ttyS3\"").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.robot.device, "/dev/ttyS3");
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = Config::load("/nonexistent/create-bridge.toml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_sample_config_matches_defaults() {
        let config = Config::from_toml(include_str!("../create-bridge.toml")).unwrap();
        let defaults = Config::default();
        assert_eq!(config.robot.device, defaults.robot.device);
        assert_eq!(config.robot.mode, defaults.robot.mode);
        assert_eq!(config.control.loop_hz, defaults.control.loop_hz);
        assert_eq!(config.control.latch_duration, defaults.control.latch_duration);
        assert_eq!(config.network.udp_port(), defaults.network.udp_port());
        assert_eq!(config.network.wire_format, defaults.network.wire_format);
    }
}
