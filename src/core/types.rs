//! Core data types shared by the control loop, transports, and streaming.
//!
//! - [`VelocityCommand`]: inbound twist (linear m/s, angular rad/s)
//! - [`Pose`] / [`Velocity`]: snapshots reported by the transport
//! - [`TelemetryRecord`]: one published pose/velocity sample per tick

use serde::{Deserialize, Serialize};

/// Velocity command for a differential-drive base
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VelocityCommand {
    /// Forward velocity in m/s
    pub linear: f32,
    /// Yaw rate in rad/s (positive = CCW)
    pub angular: f32,
}

impl VelocityCommand {
    /// Create new command
    pub fn new(linear: f32, angular: f32) -> Self {
        Self { linear, angular }
    }

    /// Zero velocity (stop)
    pub fn stop() -> Self {
        Self::default()
    }

    /// Check if command requests no motion
    pub fn is_stop(&self) -> bool {
        self.linear == 0.0 && self.angular == 0.0
    }
}

/// 2D pose in the odometry frame
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    /// X position in meters
    pub x: f32,
    /// Y position in meters
    pub y: f32,
    /// Heading in radians
    pub yaw: f32,
}

impl Pose {
    pub fn new(x: f32, y: f32, yaw: f32) -> Self {
        Self { x, y, yaw }
    }
}

/// Body velocity reported by the robot
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Velocity {
    /// Forward velocity in m/s
    pub x: f32,
    /// Lateral velocity in m/s (always ~0 for differential drive)
    pub y: f32,
    /// Yaw rate in rad/s
    pub yaw: f32,
}

impl Velocity {
    pub fn new(x: f32, y: f32, yaw: f32) -> Self {
        Self { x, y, yaw }
    }
}

/// Orientation quaternion (x, y, z, w)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quaternion {
    /// Rotation about +Z only (roll = pitch = 0)
    pub fn from_yaw(yaw: f32) -> Self {
        let half = yaw * 0.5;
        Self {
            x: 0.0,
            y: 0.0,
            z: half.sin(),
            w: half.cos(),
        }
    }

    /// Recover the yaw angle (assumes a Z-only rotation)
    pub fn yaw(&self) -> f32 {
        2.0 * self.z.atan2(self.w)
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::from_yaw(0.0)
    }
}

/// Coordinate frame relation carried by every record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameIds {
    /// Fixed reference frame (e.g. "odom")
    pub reference: String,
    /// Robot body frame (e.g. "base_footprint")
    pub body: String,
}

impl Default for FrameIds {
    fn default() -> Self {
        Self {
            reference: "odom".to_string(),
            body: "base_footprint".to_string(),
        }
    }
}

/// One pose/velocity snapshot, built fresh every tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// Monotonically increasing per published record
    pub sequence: u64,
    /// Timestamp in microseconds since epoch
    pub timestamp_us: u64,
    /// Pose of `frames.body` relative to `frames.reference`
    pub pose: Pose,
    /// Orientation of the body frame, derived from `pose.yaw`
    pub orientation: Quaternion,
    /// Body velocity
    pub velocity: Velocity,
    /// Frame relation for transform broadcasting
    pub frames: FrameIds,
}

impl TelemetryRecord {
    pub fn new(
        sequence: u64,
        timestamp_us: u64,
        pose: Pose,
        velocity: Velocity,
        frames: FrameIds,
    ) -> Self {
        Self {
            sequence,
            timestamp_us,
            pose,
            orientation: Quaternion::from_yaw(pose.yaw),
            velocity,
            frames,
        }
    }
}

/// Robot control authority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    /// Robot listens but ignores drive commands
    Passive,
    /// Drive allowed, robot still enforces cliff/wheel-drop safety
    Safe,
    /// Full authority, no onboard safety overrides
    #[default]
    Full,
}

/// Battery charge as reported by the robot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryState {
    /// Current charge in mAh
    pub charge_mah: u16,
    /// Estimated capacity in mAh
    pub capacity_mah: u16,
}

impl BatteryState {
    /// Charge as a percentage of capacity, `None` if capacity is unknown
    pub fn percent(&self) -> Option<f32> {
        if self.capacity_mah == 0 {
            None
        } else {
            Some(self.charge_mah as f32 / self.capacity_mah as f32 * 100.0)
        }
    }
}
