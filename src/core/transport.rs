//! RobotTransport trait definition

use crate::core::types::{BatteryState, ControlMode, Pose, Velocity};
use crate::error::{Error, Result};

/// Robot link used by the control loop
///
/// Implementations own the physical connection and the vehicle protocol.
/// Every call must return within a bounded time; a transport that cannot
/// guarantee this should apply its own I/O timeout and report
/// [`Error::Transport`] instead of blocking.
pub trait RobotTransport: Send {
    /// Open the link to the robot
    fn connect(&mut self, device: &str, baud: u32) -> Result<()>;

    /// Close the link. Must be safe to call when not connected.
    fn disconnect(&mut self) -> Result<()>;

    /// Whether `connect` succeeded and `disconnect` has not run since
    fn is_connected(&self) -> bool;

    /// Switch robot control authority
    fn set_mode(&mut self, mode: ControlMode) -> Result<()>;

    /// Command body velocity
    ///
    /// # Arguments
    /// * `linear` - Linear velocity in m/s
    /// * `angular` - Angular velocity in rad/s
    fn drive(&mut self, linear: f32, angular: f32) -> Result<()>;

    /// Current pose estimate in the odometry frame
    fn pose(&mut self) -> Result<Pose>;

    /// Current body velocity estimate
    fn velocity(&mut self) -> Result<Velocity>;

    /// Battery charge and capacity
    fn battery(&mut self) -> Result<BatteryState> {
        Err(Error::NotSupported(
            "Battery query not supported".to_string(),
        ))
    }
}

impl<T: RobotTransport + ?Sized> RobotTransport for Box<T> {
    fn connect(&mut self, device: &str, baud: u32) -> Result<()> {
        (**self).connect(device, baud)
    }

    fn disconnect(&mut self) -> Result<()> {
        (**self).disconnect()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn set_mode(&mut self, mode: ControlMode) -> Result<()> {
        (**self).set_mode(mode)
    }

    fn drive(&mut self, linear: f32, angular: f32) -> Result<()> {
        (**self).drive(linear, angular)
    }

    fn pose(&mut self) -> Result<Pose> {
        (**self).pose()
    }

    fn velocity(&mut self) -> Result<Velocity> {
        (**self).velocity()
    }

    fn battery(&mut self) -> Result<BatteryState> {
        (**self).battery()
    }
}
