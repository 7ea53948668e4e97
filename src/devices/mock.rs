//! Simulated differential-drive robot
//!
//! Stands in for real hardware in tests and on the bench
//! (`robot.type = "mock"`). Pose is integrated from the commanded velocity
//! with unicycle kinematics whenever it is queried.
//!
//! Clones share state: hand one clone to the control loop and keep another
//! to inspect drive history or inject faults.
//!
//! ```ignore
//! let robot = MockRobot::default();
//! let handle = robot.clone();
//! let mut control = ControlLoop::new(config, robot, sink);
//! handle.fail_next_pose(1);      // next tick publishes nothing
//! handle.set_link_lost(true);    // next call is unrecoverable
//! ```

use crate::config::MockConfig;
use crate::core::transport::RobotTransport;
use crate::core::types::{BatteryState, ControlMode, Pose, Velocity, VelocityCommand};
use crate::error::{Error, Result};
use std::f32::consts::{PI, TAU};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// Simulated robot transport
#[derive(Clone)]
pub struct MockRobot {
    inner: Arc<Mutex<MockState>>,
}

struct MockState {
    config: MockConfig,
    connected: bool,
    mode: Option<ControlMode>,
    pose: Pose,
    commanded: VelocityCommand,
    last_integration: Option<Instant>,
    drive_history: Vec<VelocityCommand>,
    disconnect_count: u32,
    // Fault injection
    refuse_connect: bool,
    pose_failures: u32,
    velocity_failures: u32,
    drive_failures: u32,
    latency: Duration,
    link_lost: bool,
}

impl MockRobot {
    /// Create a simulated robot from configuration
    pub fn new(config: MockConfig) -> Self {
        let pose = Pose::new(config.start_x, config.start_y, normalize_angle(config.start_yaw));
        Self {
            inner: Arc::new(Mutex::new(MockState {
                config,
                connected: false,
                mode: None,
                pose,
                commanded: VelocityCommand::stop(),
                last_integration: None,
                drive_history: Vec::new(),
                disconnect_count: 0,
                refuse_connect: false,
                pose_failures: 0,
                velocity_failures: 0,
                drive_failures: 0,
                latency: Duration::ZERO,
                link_lost: false,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // === Fault injection ===

    /// Make the next `connect` fail
    pub fn refuse_connect(&self, refuse: bool) {
        self.state().refuse_connect = refuse;
    }

    /// Fail the next `count` pose queries
    pub fn fail_next_pose(&self, count: u32) {
        self.state().pose_failures = count;
    }

    /// Fail the next `count` velocity queries
    pub fn fail_next_velocity(&self, count: u32) {
        self.state().velocity_failures = count;
    }

    /// Fail the next `count` drive commands
    pub fn fail_next_drive(&self, count: u32) {
        self.state().drive_failures = count;
    }

    /// Delay every pose query by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = latency;
    }

    /// Report every subsequent call as an unrecoverable link loss
    pub fn set_link_lost(&self, lost: bool) {
        self.state().link_lost = lost;
    }

    /// Overwrite the simulated pose
    pub fn set_pose(&self, pose: Pose) {
        self.state().pose = pose;
    }

    // === Inspection ===

    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    /// Mode set by the last `set_mode`, if any
    pub fn mode(&self) -> Option<ControlMode> {
        self.state().mode
    }

    /// Every drive command accepted so far, oldest first
    pub fn drive_history(&self) -> Vec<VelocityCommand> {
        self.state().drive_history.clone()
    }

    pub fn last_drive(&self) -> Option<VelocityCommand> {
        self.state().drive_history.last().copied()
    }

    pub fn clear_drive_history(&self) {
        self.state().drive_history.clear();
    }

    pub fn disconnect_count(&self) -> u32 {
        self.state().disconnect_count
    }
}

impl Default for MockRobot {
    fn default() -> Self {
        Self::new(MockConfig::default())
    }
}

impl MockState {
    fn check_link(&self) -> Result<()> {
        if self.link_lost {
            return Err(Error::LinkLost("simulated link loss".to_string()));
        }
        if !self.connected {
            return Err(Error::NotConnected);
        }
        Ok(())
    }

    /// Commanded velocity after applying robot limits
    fn limited_command(&self) -> VelocityCommand {
        VelocityCommand::new(
            self.commanded
                .linear
                .clamp(-self.config.max_linear_speed, self.config.max_linear_speed),
            self.commanded
                .angular
                .clamp(-self.config.max_angular_speed, self.config.max_angular_speed),
        )
    }

    /// Advance the pose to `now` using the current command
    fn integrate(&mut self, now: Instant) {
        let Some(last) = self.last_integration.replace(now) else {
            return;
        };
        let dt = now.saturating_duration_since(last).as_secs_f32();
        if dt <= 0.0 {
            return;
        }

        let cmd = self.limited_command();
        let (x, y, yaw) = (self.pose.x, self.pose.y, self.pose.yaw);

        self.pose = if cmd.angular.abs() < 1e-6 {
            Pose::new(
                x + cmd.linear * yaw.cos() * dt,
                y + cmd.linear * yaw.sin() * dt,
                yaw,
            )
        } else {
            let r = cmd.linear / cmd.angular;
            let new_yaw = yaw + cmd.angular * dt;
            Pose::new(
                x + r * (new_yaw.sin() - yaw.sin()),
                y + r * (yaw.cos() - new_yaw.cos()),
                normalize_angle(new_yaw),
            )
        };
    }
}

impl RobotTransport for MockRobot {
    fn connect(&mut self, device: &str, baud: u32) -> Result<()> {
        let mut state = self.state();
        if state.refuse_connect {
            return Err(Error::ConnectionFailed {
                device: device.to_string(),
                baud,
                reason: "simulated connection refusal".to_string(),
            });
        }
        state.connected = true;
        state.link_lost = false;
        state.last_integration = Some(Instant::now());
        log::info!("MockRobot: Connected (device={}, baud={})", device, baud);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        let mut state = self.state();
        state.disconnect_count += 1;
        if state.connected {
            state.connected = false;
            state.mode = None;
            state.commanded = VelocityCommand::stop();
            log::info!("MockRobot: Disconnected");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state().connected
    }

    fn set_mode(&mut self, mode: ControlMode) -> Result<()> {
        let mut state = self.state();
        state.check_link()?;
        state.mode = Some(mode);
        Ok(())
    }

    fn drive(&mut self, linear: f32, angular: f32) -> Result<()> {
        let mut state = self.state();
        state.check_link()?;
        if state.drive_failures > 0 {
            state.drive_failures -= 1;
            return Err(Error::Transport("simulated drive failure".to_string()));
        }
        state.integrate(Instant::now());
        let cmd = VelocityCommand::new(linear, angular);
        state.commanded = cmd;
        state.drive_history.push(cmd);
        Ok(())
    }

    fn pose(&mut self) -> Result<Pose> {
        let latency = {
            let mut state = self.state();
            state.check_link()?;
            if state.pose_failures > 0 {
                state.pose_failures -= 1;
                return Err(Error::Transport("simulated pose query failure".to_string()));
            }
            state.latency
        };
        if !latency.is_zero() {
            thread::sleep(latency);
        }
        let mut state = self.state();
        state.integrate(Instant::now());
        Ok(state.pose)
    }

    fn velocity(&mut self) -> Result<Velocity> {
        let mut state = self.state();
        state.check_link()?;
        if state.velocity_failures > 0 {
            state.velocity_failures -= 1;
            return Err(Error::Transport(
                "simulated velocity query failure".to_string(),
            ));
        }
        let cmd = state.limited_command();
        Ok(Velocity::new(cmd.linear, 0.0, cmd.angular))
    }

    fn battery(&mut self) -> Result<BatteryState> {
        let state = self.state();
        state.check_link()?;
        Ok(BatteryState {
            charge_mah: state.config.battery_charge_mah,
            capacity_mah: state.config.battery_capacity_mah,
        })
    }
}

/// Normalize angle to [-π, π)
#[inline]
fn normalize_angle(angle: f32) -> f32 {
    let mut a = angle % TAU;
    if a >= PI {
        a -= TAU;
    } else if a < -PI {
        a += TAU;
    }
    a
}
