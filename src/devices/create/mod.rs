//! iRobot Create serial transport (Open Interface)
//!
//! # Link lifecycle
//!
//! ```text
//! connect     open port (8N1, no flow control) -> Start -> 100ms settle
//! set_mode    Safe / Full (Passive = Start)     -> 20ms settle
//! drive       Drive Direct with clamped wheel speeds
//! pose        Query List [distance, angle], accumulate increments
//! disconnect  zero wheels -> Start (passive) -> close port
//! ```
//!
//! The robot reports distance and angle travelled since the previous
//! query; the pose is their running sum. Velocity is the last commanded
//! wheel speeds mapped back to body rates.
//!
//! Every read uses the port timeout (`robot.sensor_timeout_ms`), so no
//! call blocks longer than that. A timed-out or short reply is a
//! recoverable fault; a port that has gone away is reported as
//! [`Error::LinkLost`].

pub mod protocol;

use crate::core::transport::RobotTransport;
use crate::core::types::{BatteryState, ControlMode, Pose, Velocity};
use crate::error::{Error, Result};
use protocol::{
    OP_START, PKT_ANGLE, PKT_BATTERY_CAPACITY, PKT_BATTERY_CHARGE, PKT_DISTANCE,
};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::f32::consts::{PI, TAU};
use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

/// Time the OI needs after Start before accepting mode changes
const START_SETTLE: Duration = Duration::from_millis(100);

/// Time the OI needs after a mode change
const MODE_SETTLE: Duration = Duration::from_millis(20);

/// Byte stream the transport talks over (serial port in production)
pub trait Port: Read + Write + Send {
    /// Discard bytes received but not yet read
    fn clear_input(&mut self) -> io::Result<()>;
}

impl Port for Box<dyn SerialPort> {
    fn clear_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}

/// Open Interface transport over a serial port
pub struct CreateTransport {
    port: Option<Box<dyn Port>>,
    wheel_base: f32,
    read_timeout: Duration,
    pose: Pose,
    /// Last commanded (left, right) wheel speeds in mm/s
    wheels: (i16, i16),
}

impl CreateTransport {
    /// Create an unconnected transport
    ///
    /// # Arguments
    /// * `wheel_base` - Distance between wheels in meters (0.235 for Create 2)
    /// * `read_timeout` - Serial read timeout for sensor replies
    pub fn new(wheel_base: f32, read_timeout: Duration) -> Self {
        Self {
            port: None,
            wheel_base,
            read_timeout,
            pose: Pose::default(),
            wheels: (0, 0),
        }
    }

    /// Attach an already-open byte stream and send Start
    pub fn with_port(port: Box<dyn Port>, wheel_base: f32) -> Result<Self> {
        let mut transport = Self::new(wheel_base, Duration::from_millis(50));
        transport.attach(port)?;
        Ok(transport)
    }

    fn attach(&mut self, port: Box<dyn Port>) -> Result<()> {
        self.port = Some(port);
        self.pose = Pose::default();
        self.wheels = (0, 0);
        self.send(&[OP_START])
    }

    fn port(&mut self) -> Result<&mut Box<dyn Port>> {
        self.port.as_mut().ok_or(Error::NotConnected)
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let port = self.port()?;
        port.write_all(bytes)
            .and_then(|_| port.flush())
            .map_err(|e| classify_io(e, "write"))
    }

    /// Send a Query List request and read `reply_len` bytes back
    ///
    /// Replies carry no framing, so input is flushed before each request
    /// and after a failed read. A late tail of an earlier reply can then
    /// never shift a later one.
    fn query(&mut self, ids: &[u8], reply_len: usize) -> Result<Vec<u8>> {
        self.discard_input()?;
        self.send(&protocol::query_list(ids))?;
        let mut reply = vec![0u8; reply_len];
        if let Err(e) = self.port()?.read_exact(&mut reply) {
            if let Err(clear_err) = self.discard_input() {
                log::debug!("CreateTransport: Input flush after failed read: {}", clear_err);
            }
            return Err(classify_io(e, "sensor read"));
        }
        Ok(reply)
    }

    fn discard_input(&mut self) -> Result<()> {
        self.port()?
            .clear_input()
            .map_err(|e| classify_io(e, "input flush"))
    }
}

impl RobotTransport for CreateTransport {
    fn connect(&mut self, device: &str, baud: u32) -> Result<()> {
        let port = serialport::new(device, baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(self.read_timeout)
            .open()
            .map_err(|e| Error::ConnectionFailed {
                device: device.to_string(),
                baud,
                reason: e.to_string(),
            })?;

        log::info!("CreateTransport: Opened serial port {} at {} baud", device, baud);

        self.attach(Box::new(port))
            .map_err(|e| Error::ConnectionFailed {
                device: device.to_string(),
                baud,
                reason: e.to_string(),
            })?;
        thread::sleep(START_SETTLE);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        if self.port.is_none() {
            return Ok(());
        }

        // Best effort: leave the robot stopped and passive
        if let Err(e) = self.send(&protocol::drive_direct(0, 0)) {
            log::warn!("CreateTransport: Failed to zero wheels on disconnect: {}", e);
        }
        if let Err(e) = self.send(&[OP_START]) {
            log::warn!("CreateTransport: Failed to enter passive mode: {}", e);
        }

        self.port = None;
        self.wheels = (0, 0);
        log::info!("CreateTransport: Disconnected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    fn set_mode(&mut self, mode: ControlMode) -> Result<()> {
        self.send(&[protocol::mode_opcode(mode)])?;
        thread::sleep(MODE_SETTLE);
        log::debug!("CreateTransport: Mode set to {:?}", mode);
        Ok(())
    }

    fn drive(&mut self, linear: f32, angular: f32) -> Result<()> {
        let (left, right) = protocol::wheel_speeds(linear, angular, self.wheel_base);
        self.send(&protocol::drive_direct(left, right))?;
        self.wheels = (left, right);
        log::trace!("CreateTransport: Drive direct L={}mm/s R={}mm/s", left, right);
        Ok(())
    }

    fn pose(&mut self) -> Result<Pose> {
        let reply = self.query(&[PKT_DISTANCE, PKT_ANGLE], 4)?;
        let distance = protocol::read_i16(&reply, 0) as f32 / 1000.0;
        let angle = (protocol::read_i16(&reply, 2) as f32).to_radians();

        // Robot-reported increments, applied at the mid-point heading
        let mid_yaw = self.pose.yaw + angle * 0.5;
        self.pose = Pose::new(
            self.pose.x + distance * mid_yaw.cos(),
            self.pose.y + distance * mid_yaw.sin(),
            normalize_angle(self.pose.yaw + angle),
        );
        Ok(self.pose)
    }

    fn velocity(&mut self) -> Result<Velocity> {
        if self.port.is_none() {
            return Err(Error::NotConnected);
        }
        let (left, right) = self.wheels;
        Ok(protocol::body_velocity(left, right, self.wheel_base))
    }

    fn battery(&mut self) -> Result<BatteryState> {
        let reply = self.query(&[PKT_BATTERY_CHARGE, PKT_BATTERY_CAPACITY], 4)?;
        Ok(BatteryState {
            charge_mah: protocol::read_u16(&reply, 0),
            capacity_mah: protocol::read_u16(&reply, 2),
        })
    }
}

/// Map an I/O error to a per-tick fault or a lost link
fn classify_io(e: io::Error, operation: &str) -> Error {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::UnexpectedEof | io::ErrorKind::Interrupted => {
            Error::Transport(format!("{} failed: {}", operation, e))
        }
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::NotConnected
        | io::ErrorKind::NotFound
        | io::ErrorKind::PermissionDenied => Error::LinkLost(format!("{} failed: {}", operation, e)),
        _ => Error::Io(e),
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
