//! iRobot Create Open Interface framing
//!
//! Commands are a single opcode byte followed by big-endian operands:
//!
//! ```text
//! Start         [128]
//! Safe          [131]
//! Full          [132]
//! Drive Direct  [145] [right hi] [right lo] [left hi] [left lo]   (mm/s)
//! Query List    [149] [n] [id1] ... [idn]
//! ```
//!
//! Sensor replies to Query List are the packets' bytes concatenated in
//! request order, big-endian, with no framing.

use crate::core::types::{ControlMode, Velocity};

pub const OP_START: u8 = 128;
pub const OP_SAFE: u8 = 131;
pub const OP_FULL: u8 = 132;
pub const OP_DRIVE_DIRECT: u8 = 145;
pub const OP_QUERY_LIST: u8 = 149;

/// Distance travelled since last request (i16, mm)
pub const PKT_DISTANCE: u8 = 19;
/// Angle turned since last request (i16, degrees, CCW positive)
pub const PKT_ANGLE: u8 = 20;
/// Battery charge (u16, mAh)
pub const PKT_BATTERY_CHARGE: u8 = 25;
/// Battery capacity (u16, mAh)
pub const PKT_BATTERY_CAPACITY: u8 = 26;

/// Wheel speed limit accepted by Drive Direct (mm/s)
pub const MAX_WHEEL_SPEED_MM_S: i16 = 500;

/// Opcode that puts the robot in `mode`
///
/// Passive is reached by re-sending Start.
pub fn mode_opcode(mode: ControlMode) -> u8 {
    match mode {
        ControlMode::Passive => OP_START,
        ControlMode::Safe => OP_SAFE,
        ControlMode::Full => OP_FULL,
    }
}

/// Drive Direct command for the given wheel speeds (mm/s)
pub fn drive_direct(left_mm_s: i16, right_mm_s: i16) -> [u8; 5] {
    let right = right_mm_s.to_be_bytes();
    let left = left_mm_s.to_be_bytes();
    [OP_DRIVE_DIRECT, right[0], right[1], left[0], left[1]]
}

/// Query List request for `ids`
pub fn query_list(ids: &[u8]) -> Vec<u8> {
    let mut pkt = Vec::with_capacity(ids.len() + 2);
    pkt.push(OP_QUERY_LIST);
    pkt.push(ids.len() as u8);
    pkt.extend_from_slice(ids);
    pkt
}

/// Convert body velocity to (left, right) wheel speeds in mm/s
///
/// Both wheels are clamped to ±[`MAX_WHEEL_SPEED_MM_S`].
pub fn wheel_speeds(linear: f32, angular: f32, wheel_base: f32) -> (i16, i16) {
    let half_track = wheel_base * 0.5;
    let left = (linear - angular * half_track) * 1000.0;
    let right = (linear + angular * half_track) * 1000.0;
    (clamp_wheel(left), clamp_wheel(right))
}

/// Body velocity produced by (left, right) wheel speeds in mm/s
pub fn body_velocity(left_mm_s: i16, right_mm_s: i16, wheel_base: f32) -> Velocity {
    let left = left_mm_s as f32 / 1000.0;
    let right = right_mm_s as f32 / 1000.0;
    Velocity::new((left + right) * 0.5, 0.0, (right - left) / wheel_base)
}

#[inline]
fn clamp_wheel(mm_s: f32) -> i16 {
    let limit = MAX_WHEEL_SPEED_MM_S as f32;
    mm_s.round().clamp(-limit, limit) as i16
}

/// Read a big-endian i16 at `offset`
#[inline]
pub fn read_i16(bytes: &[u8], offset: usize) -> i16 {
    i16::from_be_bytes([bytes[offset], bytes[offset + 1]])
}

/// Read a big-endian u16 at `offset`
#[inline]
pub fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([bytes[offset], bytes[offset + 1]])
}
