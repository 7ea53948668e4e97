//! Wire format and framing
//!
//! Both directions use the same length-prefixed frame:
//!
//! ```text
//! ┌──────────────────┬──────────────────────────┐
//! │ Length (4 bytes) │ Payload (variable)       │
//! │ Big-endian u32   │ JSON or Postcard binary  │
//! └──────────────────┴──────────────────────────┘
//! ```
//!
//! Payloads larger than [`MAX_FRAME_SIZE`] are rejected and the connection
//! is closed. A payload that fails to deserialize is logged and dropped;
//! the connection stays open.

use crate::error::{Error, Result};
use crate::streaming::messages::Message;
use serde::{Deserialize, Serialize};
use std::io::Read;

/// Largest accepted payload (1MB)
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Supported wire formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Binary format using postcard - compact
    Postcard,
    /// JSON format - human-readable for debugging
    #[default]
    Json,
}

/// Serializer that can handle both formats
#[derive(Debug, Clone)]
pub struct Serializer {
    format: WireFormat,
}

impl Serializer {
    /// Create a new serializer for the given format
    pub fn new(format: WireFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    /// Serialize a message to bytes
    pub fn serialize(&self, msg: &Message) -> Result<Vec<u8>> {
        match self.format {
            WireFormat::Postcard => {
                postcard::to_allocvec(msg).map_err(|e| Error::Serialization(e.to_string()))
            }
            WireFormat::Json => {
                serde_json::to_vec(msg).map_err(|e| Error::Serialization(e.to_string()))
            }
        }
    }

    /// Deserialize bytes to a message
    pub fn deserialize(&self, bytes: &[u8]) -> Result<Message> {
        match self.format {
            WireFormat::Postcard => {
                postcard::from_bytes(bytes).map_err(|e| Error::Serialization(e.to_string()))
            }
            WireFormat::Json => {
                serde_json::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))
            }
        }
    }

    /// Serialize `msg` into `buf` as a complete frame (length prefix + payload)
    ///
    /// `buf` is cleared first so callers can reuse it across messages.
    pub fn encode_frame(&self, msg: &Message, buf: &mut Vec<u8>) -> Result<()> {
        let payload = self.serialize(msg)?;
        if payload.len() > MAX_FRAME_SIZE {
            return Err(Error::Serialization(format!(
                "Message too large: {} bytes",
                payload.len()
            )));
        }
        buf.clear();
        buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(&payload);
        Ok(())
    }
}

/// Read one frame payload into `buf`
///
/// Returns the underlying I/O error unchanged so callers can tell a read
/// timeout apart from a closed connection.
pub fn read_frame<R: Read>(reader: &mut R, buf: &mut Vec<u8>) -> Result<()> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(Error::Other(format!("Message too large: {} bytes", len)));
    }

    buf.clear();
    buf.resize(len, 0);
    reader.read_exact(buf)?;
    Ok(())
}
