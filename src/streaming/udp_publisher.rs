//! UDP telemetry sink
//!
//! Sends each tick's [`TelemetryRecord`] as one datagram to the client
//! currently registered in the [`UdpClientRegistry`]. The registry is
//! filled by [`CommandServer`](super::CommandServer) when a command client
//! connects and cleared when it leaves. With no client registered a
//! publish succeeds without sending anything.
//!
//! Datagrams use the same length-prefixed frame as the command stream.

use crate::core::telemetry::TelemetrySink;
use crate::core::types::TelemetryRecord;
use crate::error::{Error, Result};
use crate::streaming::messages::Message;
use crate::streaming::wire::Serializer;
use std::net::{SocketAddr, UdpSocket};
use std::sync::{Arc, Mutex};

/// Type alias for UDP client registry (single client at a time)
pub type UdpClientRegistry = Arc<Mutex<Option<SocketAddr>>>;

/// Typical telemetry datagram is well under 512 bytes
const SEND_BUFFER_CAPACITY: usize = 512;

/// Telemetry sink that unicasts records to the registered client
pub struct UdpTelemetrySink {
    socket: UdpSocket,
    serializer: Serializer,
    client_registry: UdpClientRegistry,
    send_buffer: Vec<u8>,
    last_client: Option<SocketAddr>,
}

impl UdpTelemetrySink {
    /// Create a sink sending from `socket`
    pub fn new(socket: UdpSocket, serializer: Serializer, client_registry: UdpClientRegistry) -> Self {
        Self {
            socket,
            serializer,
            client_registry,
            send_buffer: Vec::with_capacity(SEND_BUFFER_CAPACITY),
            last_client: None,
        }
    }

    /// Bind an ephemeral local socket (send-only)
    pub fn bind(serializer: Serializer, client_registry: UdpClientRegistry) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .map_err(|e| Error::Other(format!("Failed to create UDP socket: {}", e)))?;
        Ok(Self::new(socket, serializer, client_registry))
    }

    fn client(&self) -> Option<SocketAddr> {
        *self
            .client_registry
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}

impl TelemetrySink for UdpTelemetrySink {
    fn publish(&mut self, record: &TelemetryRecord) -> Result<()> {
        let client = self.client();
        if client != self.last_client {
            match client {
                Some(addr) => log::info!("UdpTelemetrySink: Streaming to {}", addr),
                None => log::info!("UdpTelemetrySink: Client unregistered, streaming paused"),
            }
            self.last_client = client;
        }

        let Some(addr) = client else {
            return Ok(());
        };

        self.serializer
            .encode_frame(&Message::Telemetry(record.clone()), &mut self.send_buffer)
            .map_err(|e| Error::Telemetry(e.to_string()))?;

        self.socket
            .send_to(&self.send_buffer, addr)
            .map_err(|e| Error::Telemetry(format!("send to {} failed: {}", addr, e)))?;

        log::trace!(
            "UdpTelemetrySink: Sent record #{} ({} bytes)",
            record.sequence,
            self.send_buffer.len()
        );
        Ok(())
    }
}
