//! TCP command receiver
//!
//! Reads length-prefixed [`Message::Command`] frames from the connected
//! client and forwards them to the control loop over a channel. The
//! receiver never touches the robot; the control loop applies each command
//! as soon as it arrives.
//!
//! # Connection Lifecycle
//!
//! ```text
//! 1. Client connects to the command port
//! 2. CommandServer registers the client's IP for UDP telemetry
//! 3. Receiver loop forwards commands until disconnect
//! 4. On disconnect, the UDP registration is cleared
//! ```
//!
//! A 500ms read timeout lets the loop notice shutdown. Frames that fail to
//! deserialize are logged and dropped; oversized frames close the
//! connection.

use crate::core::types::VelocityCommand;
use crate::error::{Error, Result};
use crate::streaming::messages::Message;
use crate::streaming::wire::{self, Serializer};
use crossbeam_channel::{Sender, TrySendError};
use std::io;
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Read timeout used to poll the running flag
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Initial capacity for the frame buffer (typical command size)
const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Forwards velocity commands from one TCP client to the control loop
pub struct TcpReceiver {
    serializer: Serializer,
    commands: Sender<VelocityCommand>,
    /// Global running flag (daemon shutdown)
    running: Arc<AtomicBool>,
    read_buffer: Vec<u8>,
    forwarded: u64,
    dropped: u64,
}

impl TcpReceiver {
    /// Create a new TCP receiver
    pub fn new(
        serializer: Serializer,
        commands: Sender<VelocityCommand>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            serializer,
            commands,
            running,
            read_buffer: Vec::with_capacity(INITIAL_BUFFER_CAPACITY),
            forwarded: 0,
            dropped: 0,
        }
    }

    /// Number of commands handed to the control loop
    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }

    /// Run the receiver loop for a connected client
    ///
    /// Returns `Ok(())` when the client disconnects or the daemon shuts
    /// down.
    pub fn run(&mut self, mut stream: TcpStream) -> Result<()> {
        log::info!("TcpReceiver: Started for client {:?}", stream.peer_addr());

        if let Err(e) = stream.set_read_timeout(Some(READ_TIMEOUT)) {
            log::warn!("TcpReceiver: Failed to set read timeout: {}", e);
        }

        let result = self.receive_loop(&mut stream);
        let _ = stream.shutdown(Shutdown::Both);

        log::info!(
            "TcpReceiver: Stopped ({} commands forwarded, {} dropped)",
            self.forwarded,
            self.dropped
        );
        result
    }

    fn receive_loop(&mut self, stream: &mut TcpStream) -> Result<()> {
        while self.running.load(Ordering::Relaxed) {
            match wire::read_frame(stream, &mut self.read_buffer) {
                Ok(()) => {}
                Err(Error::Io(e))
                    if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
                {
                    continue;
                }
                Err(Error::Io(e))
                    if matches!(
                        e.kind(),
                        io::ErrorKind::UnexpectedEof | io::ErrorKind::ConnectionReset
                    ) =>
                {
                    log::info!("TcpReceiver: Client disconnected");
                    return Ok(());
                }
                Err(e) => {
                    log::error!("TcpReceiver: Failed to read message: {}", e);
                    return Err(e);
                }
            }

            match self.serializer.deserialize(&self.read_buffer) {
                Ok(Message::Command(cmd)) => self.forward(cmd)?,
                Ok(other) => {
                    log::warn!("TcpReceiver: Ignoring inbound {} message", other.kind());
                }
                Err(e) => {
                    log::warn!("TcpReceiver: Dropping malformed command: {}", e);
                }
            }
        }

        log::debug!("TcpReceiver: Running flag cleared, exiting");
        Ok(())
    }

    fn forward(&mut self, cmd: VelocityCommand) -> Result<()> {
        log::debug!(
            "TcpReceiver: Command linear={:.3} angular={:.3}",
            cmd.linear,
            cmd.angular
        );
        match self.commands.try_send(cmd) {
            Ok(()) => {
                self.forwarded += 1;
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                if self.dropped % 10 == 1 {
                    log::warn!(
                        "TcpReceiver: Command queue full, dropped {} commands",
                        self.dropped
                    );
                }
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(Error::ChannelClosed),
        }
    }
}
