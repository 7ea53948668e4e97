//! TCP command server
//!
//! Accepts one command client at a time. A connecting client's IP is
//! registered for UDP telemetry (`client_ip:udp_port`); further
//! connections are rejected until it disconnects.

use crate::core::types::VelocityCommand;
use crate::error::{Error, Result};
use crate::streaming::tcp_receiver::TcpReceiver;
use crate::streaming::udp_publisher::UdpClientRegistry;
use crate::streaming::wire::Serializer;
use crossbeam_channel::Sender;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Accept poll interval while no connection is pending
const ACCEPT_POLL: Duration = Duration::from_millis(10);

/// Listener that feeds client commands into the control loop
pub struct CommandServer {
    listener: TcpListener,
    udp_port: u16,
    serializer: Serializer,
    commands: Sender<VelocityCommand>,
    registry: UdpClientRegistry,
    running: Arc<AtomicBool>,
}

impl CommandServer {
    /// Bind the command listener
    pub fn bind(
        bind_address: &str,
        udp_port: u16,
        serializer: Serializer,
        commands: Sender<VelocityCommand>,
        registry: UdpClientRegistry,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(bind_address)
            .map_err(|e| Error::Other(format!("Failed to bind to {}: {}", bind_address, e)))?;
        if let Err(e) = listener.set_nonblocking(true) {
            log::warn!("CommandServer: Failed to set nonblocking mode: {}", e);
        }

        log::info!(
            "CommandServer: Listening on {} ({:?} wire format, telemetry to UDP port {})",
            bind_address,
            serializer.format(),
            udp_port
        );

        Ok(Self {
            listener,
            udp_port,
            serializer,
            commands,
            registry,
            running,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the accept loop on its own thread
    pub fn spawn(self) -> Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("command-server".to_string())
            .spawn(move || self.run())
            .map_err(|e| Error::Other(format!("Failed to spawn command server: {}", e)))
    }

    /// Accept loop; returns once the running flag is cleared
    pub fn run(self) {
        let mut receivers: Vec<JoinHandle<()>> = Vec::new();

        while self.running.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if let Some(handle) = self.accept_client(stream, addr) {
                        receivers.push(handle);
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL);
                }
                Err(e) => {
                    log::error!("CommandServer: Accept error: {}", e);
                }
            }
            receivers.retain(|h| !h.is_finished());
        }

        for handle in receivers {
            if handle.join().is_err() {
                log::error!("CommandServer: Receiver thread panicked");
            }
        }
        log::info!("CommandServer: Stopped");
    }

    fn accept_client(&self, stream: TcpStream, addr: SocketAddr) -> Option<JoinHandle<()>> {
        // Registry doubles as the active-client tracker
        {
            let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(active) = *registry {
                log::warn!(
                    "CommandServer: Rejecting connection from {}: already serving {}",
                    addr,
                    active
                );
                let _ = stream.shutdown(Shutdown::Both);
                return None;
            }
            let udp_addr = SocketAddr::new(addr.ip(), self.udp_port);
            *registry = Some(udp_addr);
            log::info!(
                "CommandServer: Client connected: {} (telemetry -> {})",
                addr,
                udp_addr
            );
        }

        if let Err(e) = stream.set_nonblocking(false) {
            log::error!("CommandServer: Failed to set socket to blocking mode: {}", e);
            self.unregister();
            return None;
        }

        let mut receiver = TcpReceiver::new(
            self.serializer.clone(),
            self.commands.clone(),
            Arc::clone(&self.running),
        );
        let registry = Arc::clone(&self.registry);

        let spawned = thread::Builder::new()
            .name("tcp-receiver".to_string())
            .spawn(move || {
                if let Err(e) = receiver.run(stream) {
                    log::error!("CommandServer: Receiver error: {}", e);
                }
                log::info!("CommandServer: Client disconnected: {}", addr);
                *registry.lock().unwrap_or_else(|e| e.into_inner()) = None;
            });

        match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!("CommandServer: Failed to spawn receiver: {}", e);
                self.unregister();
                None
            }
        }
    }

    fn unregister(&self) {
        *self.registry.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}
