//! Network front end: TCP commands in, UDP telemetry out

pub mod messages;
pub mod server;
pub mod tcp_receiver;
pub mod udp_publisher;
pub mod wire;

pub use messages::Message;
pub use server::CommandServer;
pub use tcp_receiver::TcpReceiver;
pub use udp_publisher::{UdpClientRegistry, UdpTelemetrySink};
pub use wire::{Serializer, WireFormat};
