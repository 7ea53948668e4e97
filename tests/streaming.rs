//! Loopback tests for the command server and UDP telemetry sink.

use create_bridge::core::telemetry::TelemetrySink;
use create_bridge::core::types::{FrameIds, Pose, TelemetryRecord, Velocity, VelocityCommand};
use create_bridge::streaming::wire::read_frame;
use create_bridge::streaming::{
    CommandServer, Message, Serializer, UdpClientRegistry, UdpTelemetrySink, WireFormat,
};
use crossbeam_channel::bounded;
use std::io::{Cursor, Read, Write};
use std::net::{TcpStream, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn send_frame(stream: &mut TcpStream, serializer: &Serializer, msg: &Message) {
    let mut frame = Vec::new();
    serializer.encode_frame(msg, &mut frame).unwrap();
    stream.write_all(&frame).unwrap();
}

#[test]
fn test_command_in_telemetry_out() {
    let serializer = Serializer::new(WireFormat::Json);
    let telemetry_socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    telemetry_socket
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    let udp_port = telemetry_socket.local_addr().unwrap().port();

    let registry: UdpClientRegistry = Arc::new(Mutex::new(None));
    let running = Arc::new(AtomicBool::new(true));
    let (tx, rx) = bounded(8);

    let server = CommandServer::bind(
        "127.0.0.1:0",
        udp_port,
        serializer.clone(),
        tx,
        Arc::clone(&registry),
        Arc::clone(&running),
    )
    .unwrap();
    let addr = server.local_addr().unwrap();
    let server_handle = server.spawn().unwrap();

    // Command path
    let mut client = TcpStream::connect(addr).unwrap();
    let cmd = VelocityCommand::new(0.2, -0.3);
    send_frame(&mut client, &serializer, &Message::Command(cmd));
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), cmd);

    // Garbage is dropped, connection survives
    client.write_all(&[0, 0, 0, 3, b'x', b'y', b'z']).unwrap();
    let next = VelocityCommand::stop();
    send_frame(&mut client, &serializer, &Message::Command(next));
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), next);

    // Client is registered for telemetry
    assert_eq!(
        registry.lock().unwrap().map(|a| a.port()),
        Some(udp_port)
    );

    // A second client is turned away
    let mut intruder = TcpStream::connect(addr).unwrap();
    intruder
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    let mut buf = [0u8; 1];
    assert_eq!(intruder.read(&mut buf).unwrap_or(0), 0);

    // Telemetry path
    let mut sink = UdpTelemetrySink::bind(serializer.clone(), Arc::clone(&registry)).unwrap();
    let record = TelemetryRecord::new(
        3,
        42,
        Pose::new(0.5, -0.25, 1.0),
        Velocity::new(0.2, 0.0, -0.3),
        FrameIds::default(),
    );
    sink.publish(&record).unwrap();

    let mut datagram = [0u8; 2048];
    let n = telemetry_socket.recv(&mut datagram).unwrap();
    let mut payload = Vec::new();
    read_frame(&mut Cursor::new(&datagram[..n]), &mut payload).unwrap();
    assert_eq!(
        serializer.deserialize(&payload).unwrap(),
        Message::Telemetry(record)
    );

    // Disconnect clears the registration
    drop(client);
    let mut cleared = false;
    for _ in 0..200 {
        if registry.lock().unwrap().is_none() {
            cleared = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(cleared);

    running.store(false, Ordering::Relaxed);
    server_handle.join().unwrap();
}

#[test]
fn test_sink_without_client_sends_nothing() {
    let registry: UdpClientRegistry = Arc::new(Mutex::new(None));
    let mut sink = UdpTelemetrySink::bind(Serializer::new(WireFormat::Postcard), registry).unwrap();
    let record = TelemetryRecord::new(
        0,
        0,
        Pose::default(),
        Velocity::default(),
        FrameIds::default(),
    );
    assert!(sink.publish(&record).is_ok());
}
