//! Integration tests for the control loop against the simulated robot.
//!
//! Scenario tests drive `tick()` with a manual clock so timing is exact.
//! The `run_*` tests use the system clock and a real command channel.

use create_bridge::control::{ControlLoop, LoopConfig};
use create_bridge::core::clock::ManualClock;
use create_bridge::core::telemetry::RecordingSink;
use create_bridge::core::types::{FrameIds, VelocityCommand};
use create_bridge::devices::mock::MockRobot;
use create_bridge::Error;
use crossbeam_channel::unbounded;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

fn loop_config(loop_hz: f64, latch_secs: f64) -> LoopConfig {
    LoopConfig {
        loop_hz,
        latch_duration: Duration::from_secs_f64(latch_secs),
        device: "mock".to_string(),
        ..LoopConfig::default()
    }
}

fn manual_loop(
    config: LoopConfig,
) -> (
    ControlLoop<MockRobot, RecordingSink, ManualClock>,
    MockRobot,
    RecordingSink,
    ManualClock,
) {
    let robot = MockRobot::default();
    let sink = RecordingSink::new();
    let clock = ManualClock::new();
    let control = ControlLoop::with_clock(config, robot.clone(), sink.clone(), clock.clone());
    (control, robot, sink, clock)
}

fn stops(robot: &MockRobot) -> usize {
    robot
        .drive_history()
        .iter()
        .filter(|cmd| cmd.is_stop())
        .count()
}

#[test]
fn test_command_then_silence_stops_after_latch() {
    let (mut control, robot, sink, clock) = manual_loop(loop_config(10.0, 0.5));
    control.initialize().unwrap();

    let cmd = VelocityCommand::new(0.3, 0.1);
    control.on_command(cmd).unwrap();
    assert_eq!(robot.last_drive(), Some(cmd));

    // t = 0.1 .. 0.4: still driving
    for _ in 0..4 {
        clock.advance_secs(0.1);
        let report = control.tick().unwrap();
        assert!(!report.stopped);
        assert_eq!(robot.last_drive(), Some(cmd));
    }
    assert_eq!(stops(&robot), 0);

    // t = 0.6: expired
    clock.advance_secs(0.2);
    let report = control.tick().unwrap();
    assert!(report.stopped);
    assert_eq!(robot.last_drive(), Some(VelocityCommand::stop()));
    assert_eq!(sink.len(), 5);
}

#[test]
fn test_no_command_ever_stops_after_latch() {
    let (mut control, robot, _sink, clock) = manual_loop(loop_config(10.0, 0.5));
    control.initialize().unwrap();

    clock.advance_secs(0.4);
    assert!(!control.tick().unwrap().stopped);
    assert_eq!(stops(&robot), 0);

    clock.advance_secs(0.2);
    assert!(control.tick().unwrap().stopped);
    assert_eq!(robot.drive_history(), vec![VelocityCommand::stop()]);
}

#[test]
fn test_pose_failure_skips_one_record() {
    let (mut control, robot, sink, clock) = manual_loop(loop_config(10.0, 0.5));
    control.initialize().unwrap();

    clock.advance_secs(0.1);
    control.tick().unwrap();

    robot.fail_next_pose(1);
    clock.advance_secs(0.1);
    let err = control.tick().unwrap_err();
    assert!(err.is_recoverable());
    assert_eq!(sink.len(), 1);

    clock.advance_secs(0.1);
    let report = control.tick().unwrap();
    assert_eq!(report.sequence, 1);
    assert_eq!(sink.len(), 2);
    assert_eq!(control.stats().faults, 1);
}

#[test]
fn test_connect_failure_never_ticks() {
    let (mut control, robot, sink, _clock) = manual_loop(loop_config(10.0, 0.5));
    robot.refuse_connect(true);

    let err = control.initialize().unwrap_err();
    assert!(matches!(err, Error::ConnectionFailed { ref device, .. } if device == "mock"));
    assert!(!err.is_recoverable());

    control.shutdown();
    assert_eq!(control.stats().ticks, 0);
    assert!(sink.is_empty());
    assert!(robot.drive_history().is_empty());
}

#[test]
fn test_stop_repeats_every_expired_tick() {
    let (mut control, robot, _sink, clock) = manual_loop(loop_config(10.0, 0.5));
    control.initialize().unwrap();

    clock.advance_secs(0.5);
    for _ in 0..5 {
        assert!(control.tick().unwrap().stopped);
        clock.advance_secs(0.1);
    }
    assert_eq!(stops(&robot), 5);
    assert_eq!(control.stats().stops, 5);
}

#[test]
fn test_command_rearms_after_expiry() {
    let (mut control, robot, _sink, clock) = manual_loop(loop_config(10.0, 0.5));
    control.initialize().unwrap();

    clock.advance_secs(0.6);
    assert!(control.tick().unwrap().stopped);

    let cmd = VelocityCommand::new(0.2, 0.0);
    control.on_command(cmd).unwrap();
    clock.advance_secs(0.1);
    assert!(!control.tick().unwrap().stopped);
    assert_eq!(robot.last_drive(), Some(cmd));
}

#[test]
fn test_command_is_forwarded_before_any_tick() {
    // A 1Hz loop must not delay commands by up to a second
    let (mut control, robot, _sink, clock) = manual_loop(loop_config(1.0, 5.0));
    control.initialize().unwrap();

    clock.advance_secs(0.01);
    let cmd = VelocityCommand::new(-0.1, 0.4);
    control.on_command(cmd).unwrap();

    assert_eq!(robot.last_drive(), Some(cmd));
    assert_eq!(control.stats().ticks, 0);
    assert_eq!(control.latch().last_command(), cmd);
}

#[test]
fn test_stop_latency_bounded_by_latch_plus_period() {
    let latch = 0.5;
    let period = 0.1;
    let (mut control, robot, _sink, clock) = manual_loop(loop_config(1.0 / period, latch));
    control.initialize().unwrap();

    // Command lands mid-period
    clock.advance_secs(0.05);
    control.on_command(VelocityCommand::new(0.3, 0.0)).unwrap();
    let commanded_at = clock.elapsed();

    let mut stopped_at = None;
    for _ in 0..20 {
        clock.advance_secs(period);
        if control.tick().unwrap().stopped {
            stopped_at = Some(clock.elapsed());
            break;
        }
    }

    let latency = stopped_at.unwrap() - commanded_at;
    assert!(latency >= Duration::from_secs_f64(latch));
    assert!(latency <= Duration::from_secs_f64(latch + period) + Duration::from_millis(1));
    assert!(robot.last_drive().unwrap().is_stop());
}

#[test]
fn test_records_are_ordered_and_stamped() {
    let mut config = loop_config(10.0, 0.5);
    config.frames = FrameIds {
        reference: "world".to_string(),
        body: "base_link".to_string(),
    };
    let (mut control, robot, sink, clock) = manual_loop(config);
    control.initialize().unwrap();
    control.on_command(VelocityCommand::new(0.2, 0.0)).unwrap();

    for i in 0..6 {
        if i == 3 {
            robot.fail_next_velocity(1);
        }
        clock.advance_secs(0.1);
        let _ = control.tick();
    }

    let records = sink.records();
    assert_eq!(records.len(), 5);
    for (expected, record) in records.iter().enumerate() {
        assert_eq!(record.sequence, expected as u64);
        assert_eq!(record.frames.reference, "world");
        assert_eq!(record.frames.body, "base_link");
    }
    for pair in records.windows(2) {
        assert!(pair[1].timestamp_us > pair[0].timestamp_us);
    }
}

#[test]
fn test_link_loss_is_fatal() {
    let (mut control, robot, _sink, clock) = manual_loop(loop_config(10.0, 0.5));
    control.initialize().unwrap();

    robot.set_link_lost(true);
    clock.advance_secs(0.1);
    let err = control.tick().unwrap_err();
    assert!(matches!(err, Error::LinkLost(_)));
    assert!(!err.is_recoverable());
    assert_eq!(control.stats().faults, 0);
}

#[test]
fn test_shutdown_sends_final_stop_once() {
    let (mut control, robot, _sink, _clock) = manual_loop(loop_config(10.0, 0.5));
    control.initialize().unwrap();
    control.on_command(VelocityCommand::new(0.3, 0.0)).unwrap();

    control.shutdown();
    control.shutdown();
    drop(control);

    assert_eq!(robot.drive_history().last(), Some(&VelocityCommand::stop()));
    assert_eq!(stops(&robot), 1);
    assert!(!robot.is_connected());
    assert_eq!(robot.disconnect_count(), 1);
}

// === run() with the system clock ===

#[test]
fn test_run_applies_commands_between_ticks() {
    // 2Hz loop: next tick is 500ms away when the command lands
    let robot = MockRobot::default();
    let sink = RecordingSink::new();
    let mut control = ControlLoop::new(loop_config(2.0, 5.0), robot.clone(), sink.clone());
    control.initialize().unwrap();

    let (tx, rx) = unbounded();
    let running = Arc::new(AtomicBool::new(true));
    let loop_running = Arc::clone(&running);
    let handle = thread::spawn(move || control.run(&rx, &loop_running));

    thread::sleep(Duration::from_millis(50));
    let cmd = VelocityCommand::new(0.25, 0.0);
    tx.send(cmd).unwrap();
    thread::sleep(Duration::from_millis(100));

    assert_eq!(robot.last_drive(), Some(cmd));
    assert_eq!(sink.len(), 1);

    running.store(false, Ordering::Relaxed);
    let stats = handle.join().unwrap().unwrap();
    assert_eq!(stats.commands, 1);
    assert_eq!(stats.stops, 0);
}

#[test]
fn test_run_stops_robot_when_commands_cease() {
    let robot = MockRobot::default();
    let mut control = ControlLoop::new(loop_config(20.0, 0.2), robot.clone(), RecordingSink::new());
    control.initialize().unwrap();

    let (tx, rx) = unbounded();
    let running = Arc::new(AtomicBool::new(true));
    let loop_running = Arc::clone(&running);
    let handle = thread::spawn(move || control.run(&rx, &loop_running));

    let sent_at = Instant::now();
    tx.send(VelocityCommand::new(0.3, 0.0)).unwrap();

    let deadline = sent_at + Duration::from_secs(2);
    let mut stopped_after = None;
    while Instant::now() < deadline {
        if robot.last_drive().is_some_and(|cmd| cmd.is_stop()) {
            stopped_after = Some(sent_at.elapsed());
            break;
        }
        thread::sleep(Duration::from_millis(2));
    }

    running.store(false, Ordering::Relaxed);
    handle.join().unwrap().unwrap();

    let latency = stopped_after.unwrap();
    assert!(latency >= Duration::from_millis(200));
    // latch + one period, plus scheduling slack
    assert!(latency < Duration::from_millis(500), "stop took {:?}", latency);
}

#[test]
fn test_run_counts_overruns_on_slow_transport() {
    let robot = MockRobot::default();
    robot.set_latency(Duration::from_millis(30));
    let sink = RecordingSink::new();
    let mut control = ControlLoop::new(loop_config(50.0, 5.0), robot.clone(), sink.clone());
    control.initialize().unwrap();

    let (_tx, rx) = unbounded::<VelocityCommand>();
    let running = Arc::new(AtomicBool::new(true));
    let loop_running = Arc::clone(&running);
    let handle = thread::spawn(move || control.run(&rx, &loop_running));

    thread::sleep(Duration::from_millis(300));
    running.store(false, Ordering::Relaxed);
    let stats = handle.join().unwrap().unwrap();

    // Every snapshot blows the 20ms budget
    assert!(stats.overruns > 0);
    assert_eq!(stats.faults, stats.ticks);
    assert!(sink.is_empty());
}

#[test]
fn test_run_applies_commands_while_overrunning() {
    // Every tick takes 150ms against a 100ms period
    let robot = MockRobot::default();
    robot.set_latency(Duration::from_millis(150));
    let mut control = ControlLoop::new(loop_config(10.0, 1.0), robot.clone(), RecordingSink::new());
    control.initialize().unwrap();

    let (tx, rx) = unbounded();
    let running = Arc::new(AtomicBool::new(true));
    let loop_running = Arc::clone(&running);
    let handle = thread::spawn(move || control.run(&rx, &loop_running));

    let cmd = VelocityCommand::new(0.3, 0.1);
    for _ in 0..10 {
        tx.send(cmd).unwrap();
        thread::sleep(Duration::from_millis(100));
    }

    running.store(false, Ordering::Relaxed);
    let stats = handle.join().unwrap().unwrap();

    assert!(stats.overruns > 0);
    assert!(stats.commands >= 8, "only {} commands applied", stats.commands);
    assert_eq!(stats.stops, 0);
    let history = robot.drive_history();
    assert!(history.iter().filter(|c| **c == cmd).count() >= 8);
}

#[test]
fn test_run_returns_link_loss() {
    let robot = MockRobot::default();
    let mut control = ControlLoop::new(loop_config(10.0, 0.5), robot.clone(), RecordingSink::new());
    control.initialize().unwrap();
    robot.set_link_lost(true);

    let (_tx, rx) = unbounded::<VelocityCommand>();
    let running = AtomicBool::new(true);
    let err = control.run(&rx, &running).unwrap_err();
    assert!(matches!(err, Error::LinkLost(_)));
    assert_eq!(control.stats().ticks, 1);
}

#[test]
fn test_run_reports_closed_command_channel() {
    let mut control = ControlLoop::new(
        loop_config(10.0, 0.5),
        MockRobot::default(),
        RecordingSink::new(),
    );
    control.initialize().unwrap();

    let (tx, rx) = unbounded::<VelocityCommand>();
    drop(tx);
    let running = AtomicBool::new(true);
    assert!(matches!(control.run(&rx, &running), Err(Error::ChannelClosed)));

    // Same channel state during shutdown is a clean exit
    let stopping = AtomicBool::new(false);
    assert!(control.run(&rx, &stopping).is_ok());
}
