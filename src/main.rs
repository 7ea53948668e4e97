//! create-bridge - Command/telemetry bridge for iRobot Create
//!
//! ## Protocol Architecture
//!
//! - **TCP (port 5555)**: Velocity commands from one client at a time
//! - **UDP (same port)**: Telemetry unicast to the connected client
//!
//! ## Exit codes
//!
//! - `0`: stopped by signal
//! - `1`: unrecoverable error while running
//! - `2`: startup failed (config, robot connection, sockets)
//! - `101`: panic (logged as fatal; the robot is still stopped and released
//!   while the control loop unwinds)

use clap::Parser;
use create_bridge::config::Config;
use create_bridge::control::{ControlLoop, LoopConfig};
use create_bridge::devices::create_transport;
use create_bridge::error::{self, Error, Result};
use create_bridge::streaming::{CommandServer, Serializer, UdpClientRegistry, UdpTelemetrySink};
use std::path::Path;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Commands queued between the network thread and the control loop
const COMMAND_QUEUE_DEPTH: usize = 64;

/// Command/telemetry bridge for iRobot Create
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/create-bridge.toml")]
    config: String,

    /// Serial device (overrides robot.device)
    #[arg(long)]
    device: Option<String>,

    /// Serial baud rate (overrides robot.baud)
    #[arg(long)]
    baud: Option<u32>,

    /// Tick rate in Hz (overrides control.loop_hz)
    #[arg(long)]
    loop_hz: Option<f64>,

    /// Seconds without a command before stopping (overrides control.latch_duration)
    #[arg(long)]
    latch_duration: Option<f64>,

    /// Use the simulated robot instead of a serial link
    #[arg(long)]
    mock: bool,
}

/// How the bridge ended
enum Outcome {
    Stopped,
    RuntimeFailure,
    StartupFailure,
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Stopped => ExitCode::SUCCESS,
            Outcome::RuntimeFailure => ExitCode::from(1),
            Outcome::StartupFailure => ExitCode::from(2),
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let (config, from_file) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            init_logging("info");
            log::error!("Invalid configuration: {}", e);
            return Outcome::StartupFailure.into();
        }
    };
    init_logging(&config.logging.level);
    error::install_panic_hook();

    log::info!("create-bridge v{} starting...", env!("CARGO_PKG_VERSION"));
    if from_file {
        log::info!("Using config: {}", args.config);
    } else {
        log::warn!("Config {} not found, using defaults", args.config);
    }
    log::info!(
        "Robot: {} on {} @ {} baud",
        config.robot.device_type,
        config.robot.device,
        config.robot.baud
    );

    run(config).into()
}

/// Load the config file (defaults if absent) and apply CLI overrides
///
/// Returns whether the file was found.
fn load_config(args: &Args) -> Result<(Config, bool)> {
    let from_file = Path::new(&args.config).exists();
    let mut config = if from_file {
        Config::load(&args.config)?
    } else {
        Config::default()
    };

    if let Some(device) = &args.device {
        config.robot.device = device.clone();
    }
    if let Some(baud) = args.baud {
        config.robot.baud = baud;
    }
    if let Some(hz) = args.loop_hz {
        config.control.loop_hz = hz;
    }
    if let Some(latch) = args.latch_duration {
        config.control.latch_duration = latch;
    }
    if args.mock {
        config.robot.device_type = "mock".to_string();
    }

    config.validate()?;
    Ok((config, from_file))
}

/// Initialize env_logger; RUST_LOG takes precedence over the config level
fn init_logging(level: &str) {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .try_init();
}

fn run(config: Config) -> Outcome {
    let transport = match create_transport(&config) {
        Ok(transport) => transport,
        Err(e) => {
            log::error!("Failed to create transport: {}", e);
            return Outcome::StartupFailure;
        }
    };

    let serializer = Serializer::new(config.network.wire_format);
    let registry: UdpClientRegistry = Arc::new(Mutex::new(None));
    let sink = match UdpTelemetrySink::bind(serializer.clone(), Arc::clone(&registry)) {
        Ok(sink) => sink,
        Err(e) => {
            log::error!("{}", e);
            return Outcome::StartupFailure;
        }
    };

    let mut control = ControlLoop::new(LoopConfig::from_config(&config), transport, sink);
    if let Err(e) = control.initialize() {
        log::error!("Startup failed: {}", e);
        control.shutdown();
        return Outcome::StartupFailure;
    }

    // Set up shutdown signal handler
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    }) {
        log::error!("Error setting Ctrl-C handler: {}", e);
        control.shutdown();
        return Outcome::StartupFailure;
    }

    let (command_tx, command_rx) = crossbeam_channel::bounded(COMMAND_QUEUE_DEPTH);
    let server = match CommandServer::bind(
        &config.network.bind_address,
        config.network.udp_port(),
        serializer,
        command_tx,
        Arc::clone(&registry),
        Arc::clone(&running),
    )
    .and_then(CommandServer::spawn)
    {
        Ok(handle) => handle,
        Err(e) => {
            log::error!("{}", e);
            control.shutdown();
            return Outcome::StartupFailure;
        }
    };

    log::info!("create-bridge running. Press Ctrl-C to stop.");
    let result = control.run(&command_rx, &running);

    // Stop the robot before waiting on network threads
    running.store(false, Ordering::Relaxed);
    control.shutdown();
    if server.join().is_err() {
        log::error!("Command server thread panicked");
    }

    match result {
        Ok(stats) => {
            log::info!(
                "create-bridge stopped ({} ticks, {} commands)",
                stats.ticks,
                stats.commands
            );
            Outcome::Stopped
        }
        Err(e) => {
            log::error!("Stopped on error: {}", e);
            match e {
                Error::ChannelClosed => log::error!("Command server exited unexpectedly"),
                Error::LinkLost(_) => log::error!("Robot link lost"),
                _ => {}
            }
            Outcome::RuntimeFailure
        }
    }
}
