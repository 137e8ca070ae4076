//! Ground Node daemon
//!
//! Listens for the Water Node on the sensor and control channels, relays
//! console gamepad input as motor commands, and shuts down on Ctrl-C, `q`,
//! or the controller's stop button.

use clap::Parser;
use ground_node::input::{AxisMixer, ChannelGamepad, SingleController};
use ground_node::video::IdleVideoSource;
use ground_node::{Collaborators, GroundConfig, GroundNode, Result, trigger};
use std::path::PathBuf;
use std::time::Duration;

/// Operator-side teleoperation node
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log every frame sent and received
    #[arg(short, long)]
    verbose: bool,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = GroundConfig::load(args.config.as_deref())?;
    if args.verbose {
        config.logging.verbose = true;
    }
    let level = match (&args.log_level, config.logging.verbose) {
        (Some(level), _) => level.clone(),
        (None, true) => "debug".to_string(),
        (None, false) => config.logging.level.clone(),
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    log::info!("Ground Node v{} starting...", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &args.config {
        log::info!("Using config: {}", path.display());
    }
    log::info!(
        "Sensor port {}, control port {} on {}",
        config.network.sensor_port,
        config.network.control_port,
        config.network.host
    );

    let node = GroundNode::new(config);
    let run_state = node.run_state();

    trigger::install_ctrl_c(run_state.clone())?;

    let (events, gamepad) = ChannelGamepad::pair("console");
    trigger::spawn_console(run_state, events)?;
    log::info!("Press 'q' then Enter (or Ctrl-C) to stop");

    let running = node.start(Collaborators {
        controllers: Box::new(SingleController::new(gamepad)),
        mixer: Box::new(AxisMixer::new()),
        video: Box::new(IdleVideoSource::new(Duration::from_millis(500))),
    })?;

    let report = running.wait();
    if let Some(stats) = report.telemetry {
        log::info!("Telemetry: {}", stats);
    }
    if let Some(stats) = report.dispatch {
        log::info!(
            "Dispatch: {} motor frames, {} closing frames",
            stats.motor_frames,
            stats.closing_frames
        );
    }

    log::info!("Ground Node stopped");
    Ok(())
}
