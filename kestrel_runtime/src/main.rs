//! # Kestrel
//!
//! Runs the driver-station acquisition thread and the mode scheduler against
//! a status-source backend, with a small set of demonstration modes.
//!
//! Configuration is read from `--config`, else from
//! `/etc/kestrel/kestrel.toml` if it exists, else built-in defaults.
//! Ctrl-C requests a graceful stop; any fatal condition exits with status 1.

use clap::Parser;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use kestrel_common::config::{ConfigError, LogLevel};
use kestrel_common::consts::DEFAULT_CONFIG_PATH;
use kestrel_common::mode::GameMode;
use kestrel_runtime::config::{RuntimeConfig, load_config};
use kestrel_runtime::mode::{ModeError, ModeScheduler, RobotMode, mode_handle};
use kestrel_runtime::safety::{MotorSafety, SafetyRegistry};
use kestrel_runtime::{DriverStation, SourceRegistry};

/// Kestrel robot runtime
#[derive(Parser, Debug)]
#[command(name = "kestrel")]
#[command(version)]
#[command(about = "Driver-station acquisition and robot mode scheduler")]
struct Args {
    /// Path to the runtime configuration TOML.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Status-source backend.
    #[arg(long, default_value = "simulation")]
    source: String,

    /// Override `acquisition.rt_priority` (SCHED_FIFO).
    #[arg(long)]
    rt_priority: Option<i32>,

    /// Override `acquisition.cpu_core` (`rt` feature only).
    #[arg(long)]
    cpu_core: Option<usize>,

    /// List the available status-source backends and exit.
    #[arg(long)]
    list_sources: bool,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    let config = resolve_config(&args);
    let log_level = config
        .as_ref()
        .map(|c| c.shared.log_level)
        .unwrap_or_default();
    setup_tracing(&args, log_level);

    info!("Kestrel v{} starting...", env!("CARGO_PKG_VERSION"));

    let result = config
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)
        .and_then(|config| run(&args, config));
    if let Err(e) = result {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("Kestrel shutdown complete");
}

fn resolve_config(args: &Args) -> Result<RuntimeConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default.exists() {
                load_config(&default)?
            } else {
                RuntimeConfig::default()
            }
        }
    };
    if let Some(priority) = args.rt_priority {
        config.acquisition.rt_priority = priority;
    }
    if args.cpu_core.is_some() {
        config.acquisition.cpu_core = args.cpu_core;
    }
    config.validate()?;
    Ok(config)
}

fn run(args: &Args, config: RuntimeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let registry = SourceRegistry::with_builtin();
    if args.list_sources {
        for name in registry.list() {
            println!("{name}");
        }
        return Ok(());
    }

    info!(
        service = %config.shared.service_name,
        source = %args.source,
        telemetry_every = config.acquisition.telemetry_every,
        safety_every = config.acquisition.safety_every,
        "Config OK"
    );

    let source = registry.create(&args.source, &config)?;

    let safety = Arc::new(SafetyRegistry::new());
    let drive = Arc::new(MotorSafety::new("Drive", || {
        warn!("Drive outputs zeroed by watchdog");
    }));
    safety.register(drive.clone());

    let station = Arc::new(DriverStation::new(source, &config).with_safety(safety));
    register_demo_modes(&station, &drive);

    let stopper = Arc::clone(&station);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        stopper.request_stop(true);
    })?;

    station.start_acquisition()?;
    let mut scheduler = ModeScheduler::with_config(Arc::clone(&station), &config.scheduler);
    let result = scheduler.run();

    station.request_stop(true);
    station.join_acquisition();
    info!(stats = ?station.stats(), "Acquisition statistics");

    result?;
    Ok(())
}

// ─── Demonstration modes ────────────────────────────────────────────

/// Logs its lifecycle and, when given a drive watchdog, drives from stick 0.
struct DemoMode {
    name: &'static str,
    station: Arc<DriverStation>,
    drive: Option<Arc<MotorSafety>>,
    ticks: u64,
}

impl RobotMode for DemoMode {
    fn name(&self) -> &str {
        self.name
    }

    fn enter(&mut self) -> Result<(), ModeError> {
        info!("{} mode entered", self.name);
        self.ticks = 0;
        if let Some(drive) = &self.drive {
            drive.feed();
            drive.set_enabled(true);
        }
        Ok(())
    }

    fn periodic(&mut self) -> Result<(), ModeError> {
        self.ticks += 1;
        if let Some(drive) = &self.drive {
            let forward = -self.station.read_axis(0, 1);
            let turn = self.station.read_axis(0, 0);
            drive.feed();
            if self.ticks % 50 == 0 {
                debug!(forward, turn, match_time = self.station.match_time(), "drive");
            }
        }
        Ok(())
    }

    fn exit(&mut self) -> Result<(), ModeError> {
        if let Some(drive) = &self.drive {
            drive.set_enabled(false);
        }
        info!("{} mode exited after {} cycles", self.name, self.ticks);
        Ok(())
    }
}

fn register_demo_modes(station: &Arc<DriverStation>, drive: &Arc<MotorSafety>) {
    for (mode, name, drive) in [
        (GameMode::Disabled, "Disabled", None),
        (GameMode::Auton, "Autonomous", Some(Arc::clone(drive))),
        (GameMode::Teleop, "Teleop", Some(Arc::clone(drive))),
        (GameMode::Test, "Test", None),
    ] {
        station.register(
            mode,
            mode_handle(DemoMode {
                name,
                station: Arc::clone(station),
                drive,
                ticks: 0,
            }),
        );
    }
}

/// Setup tracing subscriber from the configured level and CLI flags.
///
/// `RUST_LOG` takes precedence; `-v` forces DEBUG.
fn setup_tracing(args: &Args, level: LogLevel) {
    let directive = if args.verbose {
        LogLevel::Debug.as_directive()
    } else {
        level.as_directive()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
