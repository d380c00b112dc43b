//! Runtime configuration (`kestrel.toml`).
//!
//! Every section is optional; an empty file yields the defaults below.
//!
//! ```toml
//! [shared]
//! service_name = "practice-bot"
//! log_level = "info"
//!
//! [acquisition]
//! telemetry_every = 2
//! safety_every = 4
//! rt_priority = 40
//! # cpu_core = 1
//!
//! [warner]
//! cooldown_ms = 5000
//!
//! [scheduler]
//! # wait_timeout_ms = 100
//! trim_heap_on_transition = false
//!
//! [simulation]
//! period_ms = 20
//! controllers = 1
//! alliance = 1
//! script = [
//!     { mode = "disabled", seconds = 2.0 },
//!     { mode = "auton", seconds = 15.0 },
//!     { mode = "teleop", seconds = 135.0 },
//! ]
//! ```

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use kestrel_common::config::{ConfigError, ConfigLoader, SharedConfig};
use kestrel_common::consts::{
    DEFAULT_ACQUISITION_RT_PRIORITY, DEFAULT_COMPLAIN_COOLDOWN_MS, DEFAULT_SAFETY_EVERY,
    DEFAULT_TELEMETRY_EVERY, MAX_JOYSTICKS,
};
use kestrel_common::mode::GameMode;

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Service name and log level.
    pub shared: SharedConfig,
    /// Acquisition thread settings.
    pub acquisition: AcquisitionConfig,
    /// Missing-device warning throttle.
    pub warner: WarnerConfig,
    /// Mode scheduler settings.
    pub scheduler: SchedulerConfig,
    /// Simulated driver station.
    pub simulation: SimulationConfig,
}

/// Acquisition thread settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AcquisitionConfig {
    /// Cycles between telemetry publishes.
    pub telemetry_every: u32,
    /// Cycles between safety registry checks.
    pub safety_every: u32,
    /// `SCHED_FIFO` priority, attempted on Linux.
    pub rt_priority: i32,
    /// CPU core to pin the thread to (only with the `rt` feature).
    pub cpu_core: Option<usize>,
    /// Bounded wait on the status source [ms]; `None` waits indefinitely.
    pub wait_timeout_ms: Option<u64>,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            telemetry_every: DEFAULT_TELEMETRY_EVERY,
            safety_every: DEFAULT_SAFETY_EVERY,
            rt_priority: DEFAULT_ACQUISITION_RT_PRIORITY,
            cpu_core: None,
            wait_timeout_ms: None,
        }
    }
}

impl AcquisitionConfig {
    /// Status-source wait timeout.
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }
}

/// Missing-device warning throttle.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WarnerConfig {
    /// Global cooldown between two emitted warnings [ms].
    pub cooldown_ms: u64,
}

impl Default for WarnerConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: DEFAULT_COMPLAIN_COOLDOWN_MS,
        }
    }
}

impl WarnerConfig {
    /// Cooldown as a `Duration`.
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Mode scheduler settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Bounded wait for new data [ms]; `None` waits indefinitely.
    pub wait_timeout_ms: Option<u64>,
    /// Ask the allocator to return free memory on every mode transition.
    pub trim_heap_on_transition: bool,
}

impl SchedulerConfig {
    /// Wait timeout as a `Duration`.
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }
}

/// Mode selected by one step of the simulation script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimMode {
    /// Enabled bit clear.
    Disabled,
    /// Enabled + autonomous.
    Auton,
    /// Enabled only.
    Teleop,
    /// Enabled + test.
    Test,
}

impl SimMode {
    /// Mode the scheduler will arbitrate for this step.
    pub const fn game_mode(self) -> GameMode {
        match self {
            Self::Disabled => GameMode::Disabled,
            Self::Auton => GameMode::Auton,
            Self::Teleop => GameMode::Teleop,
            Self::Test => GameMode::Test,
        }
    }
}

/// One entry of the simulated match script.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptStep {
    /// Mode to report.
    pub mode: SimMode,
    /// How long to report it [s].
    pub seconds: f64,
}

/// Simulated driver station.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Packet period [ms].
    pub period_ms: u64,
    /// Number of connected controllers (ports `0..controllers`).
    pub controllers: usize,
    /// Raw alliance station code (1-3 red, 4-6 blue).
    pub alliance: u8,
    /// Mode script; the last step is held once the script ends.
    pub script: Vec<ScriptStep>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            period_ms: 20,
            controllers: 1,
            alliance: 1,
            script: vec![
                ScriptStep { mode: SimMode::Disabled, seconds: 2.0 },
                ScriptStep { mode: SimMode::Auton, seconds: 15.0 },
                ScriptStep { mode: SimMode::Disabled, seconds: 1.0 },
                ScriptStep { mode: SimMode::Teleop, seconds: 135.0 },
                ScriptStep { mode: SimMode::Disabled, seconds: 1.0 },
            ],
        }
    }
}

impl SimulationConfig {
    /// Packet period as a `Duration`.
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

impl RuntimeConfig {
    /// Check semantic constraints serde cannot express.
    ///
    /// # Errors
    /// `ConfigError::ValidationError` naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        if self.acquisition.telemetry_every == 0 {
            return Err(invalid("acquisition.telemetry_every must be > 0"));
        }
        if self.acquisition.safety_every == 0 {
            return Err(invalid("acquisition.safety_every must be > 0"));
        }
        if !(1..=99).contains(&self.acquisition.rt_priority) {
            return Err(invalid("acquisition.rt_priority must be in 1..=99"));
        }
        if self.simulation.period_ms == 0 {
            return Err(invalid("simulation.period_ms must be > 0"));
        }
        if self.simulation.controllers > MAX_JOYSTICKS {
            return Err(ConfigError::ValidationError(format!(
                "simulation.controllers must be <= {MAX_JOYSTICKS}"
            )));
        }
        if let Some(step) = self
            .simulation
            .script
            .iter()
            .find(|s| !s.seconds.is_finite() || s.seconds <= 0.0)
        {
            return Err(ConfigError::ValidationError(format!(
                "simulation.script step {:?} must last a positive number of seconds",
                step.mode
            )));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::ValidationError(msg.to_string())
}

/// Load and validate a runtime configuration file.
pub fn load_config(path: &Path) -> Result<RuntimeConfig, ConfigError> {
    let config = RuntimeConfig::load(path)?;
    config.validate()?;
    Ok(config)
}
