//! System-wide constants for the Kestrel workspace.
//!
//! Single source of truth for numeric limits and cadence defaults.
//! Imported by all crates; do not duplicate these values elsewhere.

use static_assertions::const_assert;

/// Number of operator controllers reported by the driver station.
pub const MAX_JOYSTICKS: usize = 6;

/// Maximum axes per controller.
pub const MAX_JOYSTICK_AXES: usize = 12;

/// Maximum POV hats per controller.
pub const MAX_JOYSTICK_POVS: usize = 12;

/// Maximum buttons per controller (width of the button mask).
pub const MAX_JOYSTICK_BUTTONS: u8 = 32;

/// Acquisition iterations between telemetry publishes.
pub const DEFAULT_TELEMETRY_EVERY: u32 = 2;

/// Acquisition iterations between safety registry checks.
pub const DEFAULT_SAFETY_EVERY: u32 = 4;

/// Global cooldown between two "device missing" diagnostics [ms].
pub const DEFAULT_COMPLAIN_COOLDOWN_MS: u64 = 5_000;

/// `SCHED_FIFO` priority of the acquisition thread when RT is enabled.
pub const DEFAULT_ACQUISITION_RT_PRIORITY: i32 = 40;

/// Name of the acquisition thread (visible in `ps -L` / `top -H`).
pub const ACQUISITION_THREAD_NAME: &str = "ds-acquisition";

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/kestrel/kestrel.toml";

const_assert!(MAX_JOYSTICK_BUTTONS as u32 <= u32::BITS);
const_assert!(DEFAULT_TELEMETRY_EVERY > 0 && DEFAULT_SAFETY_EVERY > 0);
