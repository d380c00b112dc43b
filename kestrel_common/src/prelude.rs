//! Prelude module for common re-exports.
//!
//! ```rust
//! use kestrel_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{MAX_JOYSTICKS, MAX_JOYSTICK_AXES, MAX_JOYSTICK_BUTTONS, MAX_JOYSTICK_POVS};

// ─── HAL ────────────────────────────────────────────────────────────
pub use crate::hal::source::{HalError, StatusSource};
pub use crate::hal::types::{AllianceStation, ControlWord, JoystickData};

// ─── Modes ──────────────────────────────────────────────────────────
pub use crate::mode::GameMode;
