//! StatusSource trait and error types.
//!
//! This module defines:
//! - `StatusSource` trait - Interface to the driver-station link
//! - `HalError` enum - Error types for HAL operations

use std::time::Duration;
use thiserror::Error;

use crate::hal::types::{AllianceStation, ControlWord, JoystickData};
use crate::mode::GameMode;

/// Error types for HAL operations.
#[derive(Debug, Clone, Error)]
pub enum HalError {
    /// Backend initialization failed
    #[error("Initialization failed: {0}")]
    InitFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Driver-station link error
    #[error("Communication error: {0}")]
    CommunicationError(String),

    /// No backend registered under the requested name
    #[error("Status source not found: {0}")]
    SourceNotFound(String),

    /// Joystick port outside the supported range
    #[error("Joystick port {0} out of range")]
    InvalidPort(usize),
}

/// Interface to the driver-station link.
///
/// The acquisition thread is the only caller of the data methods; the
/// scheduler only uses the heartbeat and error-report sinks.
///
/// # Lifecycle
///
/// 1. `wait_for_data()` - Blocks until the next driver-station packet
/// 2. `status_word()` / `joystick()` / ... - Read the packet's fields
/// 3. `interrupt()` - Releases a blocked `wait_for_data()` during shutdown
///
/// # Timing Contracts
///
/// | Operation | Blocking | Caller |
/// |-----------|----------|--------|
/// | `wait_for_data()` | until packet, timeout or interrupt | acquisition thread |
/// | field reads | never | acquisition thread |
/// | `observe_user_program()` | never | scheduler thread |
/// | `report_error()` | never | any |
pub trait StatusSource: Send + Sync {
    /// Backend identifier (e.g., "simulation").
    fn name(&self) -> &'static str;

    /// Block until a new packet is available.
    ///
    /// `None` waits indefinitely. Returns `Ok(true)` when new data arrived
    /// and `Ok(false)` on timeout or after `interrupt()`.
    fn wait_for_data(&self, timeout: Option<Duration>) -> Result<bool, HalError>;

    /// Release every thread blocked in `wait_for_data()`.
    fn interrupt(&self);

    /// Raw status word of the latest packet (see [`ControlWord`] for bits).
    fn status_word(&self) -> Result<u32, HalError>;

    /// Raw state of one controller port.
    ///
    /// # Errors
    /// `HalError::InvalidPort` if `port` is outside `0..MAX_JOYSTICKS`.
    fn joystick(&self, port: usize) -> Result<JoystickData, HalError>;

    /// Seconds remaining in the current match period, negative if unknown.
    fn match_time(&self) -> Result<f64, HalError>;

    /// Alliance and station position.
    fn alliance_station(&self) -> Result<AllianceStation, HalError>;

    /// Heartbeat telling the driver station the user program is alive in `mode`.
    fn observe_user_program(&self, mode: GameMode);

    /// Forward a diagnostic to the operator console.
    fn report_error(&self, is_error: bool, code: i32, details: &str, location: &str);

    /// Decoded status word.
    fn control_word(&self) -> Result<ControlWord, HalError> {
        Ok(ControlWord::from_raw(self.status_word()?))
    }
}
