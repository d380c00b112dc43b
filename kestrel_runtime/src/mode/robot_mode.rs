//! The RobotMode lifecycle contract.

use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

use kestrel_common::hal::source::HalError;

/// Error returned by a mode hook.
#[derive(Debug, Clone, Error)]
pub enum ModeError {
    /// The hook failed for a reason of its own.
    #[error("{0}")]
    Failed(String),

    /// A hardware call inside the hook failed.
    #[error("HAL error: {0}")]
    Hal(#[from] HalError),
}

/// User handler bound to one game mode.
///
/// Hooks run on the scheduler thread. `enter` and `exit` failures are logged
/// and the transition completes anyway; a `periodic` failure stops the
/// control loop.
pub trait RobotMode: Send {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Called once when the mode becomes active.
    fn enter(&mut self) -> Result<(), ModeError> {
        Ok(())
    }

    /// Called once per driver-station packet while active.
    fn periodic(&mut self) -> Result<(), ModeError> {
        Ok(())
    }

    /// Called once when another mode takes over.
    fn exit(&mut self) -> Result<(), ModeError> {
        Ok(())
    }
}

/// Shared, lockable handle to a registered mode.
pub type ModeHandle = Arc<Mutex<dyn RobotMode>>;

/// Wrap a mode into a [`ModeHandle`].
pub fn mode_handle<M: RobotMode + 'static>(mode: M) -> ModeHandle {
    Arc::new(Mutex::new(mode))
}

/// Handler used for slots nobody registered; every hook succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMode;

impl NoopMode {
    /// Diagnostic name of the placeholder handler.
    pub const NAME: &'static str = "<unregistered>";
}

impl RobotMode for NoopMode {
    fn name(&self) -> &str {
        Self::NAME
    }
}
