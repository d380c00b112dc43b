//! Mode scheduler: the consumer side of the acquisition signal.
//!
//! ## Iteration
//! 1. Wait for new data (optional timeout; a timeout falls through).
//! 2. Compare the mode bits of the latest control word with the cached bits.
//! 3. On change: `exit` the active mode, activate the new one, hint the
//!    allocator, `enter` the new mode.
//! 4. Consume the new-data flag; if it was set, send the heartbeat and run
//!    `periodic`.
//!
//! `enter`/`exit` failures are logged `FATAL` and the loop continues.
//! A `periodic` failure ends [`ModeScheduler::run`] with an error.
//!
//! The scheduler starts in `Disabled` without calling its `enter` hook: the
//! cached mode bits start at zero, which already decodes as disabled, so the
//! first packet with the enabled bit clear is not a transition.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

use kestrel_common::hal::types::ControlWord;
use kestrel_common::mode::GameMode;

use super::robot_mode::{ModeError, ModeHandle};
use crate::config::SchedulerConfig;
use crate::signal::WaitOutcome;
use crate::station::DriverStation;

/// Error code attached to lifecycle failures forwarded to the status source.
const MODE_FAILURE_CODE: i32 = 1;

// ─── Errors ─────────────────────────────────────────────────────────

/// Conditions that end the scheduler loop.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A `periodic` hook failed.
    #[error("periodic hook of mode '{mode}' failed: {source}")]
    PeriodicFailed {
        /// Name of the failing mode.
        mode: String,
        /// Error returned by the hook.
        #[source]
        source: ModeError,
    },

    /// The acquisition thread died; no more data will arrive.
    #[error("acquisition thread stopped unexpectedly")]
    AcquisitionStopped,
}

// ─── Dispatch Policy ────────────────────────────────────────────────

/// Lifecycle hook being dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    /// Mode became active.
    Enter,
    /// One packet while active.
    Periodic,
    /// Mode is being left.
    Exit,
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Enter => "enter",
            Self::Periodic => "periodic",
            Self::Exit => "exit",
        })
    }
}

/// What to do when a hook returns an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log `FATAL`, report to the status source, keep going.
    LogAndContinue,
    /// Return the error to the loop owner.
    Escalate,
}

// ─── Scheduler ──────────────────────────────────────────────────────

/// Result of one [`ModeScheduler::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// New data was consumed and `periodic` ran.
    Ran,
    /// No new data (timeout); only a transition check happened.
    Idle,
    /// A graceful stop was requested.
    Stopped,
}

/// Drives the active [`RobotMode`](super::RobotMode) from driver-station data.
pub struct ModeScheduler {
    station: Arc<DriverStation>,
    last_mode_bits: ControlWord,
    active: ModeHandle,
    started: bool,
    trim_heap: bool,
    wait_timeout: Option<Duration>,
    transitions: u64,
}

impl ModeScheduler {
    /// Scheduler over `station` with default settings.
    pub fn new(station: Arc<DriverStation>) -> Self {
        Self::with_config(station, &SchedulerConfig::default())
    }

    /// Scheduler over `station` with explicit settings.
    pub fn with_config(station: Arc<DriverStation>, config: &SchedulerConfig) -> Self {
        let active = station.modes().lookup(GameMode::None);
        Self {
            station,
            last_mode_bits: ControlWord::empty(),
            active,
            started: false,
            trim_heap: config.trim_heap_on_transition,
            wait_timeout: config.wait_timeout(),
            transitions: 0,
        }
    }

    /// Activate `Disabled` without calling its `enter` hook.
    ///
    /// Called implicitly by the first `step`; idempotent.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        self.last_mode_bits = ControlWord::empty();
        self.active = self.station.modes().activate(GameMode::Disabled);
        info!(
            "Mode scheduler started in '{}' ({})",
            GameMode::Disabled,
            self.active.lock().name()
        );
    }

    /// Run one iteration.
    ///
    /// # Errors
    /// `PeriodicFailed` if the active mode's `periodic` failed;
    /// `AcquisitionStopped` if the producer died.
    pub fn step(&mut self, timeout: Option<Duration>) -> Result<StepOutcome, SchedulerError> {
        self.start();

        if self.station.wait_for_data(timeout) == WaitOutcome::Released {
            if self.station.acquisition_failed() {
                return Err(SchedulerError::AcquisitionStopped);
            }
            return Ok(StepOutcome::Stopped);
        }

        let word = self.station.control_word();
        let bits = word.mode_bits();
        if bits != self.last_mode_bits {
            self.last_mode_bits = bits;
            self.transition(GameMode::from_control_word(word))?;
        }

        if !self.station.is_new_data() {
            return Ok(StepOutcome::Idle);
        }
        self.station
            .source()
            .observe_user_program(self.station.current_game_mode());
        self.dispatch(Hook::Periodic, FailurePolicy::Escalate)?;
        Ok(StepOutcome::Ran)
    }

    /// Loop until a graceful stop or a fatal error.
    ///
    /// # Errors
    /// See [`step`](Self::step). The error has already been forwarded to the
    /// status source's error-report sink.
    pub fn run(&mut self) -> Result<(), SchedulerError> {
        self.start();
        loop {
            match self.step(self.wait_timeout) {
                Ok(StepOutcome::Stopped) => {
                    info!(transitions = self.transitions, "Mode scheduler stopped");
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => {
                    self.station.source().report_error(
                        true,
                        MODE_FAILURE_CODE,
                        &e.to_string(),
                        "ModeScheduler",
                    );
                    return Err(e);
                }
            }
        }
    }

    /// Number of mode transitions performed.
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Handle of the mode currently receiving hooks.
    pub fn active_handle(&self) -> &ModeHandle {
        &self.active
    }

    fn transition(&mut self, next: GameMode) -> Result<(), SchedulerError> {
        let previous = self.station.current_game_mode();
        info!("Mode transition: {previous} -> {next}");

        self.dispatch(Hook::Exit, FailurePolicy::LogAndContinue)?;
        self.active = self.station.modes().activate(next);
        if self.trim_heap {
            compact_heap();
        }
        self.dispatch(Hook::Enter, FailurePolicy::LogAndContinue)?;
        self.transitions += 1;
        Ok(())
    }

    fn dispatch(&self, hook: Hook, policy: FailurePolicy) -> Result<(), SchedulerError> {
        let mut mode = self.active.lock();
        let result = match hook {
            Hook::Enter => mode.enter(),
            Hook::Periodic => mode.periodic(),
            Hook::Exit => mode.exit(),
        };
        let Err(source) = result else {
            return Ok(());
        };
        let name = mode.name().to_string();
        drop(mode);

        match policy {
            FailurePolicy::LogAndContinue => {
                let msg = format!("{hook} hook of mode '{name}' failed: {source}");
                error!("FATAL: {msg}");
                self.station.source().report_error(
                    true,
                    MODE_FAILURE_CODE,
                    &msg,
                    "ModeScheduler",
                );
                Ok(())
            }
            FailurePolicy::Escalate => Err(SchedulerError::PeriodicFailed { mode: name, source }),
        }
    }
}

impl fmt::Debug for ModeScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModeScheduler")
            .field("mode", &self.station.current_game_mode())
            .field("last_mode_bits", &self.last_mode_bits)
            .field("started", &self.started)
            .field("transitions", &self.transitions)
            .finish()
    }
}

/// Best-effort request to return freed heap pages to the OS.
#[cfg(all(target_os = "linux", target_env = "gnu"))]
fn compact_heap() {
    // SAFETY: malloc_trim only inspects allocator state; 0 keeps no padding.
    let released = unsafe { libc::malloc_trim(0) };
    debug!(released = released != 0, "Heap trim on mode transition");
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
fn compact_heap() {
    debug!("Heap trim not supported on this target");
}
