//! `DriverStation`: the host-facing facade over acquisition and modes.
//!
//! Owns the joystick cache, the new-data signal, the mode table and the
//! acquisition thread handle. Everything is shared through `Arc`s, so the
//! facade itself can be wrapped in an `Arc` and handed to the scheduler, the
//! Ctrl-C handler and user modes alike.

use static_assertions::assert_impl_all;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use kestrel_common::hal::source::StatusSource;
use kestrel_common::hal::types::{AllianceStation, ControlWord};
use kestrel_common::mode::GameMode;

use crate::acquisition::{
    Acquisition, AcquisitionContext, AcquisitionCounters, AcquisitionError, AcquisitionStats,
    AcquisitionThread, ThreadSettings,
};
use crate::complain::RateLimitedWarner;
use crate::config::{AcquisitionConfig, RuntimeConfig};
use crate::joystick::JoystickCache;
use crate::mode::{ModeHandle, ModeTable};
use crate::safety::SafetyRegistry;
use crate::signal::{NewDataSignal, WaitOutcome};
use crate::telemetry::{TelemetrySink, TracingTelemetry};

/// Driver-station facade.
pub struct DriverStation {
    source: Arc<dyn StatusSource>,
    cache: Arc<JoystickCache>,
    signal: Arc<NewDataSignal>,
    modes: Arc<ModeTable>,
    safety: Arc<SafetyRegistry>,
    telemetry: Arc<dyn TelemetrySink>,
    counters: Arc<AcquisitionCounters>,
    thread: AcquisitionThread,
    config: AcquisitionConfig,
}

assert_impl_all!(DriverStation: Send, Sync);
assert_impl_all!(JoystickCache: Send, Sync);
assert_impl_all!(ModeTable: Send, Sync);

impl DriverStation {
    /// Facade over `source` with tracing telemetry and an empty safety
    /// registry.
    pub fn new(source: Arc<dyn StatusSource>, config: &RuntimeConfig) -> Self {
        let warner = Arc::new(RateLimitedWarner::new(config.warner.cooldown()));
        let signal = Arc::new(NewDataSignal::new());
        Self {
            thread: AcquisitionThread::new(Arc::clone(&source), Arc::clone(&signal)),
            source,
            cache: Arc::new(JoystickCache::new(warner)),
            signal,
            modes: Arc::new(ModeTable::new()),
            safety: Arc::new(SafetyRegistry::new()),
            telemetry: Arc::new(TracingTelemetry),
            counters: Arc::new(AcquisitionCounters::default()),
            config: config.acquisition.clone(),
        }
    }

    /// Replace the telemetry sink. Only effective before `start_acquisition`.
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Use a shared safety registry. Only effective before `start_acquisition`.
    pub fn with_safety(mut self, safety: Arc<SafetyRegistry>) -> Self {
        self.safety = safety;
        self
    }

    // ─── Acquisition ────────────────────────────────────────────────

    /// Start the acquisition thread. Returns `Ok(false)` if already started.
    pub fn start_acquisition(&self) -> Result<bool, AcquisitionError> {
        if self.thread.is_started() {
            return Ok(false);
        }
        self.thread
            .start(self.new_acquisition(), ThreadSettings::from(&self.config))
    }

    /// Stop acquisition and release every waiter.
    ///
    /// `graceful = false` reports the exit as a failure.
    pub fn request_stop(&self, graceful: bool) {
        self.thread.request_stop(graceful);
    }

    /// Wait for the acquisition thread to exit.
    pub fn join_acquisition(&self) -> bool {
        self.thread.join()
    }

    /// Cycle body wired to this facade's shared state, for running
    /// acquisition on a caller-owned thread.
    pub fn new_acquisition(&self) -> Acquisition {
        let ctx = AcquisitionContext {
            source: Arc::clone(&self.source),
            cache: Arc::clone(&self.cache),
            signal: Arc::clone(&self.signal),
            telemetry: Arc::clone(&self.telemetry),
            safety: Arc::clone(&self.safety),
            counters: Arc::clone(&self.counters),
        };
        Acquisition::new(ctx, &self.config)
    }

    /// True if the acquisition thread exited without a graceful stop.
    pub fn acquisition_failed(&self) -> bool {
        self.thread.lifecycle().failed()
    }

    /// True once a stop was requested (or acquisition ended).
    pub fn stop_requested(&self) -> bool {
        self.thread.lifecycle().stop_requested()
    }

    /// Acquisition statistics.
    pub fn stats(&self) -> AcquisitionStats {
        self.counters.snapshot()
    }

    // ─── New-data signal ────────────────────────────────────────────

    /// Block until new data, timeout or shutdown.
    pub fn wait_for_data(&self, timeout: Option<Duration>) -> WaitOutcome {
        self.signal.wait(timeout)
    }

    /// Test-and-clear the new-data flag.
    pub fn is_new_data(&self) -> bool {
        self.signal.is_new_data()
    }

    // ─── Modes ──────────────────────────────────────────────────────

    /// Mode the scheduler is running.
    pub fn current_game_mode(&self) -> GameMode {
        self.modes.current_game_mode()
    }

    /// Register `handler` for `mode`; ignored if `mode` is active.
    pub fn register(&self, mode: GameMode, handler: ModeHandle) -> bool {
        self.modes.register(mode, handler)
    }

    /// Mode table.
    pub fn modes(&self) -> &Arc<ModeTable> {
        &self.modes
    }

    // ─── Joysticks ──────────────────────────────────────────────────

    /// Scaled axis value in `[-1.0, 1.0]`.
    pub fn read_axis(&self, stick: usize, axis: usize) -> f64 {
        self.cache.read_axis(stick, axis)
    }

    /// Button state (buttons are numbered from 1).
    pub fn read_button(&self, stick: usize, button: u8) -> bool {
        self.cache.read_button(stick, button)
    }

    /// POV angle code.
    pub fn read_pov(&self, stick: usize, pov: usize) -> i16 {
        self.cache.read_pov(stick, pov)
    }

    /// Joystick cache.
    pub fn cache(&self) -> &Arc<JoystickCache> {
        &self.cache
    }

    // ─── Match state ────────────────────────────────────────────────

    /// Seconds remaining in the period (negative if unknown).
    pub fn match_time(&self) -> f64 {
        self.cache.match_time()
    }

    /// Alliance and station.
    pub fn alliance_station(&self) -> AllianceStation {
        self.cache.alliance_station()
    }

    /// Control word of the latest packet.
    pub fn control_word(&self) -> ControlWord {
        self.cache.control_word()
    }

    /// Robot outputs enabled.
    pub fn is_enabled(&self) -> bool {
        self.control_word().contains(ControlWord::ENABLED)
    }

    /// Autonomous period selected.
    pub fn is_autonomous(&self) -> bool {
        self.control_word().contains(ControlWord::AUTONOMOUS)
    }

    /// Test mode selected.
    pub fn is_test(&self) -> bool {
        self.control_word().contains(ControlWord::TEST)
    }

    /// Emergency stop latched.
    pub fn is_estopped(&self) -> bool {
        self.control_word().contains(ControlWord::ESTOP)
    }

    /// Field management system connected.
    pub fn is_fms_attached(&self) -> bool {
        self.control_word().contains(ControlWord::FMS_ATTACHED)
    }

    /// Driver station connected.
    pub fn is_ds_attached(&self) -> bool {
        self.control_word().contains(ControlWord::DS_ATTACHED)
    }

    // ─── Collaborators ──────────────────────────────────────────────

    /// Status source.
    pub fn source(&self) -> &Arc<dyn StatusSource> {
        &self.source
    }

    /// Safety registry checked by acquisition.
    pub fn safety(&self) -> &Arc<SafetyRegistry> {
        &self.safety
    }
}

impl fmt::Debug for DriverStation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverStation")
            .field("source", &self.source.name())
            .field("mode", &self.current_game_mode())
            .field("acquisition", &self.thread)
            .field("stats", &self.stats())
            .finish()
    }
}
