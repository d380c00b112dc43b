//! Scripted status source and spy modes shared by the scenarios.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use kestrel_common::consts::MAX_JOYSTICKS;
use kestrel_common::hal::source::{HalError, StatusSource};
use kestrel_common::hal::types::{AllianceStation, ControlWord, JoystickData};
use kestrel_common::mode::GameMode;
use kestrel_runtime::DriverStation;
use kestrel_runtime::config::RuntimeConfig;
use kestrel_runtime::mode::{ModeError, RobotMode, mode_handle};

// ─── Scripted source ────────────────────────────────────────────────

/// One driver-station packet.
#[derive(Debug, Clone, Default)]
pub struct Packet {
    pub word: ControlWord,
    pub sticks: [JoystickData; MAX_JOYSTICKS],
    pub match_time: f64,
}

impl Packet {
    pub fn with_word(word: ControlWord) -> Self {
        Self {
            word,
            ..Self::default()
        }
    }

    /// Every port reports one axis with the same raw value.
    pub fn uniform_axis(raw: i16) -> Self {
        let mut packet = Self::default();
        for stick in &mut packet.sticks {
            *stick = JoystickData::new(&[raw], &[], 0, 0);
        }
        packet
    }
}

#[derive(Default)]
struct SourceState {
    queue: VecDeque<Packet>,
    current: Packet,
    interrupted: bool,
    fail_next_wait: bool,
}

/// Status source fed packet by packet from the test.
///
/// `wait_for_data` pops the next queued packet; the field readers report
/// the packet popped last (or the one set with `set_current`).
#[derive(Default)]
pub struct ScriptedSource {
    state: Mutex<SourceState>,
    cond: Condvar,
    pub heartbeats: AtomicU64,
    pub reports: AtomicU64,
    last_report: Mutex<String>,
}

impl ScriptedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a packet for the acquisition thread.
    pub fn push(&self, packet: Packet) {
        self.state.lock().queue.push_back(packet);
        self.cond.notify_all();
    }

    /// Replace the packet the field readers report (manual cycles).
    pub fn set_current(&self, packet: Packet) {
        self.state.lock().current = packet;
    }

    /// Make the next `wait_for_data` fail with a communication error.
    pub fn fail_next_wait(&self) {
        self.state.lock().fail_next_wait = true;
        self.cond.notify_all();
    }

    pub fn last_report(&self) -> String {
        self.last_report.lock().clone()
    }
}

impl StatusSource for ScriptedSource {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn wait_for_data(&self, timeout: Option<Duration>) -> Result<bool, HalError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        loop {
            if state.fail_next_wait {
                state.fail_next_wait = false;
                return Err(HalError::CommunicationError("link dropped".into()));
            }
            if state.interrupted {
                return Ok(false);
            }
            if let Some(packet) = state.queue.pop_front() {
                state.current = packet;
                return Ok(true);
            }
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut state, deadline).timed_out() {
                        return Ok(false);
                    }
                }
                None => self.cond.wait(&mut state),
            }
        }
    }

    fn interrupt(&self) {
        self.state.lock().interrupted = true;
        self.cond.notify_all();
    }

    fn status_word(&self) -> Result<u32, HalError> {
        Ok(self.state.lock().current.word.bits())
    }

    fn joystick(&self, port: usize) -> Result<JoystickData, HalError> {
        self.state
            .lock()
            .current
            .sticks
            .get(port)
            .cloned()
            .ok_or(HalError::InvalidPort(port))
    }

    fn match_time(&self) -> Result<f64, HalError> {
        Ok(self.state.lock().current.match_time)
    }

    fn alliance_station(&self) -> Result<AllianceStation, HalError> {
        Ok(AllianceStation::Red1)
    }

    fn observe_user_program(&self, _mode: GameMode) {
        self.heartbeats.fetch_add(1, Ordering::Relaxed);
    }

    fn report_error(&self, _is_error: bool, _code: i32, details: &str, _location: &str) {
        self.reports.fetch_add(1, Ordering::Relaxed);
        *self.last_report.lock() = details.to_string();
    }
}

// ─── Spy modes ──────────────────────────────────────────────────────

/// Shared, ordered record of hook calls ("Name.hook").
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Mode that records every hook call and can be told to fail.
pub struct SpyMode {
    pub name: &'static str,
    pub log: CallLog,
    pub fail_enter: bool,
    pub fail_exit: bool,
    pub fail_periodic: bool,
}

impl SpyMode {
    pub fn new(name: &'static str, log: &CallLog) -> Self {
        Self {
            name,
            log: Arc::clone(log),
            fail_enter: false,
            fail_exit: false,
            fail_periodic: false,
        }
    }

    fn record(&self, hook: &str, fail: bool) -> Result<(), ModeError> {
        self.log.lock().push(format!("{}.{hook}", self.name));
        if fail {
            return Err(ModeError::Failed(format!("{} {hook} failed", self.name)));
        }
        Ok(())
    }
}

impl RobotMode for SpyMode {
    fn name(&self) -> &str {
        self.name
    }

    fn enter(&mut self) -> Result<(), ModeError> {
        self.record("enter", self.fail_enter)
    }

    fn periodic(&mut self) -> Result<(), ModeError> {
        self.record("periodic", self.fail_periodic)
    }

    fn exit(&mut self) -> Result<(), ModeError> {
        self.record("exit", self.fail_exit)
    }
}

// ─── Fixtures ───────────────────────────────────────────────────────

pub const AUTON_WORD: ControlWord = ControlWord::ENABLED.union(ControlWord::AUTONOMOUS);
pub const TELEOP_WORD: ControlWord = ControlWord::ENABLED;
pub const TEST_WORD: ControlWord = ControlWord::ENABLED.union(ControlWord::TEST);

pub struct Harness {
    pub source: Arc<ScriptedSource>,
    pub station: Arc<DriverStation>,
    pub log: CallLog,
}

/// Station over a scripted source with the default configuration.
pub fn harness() -> Harness {
    harness_with(&RuntimeConfig::default())
}

pub fn harness_with(config: &RuntimeConfig) -> Harness {
    let source = ScriptedSource::new();
    let station = Arc::new(DriverStation::new(source.clone(), config));
    Harness {
        source,
        station,
        log: CallLog::default(),
    }
}

impl Harness {
    /// Register a spy for every concrete mode.
    pub fn register_spies(&self) {
        for (mode, name) in [
            (GameMode::Disabled, "Disabled"),
            (GameMode::Auton, "Auton"),
            (GameMode::Teleop, "Teleop"),
            (GameMode::Test, "Test"),
        ] {
            self.station
                .register(mode, mode_handle(SpyMode::new(name, &self.log)));
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.log.lock().clear();
    }
}
