//! Simulated driver station.
//!
//! Emits one packet every `period_ms`, walks through the configured mode
//! script and synthesizes controller input on ports `0..controllers`:
//! slow sine sweeps on every axis, a POV that rotates once per 8 s and a
//! single button that walks through the mask once per second.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use kestrel_common::consts::MAX_JOYSTICKS;
use kestrel_common::hal::source::{HalError, StatusSource};
use kestrel_common::hal::types::{AllianceStation, ControlWord, JoystickData};
use kestrel_common::mode::GameMode;

use crate::config::{RuntimeConfig, SimMode, SimulationConfig};

/// Backend name used in the source registry.
pub const NAME: &str = "simulation";

const SIM_AXES: usize = 6;
const SIM_BUTTONS: u8 = 12;

/// Registry factory.
pub fn create_source(config: &RuntimeConfig) -> Result<Arc<dyn StatusSource>, HalError> {
    if config.simulation.controllers > MAX_JOYSTICKS {
        return Err(HalError::ConfigError(format!(
            "simulation.controllers = {} exceeds {MAX_JOYSTICKS} ports",
            config.simulation.controllers
        )));
    }
    Ok(Arc::new(SimulatedSource::new(config.simulation.clone())))
}

#[derive(Debug)]
struct PacketClock {
    next_packet: Instant,
    interrupted: bool,
    packets: u64,
}

/// Scripted, self-pacing status source.
#[derive(Debug)]
pub struct SimulatedSource {
    config: SimulationConfig,
    started: Instant,
    clock: Mutex<PacketClock>,
    cond: Condvar,
    heartbeats: AtomicU64,
    last_heartbeat: AtomicU8,
    reported: AtomicU64,
}

impl SimulatedSource {
    /// Create a source whose script starts now.
    pub fn new(config: SimulationConfig) -> Self {
        let now = Instant::now();
        info!(
            period_ms = config.period_ms,
            controllers = config.controllers,
            steps = config.script.len(),
            "Simulated driver station ready"
        );
        Self {
            clock: Mutex::new(PacketClock {
                next_packet: now + config.period(),
                interrupted: false,
                packets: 0,
            }),
            config,
            started: now,
            cond: Condvar::new(),
            heartbeats: AtomicU64::new(0),
            last_heartbeat: AtomicU8::new(GameMode::None as u8),
            reported: AtomicU64::new(0),
        }
    }

    /// Packets delivered so far.
    pub fn packets(&self) -> u64 {
        self.clock.lock().packets
    }

    /// Heartbeats received from the scheduler.
    pub fn heartbeats(&self) -> u64 {
        self.heartbeats.load(Ordering::Relaxed)
    }

    /// Mode named by the latest heartbeat.
    pub fn last_heartbeat(&self) -> GameMode {
        GameMode::from_u8(self.last_heartbeat.load(Ordering::Relaxed)).unwrap_or_default()
    }

    /// Diagnostics forwarded through `report_error`.
    pub fn reported(&self) -> u64 {
        self.reported.load(Ordering::Relaxed)
    }

    /// Script position at `elapsed` seconds: mode and seconds left in it.
    ///
    /// After the script ends its last step is held with unknown match time.
    pub fn script_position(&self, elapsed: f64) -> (SimMode, f64) {
        let mut t = elapsed;
        for step in &self.config.script {
            if t < step.seconds {
                return (step.mode, step.seconds - t);
            }
            t -= step.seconds;
        }
        let held = self
            .config
            .script
            .last()
            .map_or(SimMode::Disabled, |step| step.mode);
        (held, -1.0)
    }

    fn elapsed(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

/// Status word bits for a scripted mode, with the DS link always attached.
pub const fn control_word_for(mode: SimMode) -> ControlWord {
    let mode_bits = match mode {
        SimMode::Disabled => ControlWord::empty(),
        SimMode::Auton => ControlWord::ENABLED.union(ControlWord::AUTONOMOUS),
        SimMode::Teleop => ControlWord::ENABLED,
        SimMode::Test => ControlWord::ENABLED.union(ControlWord::TEST),
    };
    mode_bits.union(ControlWord::DS_ATTACHED)
}

fn sweep(elapsed: f64, axis: usize) -> i16 {
    let phase = elapsed * 0.5 + axis as f64 * std::f64::consts::FRAC_PI_3;
    (phase.sin() * 127.0).round() as i16
}

impl StatusSource for SimulatedSource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn wait_for_data(&self, timeout: Option<Duration>) -> Result<bool, HalError> {
        let give_up = timeout.map(|t| Instant::now() + t);
        let period = self.config.period();
        let mut clock = self.clock.lock();

        loop {
            if clock.interrupted {
                return Ok(false);
            }
            let now = Instant::now();
            if now >= clock.next_packet {
                clock.next_packet += period;
                if clock.next_packet < now {
                    // Fell behind; skip the missed packets.
                    clock.next_packet = now + period;
                }
                clock.packets += 1;
                return Ok(true);
            }
            if give_up.is_some_and(|deadline| now >= deadline) {
                return Ok(false);
            }
            let wake = give_up.map_or(clock.next_packet, |d| d.min(clock.next_packet));
            self.cond.wait_until(&mut clock, wake);
        }
    }

    fn interrupt(&self) {
        self.clock.lock().interrupted = true;
        self.cond.notify_all();
    }

    fn status_word(&self) -> Result<u32, HalError> {
        let (mode, _) = self.script_position(self.elapsed());
        Ok(control_word_for(mode).bits())
    }

    fn joystick(&self, port: usize) -> Result<JoystickData, HalError> {
        if port >= MAX_JOYSTICKS {
            return Err(HalError::InvalidPort(port));
        }
        if port >= self.config.controllers {
            return Ok(JoystickData::default());
        }

        let elapsed = self.elapsed();
        let mut axes = [0i16; SIM_AXES];
        for (axis, value) in axes.iter_mut().enumerate() {
            *value = sweep(elapsed + port as f64, axis);
        }
        let secs = elapsed as u64;
        let pov = ((secs % 8) * 45) as i16;
        let buttons = 1u32 << (secs % u64::from(SIM_BUTTONS));
        Ok(JoystickData::new(&axes, &[pov], buttons, SIM_BUTTONS))
    }

    fn match_time(&self) -> Result<f64, HalError> {
        let (_, remaining) = self.script_position(self.elapsed());
        Ok(remaining)
    }

    fn alliance_station(&self) -> Result<AllianceStation, HalError> {
        Ok(AllianceStation::from_u8(self.config.alliance))
    }

    fn observe_user_program(&self, mode: GameMode) {
        self.heartbeats.fetch_add(1, Ordering::Relaxed);
        let previous = self.last_heartbeat.swap(mode as u8, Ordering::Relaxed);
        if previous != mode as u8 {
            debug!("User program running in '{mode}'");
        }
    }

    fn report_error(&self, is_error: bool, code: i32, details: &str, location: &str) {
        self.reported.fetch_add(1, Ordering::Relaxed);
        if is_error {
            error!(target: "kestrel::ds", code, location, "{details}");
        } else {
            warn!(target: "kestrel::ds", code, location, "{details}");
        }
    }
}
