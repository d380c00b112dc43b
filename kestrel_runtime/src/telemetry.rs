//! Telemetry publish sink driven by the acquisition cadence.

use tracing::debug;

use kestrel_common::consts::MAX_JOYSTICKS;
use kestrel_common::mode::GameMode;

use crate::joystick::JoystickCache;

/// Receiver of periodic telemetry publishes.
///
/// Called from the acquisition thread every `telemetry_every` cycles, so
/// implementations must not block.
pub trait TelemetrySink: Send + Sync {
    /// Publish the current state.
    fn publish(&self, cache: &JoystickCache);
}

/// Sink that publishes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTelemetry;

impl TelemetrySink for NullTelemetry {
    fn publish(&self, _cache: &JoystickCache) {}
}

/// Sink that emits the snapshot as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn publish(&self, cache: &JoystickCache) {
        let snap = cache.snapshot();
        let connected = snap
            .sticks
            .iter()
            .filter(|s| !s.axes.is_empty() || s.button_count > 0)
            .count();
        debug!(
            target: "kestrel::telemetry",
            mode = %GameMode::from_control_word(snap.control_word),
            control_word = snap.control_word.bits(),
            match_time = snap.match_time,
            alliance = ?snap.alliance,
            connected,
            ports = MAX_JOYSTICKS,
            "driver station"
        );
    }
}
