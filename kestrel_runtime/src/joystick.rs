//! Latest driver-station snapshot, shared between threads.
//!
//! The acquisition thread commits all six controllers (plus the control
//! word, match time and alliance of the same packet) in one critical
//! section, so a reader never sees controllers from two different packets.
//! Readers take the lock for a single accessor call only.
//!
//! Out-of-range reads are not errors: they return a neutral value and emit
//! a throttled complaint through the shared [`RateLimitedWarner`].

use parking_lot::Mutex;
use std::sync::Arc;

use kestrel_common::consts::{MAX_JOYSTICK_BUTTONS, MAX_JOYSTICKS};
use kestrel_common::hal::types::{AllianceStation, ControlWord, JoystickData, clamp_axis};

use crate::complain::RateLimitedWarner;

/// Map a raw signed-byte axis value to `[-1.0, 1.0]`.
///
/// The negative half has one more step than the positive half, so the two
/// halves use different divisors. Values outside `[-128, 127]` saturate.
#[inline]
pub fn scale_axis(raw: i16) -> f64 {
    let raw = clamp_axis(raw);
    if raw < 0 {
        f64::from(raw) / 128.0
    } else {
        f64::from(raw) / 127.0
    }
}

/// Everything one driver-station packet carries.
#[derive(Debug, Clone, PartialEq)]
pub struct JoystickSnapshot {
    /// Per-port controller state.
    pub sticks: [JoystickData; MAX_JOYSTICKS],
    /// Status word of the same packet.
    pub control_word: ControlWord,
    /// Seconds left in the current period (negative if unknown).
    pub match_time: f64,
    /// Alliance and station.
    pub alliance: AllianceStation,
}

impl Default for JoystickSnapshot {
    fn default() -> Self {
        Self {
            sticks: Default::default(),
            control_word: ControlWord::empty(),
            match_time: -1.0,
            alliance: AllianceStation::Unknown,
        }
    }
}

/// Mutex-protected latest snapshot.
#[derive(Debug)]
pub struct JoystickCache {
    inner: Mutex<JoystickSnapshot>,
    warner: Arc<RateLimitedWarner>,
}

impl JoystickCache {
    /// Create an all-zero cache reporting missing devices through `warner`.
    pub fn new(warner: Arc<RateLimitedWarner>) -> Self {
        Self {
            inner: Mutex::new(JoystickSnapshot::default()),
            warner,
        }
    }

    /// Replace the whole snapshot atomically.
    pub fn update(&self, snapshot: &JoystickSnapshot) {
        self.inner.lock().clone_from(snapshot);
    }

    /// Copy of the whole snapshot, taken under one lock.
    pub fn snapshot(&self) -> JoystickSnapshot {
        self.inner.lock().clone()
    }

    /// Scaled value of `axis` on `stick`, `0.0` if the axis is not reported.
    pub fn read_axis(&self, stick: usize, axis: usize) -> f64 {
        let raw = {
            let snap = self.inner.lock();
            snap.sticks.get(stick).and_then(|s| s.axes.get(axis).copied())
        };
        match raw {
            Some(raw) => scale_axis(raw),
            None => {
                self.warner.complain(&format!(
                    "Joystick axis {axis} on port {stick} not available, check if controller is plugged in"
                ));
                0.0
            }
        }
    }

    /// State of `button` (numbered from 1) on `stick`, `false` if not reported.
    pub fn read_button(&self, stick: usize, button: u8) -> bool {
        let pressed = {
            let snap = self.inner.lock();
            snap.sticks.get(stick).and_then(|s| {
                (1..=s.button_count.min(MAX_JOYSTICK_BUTTONS))
                    .contains(&button)
                    .then(|| {
                        1u32.checked_shl(u32::from(button - 1))
                            .is_some_and(|bit| s.buttons & bit != 0)
                    })
            })
        };
        pressed.unwrap_or_else(|| {
            self.warner.complain(&format!(
                "Joystick button {button} on port {stick} not available, check if controller is plugged in"
            ));
            false
        })
    }

    /// Angle code of `pov` on `stick`, `0` if the POV is not reported.
    pub fn read_pov(&self, stick: usize, pov: usize) -> i16 {
        let value = {
            let snap = self.inner.lock();
            snap.sticks.get(stick).and_then(|s| s.povs.get(pov).copied())
        };
        value.unwrap_or_else(|| {
            self.warner.complain(&format!(
                "Joystick POV {pov} on port {stick} not available, check if controller is plugged in"
            ));
            0
        })
    }

    /// Raw button mask of `stick` (0 for an invalid port).
    pub fn buttons(&self, stick: usize) -> u32 {
        self.with_stick(stick, |s| s.buttons)
    }

    /// Number of axes reported on `stick`.
    pub fn axis_count(&self, stick: usize) -> usize {
        self.with_stick(stick, |s| s.axes.len())
    }

    /// Number of POVs reported on `stick`.
    pub fn pov_count(&self, stick: usize) -> usize {
        self.with_stick(stick, |s| s.povs.len())
    }

    /// Number of buttons reported on `stick`.
    pub fn button_count(&self, stick: usize) -> u8 {
        self.with_stick(stick, |s| s.button_count)
    }

    /// Status word of the latest packet.
    pub fn control_word(&self) -> ControlWord {
        self.inner.lock().control_word
    }

    /// Match time of the latest packet.
    pub fn match_time(&self) -> f64 {
        self.inner.lock().match_time
    }

    /// Alliance station of the latest packet.
    pub fn alliance_station(&self) -> AllianceStation {
        self.inner.lock().alliance
    }

    /// Warner shared by every accessor.
    pub fn warner(&self) -> &Arc<RateLimitedWarner> {
        &self.warner
    }

    fn with_stick<T: Default>(&self, stick: usize, f: impl FnOnce(&JoystickData) -> T) -> T {
        let snap = self.inner.lock();
        snap.sticks.get(stick).map(f).unwrap_or_default()
    }
}
