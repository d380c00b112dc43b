//! Driver-station data types.
//!
//! This module defines the raw values a `StatusSource` hands to the runtime:
//! - `ControlWord` - status word bits used for mode arbitration
//! - `AllianceStation` - alliance/station identifier
//! - `JoystickData` - one controller's axes, POVs and buttons

use bitflags::bitflags;
use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::consts::{MAX_JOYSTICK_AXES, MAX_JOYSTICK_BUTTONS, MAX_JOYSTICK_POVS};

bitflags! {
    /// Driver-station status word.
    ///
    /// The bit positions are the wire contract with the status source and
    /// must not be reordered.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ControlWord: u32 {
        /// Robot outputs enabled.
        const ENABLED      = 1 << 0;
        /// Autonomous period selected.
        const AUTONOMOUS   = 1 << 1;
        /// Test mode selected.
        const TEST         = 1 << 2;
        /// Emergency stop latched.
        const ESTOP        = 1 << 3;
        /// Field management system connected.
        const FMS_ATTACHED = 1 << 4;
        /// Driver station connected.
        const DS_ATTACHED  = 1 << 5;
    }
}

impl ControlWord {
    /// Bits that select the operating mode.
    pub const MODE_BITS: Self = Self::ENABLED.union(Self::AUTONOMOUS).union(Self::TEST);

    /// Decode a raw status word. Unknown high bits are ignored.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self::from_bits_truncate(raw)
    }

    /// Only the mode-selecting bits of this word.
    #[inline]
    pub const fn mode_bits(self) -> Self {
        self.intersection(Self::MODE_BITS)
    }
}

/// Alliance and driver station position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum AllianceStation {
    /// Not reported (no FMS / DS disconnected).
    #[default]
    Unknown = 0,
    /// Red alliance, station 1.
    Red1 = 1,
    /// Red alliance, station 2.
    Red2 = 2,
    /// Red alliance, station 3.
    Red3 = 3,
    /// Blue alliance, station 1.
    Blue1 = 4,
    /// Blue alliance, station 2.
    Blue2 = 5,
    /// Blue alliance, station 3.
    Blue3 = 6,
}

impl AllianceStation {
    /// Convert from the raw station code. Unrecognized codes map to `Unknown`.
    #[inline]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Red1,
            2 => Self::Red2,
            3 => Self::Red3,
            4 => Self::Blue1,
            5 => Self::Blue2,
            6 => Self::Blue3,
            _ => Self::Unknown,
        }
    }

    /// True for the three red stations.
    pub const fn is_red(self) -> bool {
        matches!(self, Self::Red1 | Self::Red2 | Self::Red3)
    }
}

/// One controller's raw state for a single driver-station packet.
///
/// Axis values are stored as `i16` but only use the signed-byte domain
/// `[-128, 127]`. POVs are angle codes (`-1` when released on most
/// controllers). Button `n` (1-based) is bit `n - 1` of `buttons`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JoystickData {
    /// Axis values, in report order.
    pub axes: Vec<i16, MAX_JOYSTICK_AXES>,
    /// POV hat angle codes, in report order.
    pub povs: Vec<i16, MAX_JOYSTICK_POVS>,
    /// Button bitmask.
    pub buttons: u32,
    /// Number of buttons the controller reports (0..=32).
    pub button_count: u8,
}

impl JoystickData {
    /// Build a controller report, truncating anything past the fixed capacity.
    pub fn new(axes: &[i16], povs: &[i16], buttons: u32, button_count: u8) -> Self {
        let mut data = Self {
            buttons,
            button_count: button_count.min(MAX_JOYSTICK_BUTTONS),
            ..Self::default()
        };
        for &axis in axes.iter().take(MAX_JOYSTICK_AXES) {
            // Capacity is checked by `take`.
            let _ = data.axes.push(clamp_axis(axis));
        }
        for &pov in povs.iter().take(MAX_JOYSTICK_POVS) {
            let _ = data.povs.push(pov);
        }
        data
    }

    /// Force a report built field-by-field back into range: axes into the
    /// signed-byte domain, `button_count` to at most 32.
    pub fn sanitize(&mut self) {
        for axis in self.axes.iter_mut() {
            *axis = clamp_axis(*axis);
        }
        self.button_count = self.button_count.min(MAX_JOYSTICK_BUTTONS);
    }
}

/// Clamp a raw axis value into `[-128, 127]`.
#[inline]
pub const fn clamp_axis(raw: i16) -> i16 {
    if raw < i8::MIN as i16 {
        i8::MIN as i16
    } else if raw > i8::MAX as i16 {
        i8::MAX as i16
    } else {
        raw
    }
}
