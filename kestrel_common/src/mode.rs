//! Operating modes and arbitration from the driver-station control word.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::hal::types::ControlWord;

/// Operating state of the robot controller.
///
/// `None` is only the pre-start sentinel; it is never passed to a mode hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum GameMode {
    /// No mode known yet (scheduler not started).
    #[default]
    None = 0,
    /// Outputs disabled.
    Disabled = 1,
    /// Autonomous period.
    Auton = 2,
    /// Operator-controlled period.
    Teleop = 3,
    /// Test / pit mode.
    Test = 4,
}

impl GameMode {
    /// Number of slots, including the `None` sentinel.
    pub const COUNT: usize = 5;

    /// The four concrete modes, in table order.
    pub const ALL: [GameMode; 4] = [Self::Disabled, Self::Auton, Self::Teleop, Self::Test];

    /// Arbitrate the mode from the control word.
    ///
    /// Precedence is absolute: disabled wins over everything, then test,
    /// then autonomous, otherwise teleop.
    #[inline]
    pub const fn from_control_word(word: ControlWord) -> Self {
        if !word.contains(ControlWord::ENABLED) {
            Self::Disabled
        } else if word.contains(ControlWord::TEST) {
            Self::Test
        } else if word.contains(ControlWord::AUTONOMOUS) {
            Self::Auton
        } else {
            Self::Teleop
        }
    }

    /// Convert from raw `u8`. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Disabled),
            2 => Some(Self::Auton),
            3 => Some(Self::Teleop),
            4 => Some(Self::Test),
            _ => None,
        }
    }

    /// Slot index in a `[_; GameMode::COUNT]` table.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Short human-readable label.
    pub const fn label(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Disabled => "disabled",
            Self::Auton => "autonomous",
            Self::Teleop => "teleop",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
