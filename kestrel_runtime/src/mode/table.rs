//! Fixed-size GameMode → RobotMode table.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use kestrel_common::mode::GameMode;

use super::robot_mode::{ModeHandle, NoopMode, mode_handle};

struct TableState {
    slots: [Option<ModeHandle>; GameMode::COUNT],
    active: GameMode,
}

/// One handler slot per game mode, plus the currently active mode.
///
/// The active slot cannot be replaced: a running mode never has its
/// implementation swapped from under it.
pub struct ModeTable {
    state: Mutex<TableState>,
    noop: ModeHandle,
}

impl Default for ModeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeTable {
    /// Empty table, active mode `None`.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TableState {
                slots: Default::default(),
                active: GameMode::None,
            }),
            noop: mode_handle(NoopMode),
        }
    }

    /// Store `handler` for `mode`.
    ///
    /// Returns `false` (and changes nothing) if `mode` is currently active or
    /// is the `None` sentinel.
    pub fn register(&self, mode: GameMode, handler: ModeHandle) -> bool {
        if mode == GameMode::None {
            warn!("Ignoring handler registration for the '{mode}' sentinel");
            return false;
        }
        let mut state = self.state.lock();
        if state.active == mode {
            debug!("Ignoring registration for active mode '{mode}'");
            return false;
        }
        state.slots[mode.index()] = Some(handler);
        debug!("Registered handler for '{mode}'");
        true
    }

    /// Handler for `mode`, or the no-op handler if none was registered.
    pub fn lookup(&self, mode: GameMode) -> ModeHandle {
        let state = self.state.lock();
        state.slots[mode.index()]
            .as_ref()
            .map_or_else(|| Arc::clone(&self.noop), Arc::clone)
    }

    /// True if a handler was registered for `mode`.
    pub fn is_registered(&self, mode: GameMode) -> bool {
        self.state.lock().slots[mode.index()].is_some()
    }

    /// Make `mode` the active mode and return its handler.
    pub(crate) fn activate(&self, mode: GameMode) -> ModeHandle {
        let mut state = self.state.lock();
        state.active = mode;
        state.slots[mode.index()]
            .as_ref()
            .map_or_else(|| Arc::clone(&self.noop), Arc::clone)
    }

    /// Mode the scheduler is currently running.
    pub fn current_game_mode(&self) -> GameMode {
        self.state.lock().active
    }
}

impl fmt::Debug for ModeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        let registered: Vec<GameMode> = GameMode::ALL
            .into_iter()
            .filter(|m| state.slots[m.index()].is_some())
            .collect();
        f.debug_struct("ModeTable")
            .field("active", &state.active)
            .field("registered", &registered)
            .finish()
    }
}
