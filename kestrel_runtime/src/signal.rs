//! Edge-triggered "new data" signal between acquisition and scheduler.
//!
//! The flag is set on every acquisition cycle and cleared only by
//! [`NewDataSignal::is_new_data`]. Cycles that happen between two reads
//! coalesce into a single `true`; nothing is queued or counted.
//!
//! This mutex/condvar pair is independent of the joystick cache lock, and
//! the acquisition thread never holds both at once.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Why a [`NewDataSignal::wait`] call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// New data is pending (not yet consumed by `is_new_data`).
    NewData,
    /// The timeout elapsed first.
    TimedOut,
    /// The signal was released for shutdown.
    Released,
}

#[derive(Debug, Default)]
struct SignalState {
    new_data: bool,
    released: bool,
    /// Number of `notify` calls; lets waiters ignore spurious wake-ups.
    generation: u64,
}

/// Coalescing new-data flag with blocking wait.
#[derive(Debug, Default)]
pub struct NewDataSignal {
    state: Mutex<SignalState>,
    cond: Condvar,
}

impl NewDataSignal {
    /// Create a cleared signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag and wake every waiter.
    pub fn notify(&self) {
        let mut state = self.state.lock();
        state.new_data = true;
        state.generation = state.generation.wrapping_add(1);
        drop(state);
        self.cond.notify_all();
    }

    /// Test-and-clear: returns `true` at most once per burst of notifications.
    pub fn is_new_data(&self) -> bool {
        let mut state = self.state.lock();
        std::mem::replace(&mut state.new_data, false)
    }

    /// Block until new data is pending, the timeout elapses or the signal is
    /// released. `None` waits indefinitely.
    ///
    /// Returns immediately with `NewData` if a notification is already
    /// pending, so a cycle committed while the caller was busy is not lost.
    pub fn wait(&self, timeout: Option<Duration>) -> WaitOutcome {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        let seen = state.generation;

        loop {
            if state.released {
                return WaitOutcome::Released;
            }
            if state.new_data || state.generation != seen {
                return WaitOutcome::NewData;
            }
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut state, deadline).timed_out() {
                        return if state.new_data {
                            WaitOutcome::NewData
                        } else if state.released {
                            WaitOutcome::Released
                        } else {
                            WaitOutcome::TimedOut
                        };
                    }
                }
                None => self.cond.wait(&mut state),
            }
        }
    }

    /// Wake every waiter permanently (shutdown or producer death).
    pub fn release(&self) {
        self.state.lock().released = true;
        self.cond.notify_all();
    }

    /// True once [`release`](Self::release) has been called.
    pub fn is_released(&self) -> bool {
        self.state.lock().released
    }
}
