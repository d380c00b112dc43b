//! Rate-limited "device missing" diagnostics.
//!
//! One cooldown gate is shared by every caller: any emitted complaint,
//! whatever its text, silences all others until the gate expires.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::error;

use kestrel_common::consts::DEFAULT_COMPLAIN_COOLDOWN_MS;

/// Global cooldown gate for operator-facing warnings.
#[derive(Debug)]
pub struct RateLimitedWarner {
    cooldown: Duration,
    /// Earliest instant after which the next complaint may be emitted.
    next_allowed: Mutex<Option<Instant>>,
    emitted: AtomicU64,
    suppressed: AtomicU64,
}

impl RateLimitedWarner {
    /// Create a warner with the given cooldown.
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            next_allowed: Mutex::new(None),
            emitted: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
        }
    }

    /// Emit `message` at error level unless the gate is closed.
    ///
    /// Returns `true` if the message was emitted.
    pub fn complain(&self, message: &str) -> bool {
        self.complain_at(message, Instant::now())
    }

    /// Same as [`complain`](Self::complain) with an explicit clock reading.
    pub fn complain_at(&self, message: &str, now: Instant) -> bool {
        {
            let mut gate = self.next_allowed.lock();
            if let Some(next) = *gate {
                if now <= next {
                    self.suppressed.fetch_add(1, Ordering::Relaxed);
                    return false;
                }
            }
            *gate = Some(now + self.cooldown);
        }

        error!(target: "kestrel::complain", "{message}");
        self.emitted.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Configured cooldown.
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Number of complaints emitted so far.
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Number of complaints swallowed by the cooldown.
    pub fn suppressed(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }
}

impl Default for RateLimitedWarner {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_COMPLAIN_COOLDOWN_MS))
    }
}
