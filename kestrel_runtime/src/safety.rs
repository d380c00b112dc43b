//! Actuator watchdogs checked from the acquisition cadence.
//!
//! A [`SafetyHelper`] is anything that can decide, on its own, that its
//! actuator must be stopped. The [`SafetyRegistry`] is checked every
//! `safety_every` acquisition cycles; failures are each helper's concern.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Default time an output may go without `feed()` before it is stopped.
pub const DEFAULT_SAFETY_EXPIRATION: Duration = Duration::from_millis(100);

/// Periodically checked actuator watchdog.
pub trait SafetyHelper: Send + Sync {
    /// Human-readable actuator description used in diagnostics.
    fn description(&self) -> &str;

    /// Stop the actuator if its contract was violated.
    fn check(&self);
}

/// List of safety helpers checked on the acquisition cadence.
#[derive(Default)]
pub struct SafetyRegistry {
    helpers: Mutex<Vec<Arc<dyn SafetyHelper>>>,
}

impl SafetyRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a helper. Helpers are never removed.
    pub fn register(&self, helper: Arc<dyn SafetyHelper>) {
        debug!("Registered safety helper '{}'", helper.description());
        self.helpers.lock().push(helper);
    }

    /// Number of registered helpers.
    pub fn len(&self) -> usize {
        self.helpers.lock().len()
    }

    /// True when no helper is registered.
    pub fn is_empty(&self) -> bool {
        self.helpers.lock().is_empty()
    }

    /// Run `check()` on every helper, in registration order.
    ///
    /// The list is copied first, so a helper may register others from its
    /// `check()`; those are checked from the next call on.
    pub fn check_all(&self) {
        let helpers = self.helpers.lock().clone();
        for helper in &helpers {
            helper.check();
        }
    }
}

impl fmt::Debug for SafetyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafetyRegistry")
            .field("helpers", &self.len())
            .finish()
    }
}

#[derive(Debug)]
struct FeedState {
    timeout: Duration,
    expiration: Instant,
}

/// Output watchdog: stops its actuator when not fed within the timeout.
pub struct MotorSafety {
    description: String,
    enabled: AtomicBool,
    state: Mutex<FeedState>,
    stop: Box<dyn Fn() + Send + Sync>,
    trips: AtomicU64,
}

impl MotorSafety {
    /// Create a disabled watchdog with the default expiration.
    ///
    /// `stop` is called from the acquisition thread each time the watchdog
    /// trips.
    pub fn new(description: impl Into<String>, stop: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            description: description.into(),
            enabled: AtomicBool::new(false),
            state: Mutex::new(FeedState {
                timeout: DEFAULT_SAFETY_EXPIRATION,
                expiration: Instant::now(),
            }),
            stop: Box::new(stop),
            trips: AtomicU64::new(0),
        }
    }

    /// Refresh the watchdog; call every time the output is written.
    pub fn feed(&self) {
        let mut state = self.state.lock();
        state.expiration = Instant::now() + state.timeout;
    }

    /// Change the expiration period. Takes effect on the next `feed()`.
    pub fn set_expiration(&self, timeout: Duration) {
        self.state.lock().timeout = timeout;
    }

    /// Current expiration period.
    pub fn expiration(&self) -> Duration {
        self.state.lock().timeout
    }

    /// Enable or disable checking.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// True when checking is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// True if the output was fed within the expiration period.
    pub fn is_alive(&self) -> bool {
        Instant::now() <= self.state.lock().expiration
    }

    /// Number of times the watchdog has stopped its output.
    pub fn trips(&self) -> u64 {
        self.trips.load(Ordering::Relaxed)
    }

    /// Check against an explicit clock reading.
    pub fn check_at(&self, now: Instant) {
        if !self.is_enabled() {
            return;
        }
        let expired = now > self.state.lock().expiration;
        if expired {
            error!(
                "{}... Output not updated often enough. Stopping output.",
                self.description
            );
            self.trips.fetch_add(1, Ordering::Relaxed);
            (self.stop)();
        }
    }
}

impl SafetyHelper for MotorSafety {
    fn description(&self) -> &str {
        &self.description
    }

    fn check(&self) {
        self.check_at(Instant::now());
    }
}

impl fmt::Debug for MotorSafety {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MotorSafety")
            .field("description", &self.description)
            .field("enabled", &self.is_enabled())
            .field("trips", &self.trips())
            .finish()
    }
}
