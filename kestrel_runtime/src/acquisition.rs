//! Driver-station acquisition thread: the sole producer of the joystick cache.
//!
//! ## Cycle (one per driver-station packet)
//! 1. Block in `StatusSource::wait_for_data`.
//! 2. Read every controller port into a staging snapshot, then commit it to
//!    the [`JoystickCache`] in one critical section.
//! 3. Raise the [`NewDataSignal`] (broadcast).
//! 4. Every `telemetry_every` cycles, publish telemetry.
//! 5. Every `safety_every` cycles, check the [`SafetyRegistry`].
//!
//! Errors from steps 2-5 end the thread. Any exit that was not requested as
//! graceful is logged `FATAL`, raises the failed flag and releases the
//! signal so the scheduler stops too. The thread is never restarted.
//!
//! ## RT Setup
//! On Linux the thread always tries to switch to `SCHED_FIFO` at
//! `rt_priority`. With the `rt` feature it also locks memory and pins itself
//! to `cpu_core` (if configured). Failures are logged and the thread keeps
//! running at default priority; the policy it ended up with is logged.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use kestrel_common::consts::ACQUISITION_THREAD_NAME;
use kestrel_common::hal::source::{HalError, StatusSource};

use crate::config::AcquisitionConfig;
use crate::joystick::{JoystickCache, JoystickSnapshot};
use crate::safety::SafetyRegistry;
use crate::signal::NewDataSignal;
use crate::telemetry::TelemetrySink;

// ─── Errors ─────────────────────────────────────────────────────────

/// Acquisition thread errors.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// The OS refused to create the thread.
    #[error("failed to spawn acquisition thread: {0}")]
    Spawn(String),

    /// Memory locking, affinity or scheduler setup failed.
    #[error("RT setup failed: {0}")]
    RtSetup(String),

    /// The status source failed while reading a packet.
    #[error("status source error: {0}")]
    Hal(#[from] HalError),
}

// ─── Statistics ─────────────────────────────────────────────────────

/// Counters shared between the acquisition thread and observers.
#[derive(Debug, Default)]
pub struct AcquisitionCounters {
    cycles: AtomicU64,
    publishes: AtomicU64,
    safety_checks: AtomicU64,
}

impl AcquisitionCounters {
    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> AcquisitionStats {
        AcquisitionStats {
            cycles: self.cycles.load(Ordering::Relaxed),
            publishes: self.publishes.load(Ordering::Relaxed),
            safety_checks: self.safety_checks.load(Ordering::Relaxed),
        }
    }
}

/// Acquisition statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcquisitionStats {
    /// Completed cycles.
    pub cycles: u64,
    /// Telemetry publishes.
    pub publishes: u64,
    /// Safety registry checks.
    pub safety_checks: u64,
}

// ─── Cycle Body ─────────────────────────────────────────────────────

/// Shared objects the acquisition cycle reads from and writes to.
#[derive(Clone)]
pub struct AcquisitionContext {
    /// Driver-station link.
    pub source: Arc<dyn StatusSource>,
    /// Snapshot written every cycle.
    pub cache: Arc<JoystickCache>,
    /// Raised after every commit.
    pub signal: Arc<NewDataSignal>,
    /// Published every `telemetry_every` cycles.
    pub telemetry: Arc<dyn TelemetrySink>,
    /// Checked every `safety_every` cycles.
    pub safety: Arc<SafetyRegistry>,
    /// Cycle statistics.
    pub counters: Arc<AcquisitionCounters>,
}

/// Acquisition loop state, owned by the acquisition thread.
pub struct Acquisition {
    ctx: AcquisitionContext,
    telemetry_every: u32,
    safety_every: u32,
    telemetry_counter: u32,
    safety_counter: u32,
    staging: JoystickSnapshot,
}

impl Acquisition {
    /// Create the loop state. Cadence moduli below 1 are treated as 1.
    pub fn new(ctx: AcquisitionContext, config: &AcquisitionConfig) -> Self {
        Self {
            ctx,
            telemetry_every: config.telemetry_every.max(1),
            safety_every: config.safety_every.max(1),
            telemetry_counter: 0,
            safety_counter: 0,
            staging: JoystickSnapshot::default(),
        }
    }

    /// Execute one cycle body (everything after the wait).
    ///
    /// # Errors
    /// Any status source error; the cache is left untouched in that case.
    pub fn run_cycle(&mut self) -> Result<(), AcquisitionError> {
        self.read_packet()?;
        self.ctx.cache.update(&self.staging);
        self.ctx.signal.notify();
        self.ctx.counters.cycles.fetch_add(1, Ordering::Relaxed);

        self.telemetry_counter += 1;
        if self.telemetry_counter >= self.telemetry_every {
            self.telemetry_counter = 0;
            self.ctx.telemetry.publish(&self.ctx.cache);
            self.ctx.counters.publishes.fetch_add(1, Ordering::Relaxed);
        }

        self.safety_counter += 1;
        if self.safety_counter >= self.safety_every {
            self.safety_counter = 0;
            self.ctx.safety.check_all();
            self.ctx.counters.safety_checks.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Loop until `lifecycle` stops keeping the thread alive.
    ///
    /// A wait that returns without data (timeout or interrupt) re-checks the
    /// keep-alive flag without running a cycle.
    pub fn run(
        &mut self,
        lifecycle: &Lifecycle,
        wait_timeout: Option<Duration>,
    ) -> Result<(), AcquisitionError> {
        while lifecycle.keep_alive() {
            if !self.ctx.source.wait_for_data(wait_timeout)? {
                continue;
            }
            if !lifecycle.keep_alive() {
                break;
            }
            self.run_cycle()?;
        }
        Ok(())
    }

    /// Current statistics.
    pub fn stats(&self) -> AcquisitionStats {
        self.ctx.counters.snapshot()
    }

    fn read_packet(&mut self) -> Result<(), HalError> {
        let source = &self.ctx.source;
        for (port, stick) in self.staging.sticks.iter_mut().enumerate() {
            *stick = source.joystick(port)?;
            stick.sanitize();
        }
        self.staging.control_word = source.control_word()?;
        self.staging.match_time = source.match_time()?;
        self.staging.alliance = source.alliance_station()?;
        Ok(())
    }
}

impl fmt::Debug for Acquisition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acquisition")
            .field("source", &self.ctx.source.name())
            .field("telemetry_every", &self.telemetry_every)
            .field("safety_every", &self.safety_every)
            .field("stats", &self.stats())
            .finish()
    }
}

// ─── Lifecycle ──────────────────────────────────────────────────────

/// Keep-alive and exit flags shared by the thread and its owner.
#[derive(Debug)]
pub struct Lifecycle {
    keep_alive: AtomicBool,
    graceful: AtomicBool,
    failed: AtomicBool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            keep_alive: AtomicBool::new(true),
            graceful: AtomicBool::new(false),
            failed: AtomicBool::new(false),
        }
    }
}

impl Lifecycle {
    /// True while the thread should keep running.
    pub fn keep_alive(&self) -> bool {
        self.keep_alive.load(Ordering::Acquire)
    }

    /// True once a stop has been requested.
    pub fn stop_requested(&self) -> bool {
        !self.keep_alive()
    }

    /// True if the thread exited without a graceful stop request.
    pub fn failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// A non-graceful request marks the failure before keep-alive drops, so
    /// anyone woken by the stop already sees it.
    fn request_stop(&self, graceful: bool) {
        self.graceful.store(graceful, Ordering::Release);
        if !graceful {
            self.failed.store(true, Ordering::Release);
        }
        self.keep_alive.store(false, Ordering::Release);
    }
}

/// Exit bookkeeping; runs on every thread exit path, including unwinding.
struct ExitGuard {
    lifecycle: Arc<Lifecycle>,
    source: Arc<dyn StatusSource>,
    signal: Arc<NewDataSignal>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if self.lifecycle.graceful.load(Ordering::Acquire) {
            info!("Acquisition thread stopped");
        } else {
            let msg = "acquisition thread exited unexpectedly; driver-station data is stale";
            error!("FATAL: {msg}");
            self.source.report_error(true, 1, msg, ACQUISITION_THREAD_NAME);
            self.lifecycle.failed.store(true, Ordering::Release);
        }
        self.lifecycle.keep_alive.store(false, Ordering::Release);
        self.signal.release();
    }
}

// ─── Thread ─────────────────────────────────────────────────────────

/// Scheduling settings applied inside the acquisition thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadSettings {
    /// `SCHED_FIFO` priority.
    pub rt_priority: i32,
    /// Optional CPU pin.
    pub cpu_core: Option<usize>,
    /// Bounded status-source wait, `None` for indefinite.
    pub wait_timeout: Option<Duration>,
}

impl From<&AcquisitionConfig> for ThreadSettings {
    fn from(config: &AcquisitionConfig) -> Self {
        Self {
            rt_priority: config.rt_priority,
            cpu_core: config.cpu_core,
            wait_timeout: config.wait_timeout(),
        }
    }
}

/// Handle to the (at most one) acquisition thread.
pub struct AcquisitionThread {
    source: Arc<dyn StatusSource>,
    signal: Arc<NewDataSignal>,
    lifecycle: Arc<Lifecycle>,
    started: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AcquisitionThread {
    /// Create a handle; nothing runs until [`start`](Self::start).
    pub fn new(source: Arc<dyn StatusSource>, signal: Arc<NewDataSignal>) -> Self {
        Self {
            source,
            signal,
            lifecycle: Arc::new(Lifecycle::default()),
            started: AtomicBool::new(false),
            handle: Mutex::new(None),
        }
    }

    /// Spawn the thread running `acquisition`.
    ///
    /// Returns `Ok(false)` without spawning if the thread was already started.
    pub fn start(
        &self,
        mut acquisition: Acquisition,
        settings: ThreadSettings,
    ) -> Result<bool, AcquisitionError> {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Acquisition thread already started");
            return Ok(false);
        }

        let guard = ExitGuard {
            lifecycle: Arc::clone(&self.lifecycle),
            source: Arc::clone(&self.source),
            signal: Arc::clone(&self.signal),
        };
        let lifecycle = Arc::clone(&self.lifecycle);

        let handle = std::thread::Builder::new()
            .name(ACQUISITION_THREAD_NAME.to_string())
            .spawn(move || {
                let _guard = guard;
                if let Err(e) = rt_setup(settings.cpu_core, settings.rt_priority) {
                    warn!("{e}; acquisition continues at default priority");
                }
                let scheduling = thread_scheduling();
                info!(
                    source = acquisition.ctx.source.name(),
                    fifo = scheduling.is_some_and(|s| s.fifo),
                    priority = scheduling.map_or(0, |s| s.priority),
                    "Acquisition thread running"
                );
                if let Err(e) = acquisition.run(&lifecycle, settings.wait_timeout) {
                    error!("FATAL: acquisition cycle failed: {e}");
                }
            })
            .map_err(|e| AcquisitionError::Spawn(e.to_string()))?;

        *self.handle.lock() = Some(handle);
        Ok(true)
    }

    /// Ask the thread to stop and release every waiter.
    ///
    /// `graceful = false` marks the exit as a failure (logged `FATAL`).
    pub fn request_stop(&self, graceful: bool) {
        self.lifecycle.request_stop(graceful);
        self.source.interrupt();
        self.signal.release();
    }

    /// Wait for the thread to exit. Returns `false` if it was never started
    /// or already joined.
    pub fn join(&self) -> bool {
        let Some(handle) = self.handle.lock().take() else {
            return false;
        };
        if handle.join().is_err() {
            error!("FATAL: acquisition thread panicked");
        }
        true
    }

    /// True once `start` has spawned the thread.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Shared keep-alive and exit flags.
    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }
}

impl fmt::Debug for AcquisitionThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquisitionThread")
            .field("started", &self.is_started())
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

// ─── RT Setup ───────────────────────────────────────────────────────

/// Lock all current and future memory pages.
///
/// No-op when the `rt` feature is not enabled.
#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), AcquisitionError> {
    use nix::sys::mman::{MlockallFlags, mlockall};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| AcquisitionError::RtSetup(format!("mlockall failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), AcquisitionError> {
    Ok(())
}

/// Pin the calling thread to `cpu`.
///
/// No-op when the `rt` feature is not enabled.
#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), AcquisitionError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| AcquisitionError::RtSetup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| AcquisitionError::RtSetup(format!("sched_setaffinity failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), AcquisitionError> {
    Ok(())
}

/// Switch the calling thread to `SCHED_FIFO` at `priority`.
///
/// Attempted on every Linux build; usually fails without `CAP_SYS_NICE`.
#[cfg(target_os = "linux")]
fn rt_set_scheduler(priority: i32) -> Result<(), AcquisitionError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: `param` is a valid sched_param; pid 0 targets the calling thread.
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(AcquisitionError::RtSetup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), AcquisitionError> {
    Ok(())
}

/// Scheduling policy and priority of the calling thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadScheduling {
    /// `true` for `SCHED_FIFO`.
    pub fifo: bool,
    /// Static priority (0 for the time-sharing policies).
    pub priority: i32,
}

/// Read back the calling thread's scheduling, `None` if the OS refuses.
#[cfg(target_os = "linux")]
pub fn thread_scheduling() -> Option<ThreadScheduling> {
    let mut param = libc::sched_param { sched_priority: 0 };
    // SAFETY: pid 0 targets the calling thread; `param` is a valid out pointer.
    let (policy, ret) = unsafe {
        (
            libc::sched_getscheduler(0),
            libc::sched_getparam(0, &mut param),
        )
    };
    (policy >= 0 && ret == 0).then_some(ThreadScheduling {
        fifo: policy == libc::SCHED_FIFO,
        priority: param.sched_priority,
    })
}

#[cfg(not(target_os = "linux"))]
pub fn thread_scheduling() -> Option<ThreadScheduling> {
    None
}

/// Elevate the calling thread for real-time acquisition.
///
/// Every step is attempted even if an earlier one fails; the first failure
/// is returned.
pub fn rt_setup(cpu_core: Option<usize>, rt_priority: i32) -> Result<(), AcquisitionError> {
    let mlock = rt_mlockall();
    let affinity = cpu_core.map_or(Ok(()), rt_set_affinity);
    let scheduler = rt_set_scheduler(rt_priority);
    mlock.and(affinity).and(scheduler)
}
