//! Acquisition cadence, snapshot atomicity and new-data coalescing.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use kestrel_common::consts::MAX_JOYSTICKS;
use kestrel_runtime::acquisition::{Acquisition, AcquisitionContext, AcquisitionCounters};
use kestrel_runtime::complain::RateLimitedWarner;
use kestrel_runtime::config::AcquisitionConfig;
use kestrel_runtime::joystick::JoystickCache;
use kestrel_runtime::safety::{SafetyHelper, SafetyRegistry};
use kestrel_runtime::signal::NewDataSignal;
use kestrel_runtime::telemetry::TelemetrySink;

use super::harness::{Packet, ScriptedSource, harness};

#[derive(Default)]
struct CountingSink {
    publishes: AtomicU64,
}

impl TelemetrySink for CountingSink {
    fn publish(&self, _cache: &JoystickCache) {
        self.publishes.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Default)]
struct CountingHelper {
    checks: AtomicU64,
}

impl SafetyHelper for CountingHelper {
    fn description(&self) -> &str {
        "counting"
    }

    fn check(&self) {
        self.checks.fetch_add(1, Ordering::Relaxed);
    }
}

struct Rig {
    acquisition: Acquisition,
    signal: Arc<NewDataSignal>,
    sink: Arc<CountingSink>,
    helper: Arc<CountingHelper>,
}

fn rig(config: &AcquisitionConfig) -> Rig {
    let source = ScriptedSource::new();
    source.set_current(Packet::default());
    let sink = Arc::new(CountingSink::default());
    let helper = Arc::new(CountingHelper::default());
    let safety = Arc::new(SafetyRegistry::new());
    safety.register(helper.clone());
    let signal = Arc::new(NewDataSignal::new());

    let ctx = AcquisitionContext {
        source,
        cache: Arc::new(JoystickCache::new(Arc::new(RateLimitedWarner::default()))),
        signal: Arc::clone(&signal),
        telemetry: sink.clone(),
        safety,
        counters: Arc::new(AcquisitionCounters::default()),
    };
    Rig {
        acquisition: Acquisition::new(ctx, config),
        signal,
        sink,
        helper,
    }
}

#[test]
fn eight_cycles_publish_four_times_and_check_safety_twice() {
    let mut rig = rig(&AcquisitionConfig::default());
    let mut telemetry_at = Vec::new();
    let mut safety_at = Vec::new();

    for iteration in 1..=8u64 {
        let publishes = rig.sink.publishes.load(Ordering::Relaxed);
        let checks = rig.helper.checks.load(Ordering::Relaxed);
        rig.acquisition.run_cycle().unwrap();
        if rig.sink.publishes.load(Ordering::Relaxed) > publishes {
            telemetry_at.push(iteration);
        }
        if rig.helper.checks.load(Ordering::Relaxed) > checks {
            safety_at.push(iteration);
        }
    }

    assert_eq!(telemetry_at, [2, 4, 6, 8]);
    assert_eq!(safety_at, [4, 8]);
    let stats = rig.acquisition.stats();
    assert_eq!(stats.cycles, 8);
    assert_eq!(stats.publishes, 4);
    assert_eq!(stats.safety_checks, 2);
}

#[test]
fn cadence_follows_configuration() {
    let config = AcquisitionConfig {
        telemetry_every: 3,
        safety_every: 1,
        ..AcquisitionConfig::default()
    };
    let mut rig = rig(&config);
    for _ in 0..9 {
        rig.acquisition.run_cycle().unwrap();
    }
    assert_eq!(rig.sink.publishes.load(Ordering::Relaxed), 3);
    assert_eq!(rig.helper.checks.load(Ordering::Relaxed), 9);
}

#[test]
fn new_data_coalesces_across_cycles() {
    let mut rig = rig(&AcquisitionConfig::default());
    for n in 1..=4 {
        for _ in 0..n {
            rig.acquisition.run_cycle().unwrap();
        }
        assert!(rig.signal.is_new_data());
        assert!(!rig.signal.is_new_data());
    }
}

#[test]
fn readers_never_see_a_mixed_snapshot() {
    const PACKETS: i16 = 2_000;

    let h = harness();
    let station = Arc::clone(&h.station);
    let done = Arc::new(AtomicBool::new(false));
    let torn = Arc::new(Mutex::new(None));

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let cache = Arc::clone(station.cache());
            let done = Arc::clone(&done);
            let torn = Arc::clone(&torn);
            thread::spawn(move || {
                while !done.load(Ordering::Acquire) {
                    let snap = cache.snapshot();
                    let first = snap.sticks[0].axes.first().copied();
                    if snap.sticks.iter().any(|s| s.axes.first().copied() != first) {
                        *torn.lock() = Some(snap.sticks.clone());
                    }
                }
            })
        })
        .collect();

    station.start_acquisition().unwrap();
    for value in 0..PACKETS {
        h.source.push(Packet::uniform_axis(value % 256 - 128));
    }
    while station.stats().cycles < PACKETS as u64 {
        thread::sleep(Duration::from_millis(1));
    }
    done.store(true, Ordering::Release);
    for reader in readers {
        reader.join().unwrap();
    }
    station.request_stop(true);
    station.join_acquisition();

    assert!(torn.lock().is_none(), "observed a torn snapshot");
    assert_eq!(station.cache().axis_count(MAX_JOYSTICKS - 1), 1);
}

#[test]
fn missing_inputs_warn_once_per_cooldown() {
    let h = harness();
    let mut acquisition = h.station.new_acquisition();
    h.source.set_current(Packet::uniform_axis(64));
    acquisition.run_cycle().unwrap();

    assert_eq!(h.station.read_axis(0, 0), 64.0 / 127.0);
    assert_eq!(h.station.read_axis(0, 3), 0.0);
    assert!(!h.station.read_button(1, 1));
    assert_eq!(h.station.read_pov(2, 0), 0);

    let warner = h.station.cache().warner();
    assert_eq!(warner.emitted(), 1);
    assert_eq!(warner.suppressed(), 2);
}
