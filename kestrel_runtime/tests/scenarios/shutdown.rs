//! Threaded runs: start, graceful stop and producer failure.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use kestrel_common::mode::GameMode;
use kestrel_runtime::mode::{ModeScheduler, SchedulerError, StepOutcome, mode_handle};
use kestrel_runtime::signal::WaitOutcome;

use super::harness::{AUTON_WORD, Packet, SpyMode, TELEOP_WORD, harness};

fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn start_acquisition_is_idempotent() {
    let h = harness();
    assert!(h.station.start_acquisition().unwrap());
    assert!(!h.station.start_acquisition().unwrap());
    assert!(!h.station.start_acquisition().unwrap());

    h.source.push(Packet::default());
    wait_until("one cycle", || h.station.stats().cycles == 1);

    h.station.request_stop(true);
    assert!(h.station.join_acquisition());
    assert!(!h.station.acquisition_failed());
}

#[test]
fn stop_releases_a_blocked_scheduler() {
    let h = harness();
    h.register_spies();
    h.station.start_acquisition().unwrap();

    let station = Arc::clone(&h.station);
    let blocked = thread::spawn(move || {
        let mut scheduler = ModeScheduler::new(station);
        scheduler.step(None)
    });

    thread::sleep(Duration::from_millis(20));
    h.station.request_stop(true);

    assert_eq!(blocked.join().unwrap().unwrap(), StepOutcome::Stopped);
    assert!(h.station.join_acquisition());
    assert_eq!(h.station.wait_for_data(None), WaitOutcome::Released);
    assert!(h.calls().is_empty());
}

#[test]
fn non_graceful_stop_always_fails_a_blocked_scheduler() {
    for _ in 0..100 {
        let h = harness();
        h.register_spies();
        h.station.start_acquisition().unwrap();

        let station = Arc::clone(&h.station);
        let blocked = thread::spawn(move || ModeScheduler::new(station).step(None));
        thread::sleep(Duration::from_millis(1));
        h.station.request_stop(false);

        let err = blocked.join().unwrap().unwrap_err();
        assert!(matches!(err, SchedulerError::AcquisitionStopped));
        assert!(h.station.acquisition_failed());
        h.station.join_acquisition();
    }
}

#[test]
fn non_graceful_stop_fails_run() {
    let h = harness();
    h.register_spies();
    h.station.start_acquisition().unwrap();

    let station = Arc::clone(&h.station);
    let runner = thread::spawn(move || ModeScheduler::new(station).run());
    h.source.push(Packet::with_word(TELEOP_WORD));
    wait_until("dispatch", || h.source.heartbeats.load(Ordering::Relaxed) >= 1);

    h.station.request_stop(false);
    let err = runner.join().unwrap().unwrap_err();
    assert!(matches!(err, SchedulerError::AcquisitionStopped));
    h.station.join_acquisition();
    assert!(h.source.reports.load(Ordering::Relaxed) >= 1);
}

#[test]
fn acquisition_failure_stops_the_scheduler() {
    let h = harness();
    h.register_spies();
    h.station.start_acquisition().unwrap();
    let mut scheduler = ModeScheduler::new(Arc::clone(&h.station));

    h.source.push(Packet::with_word(TELEOP_WORD));
    assert_eq!(scheduler.step(None).unwrap(), StepOutcome::Ran);

    h.source.fail_next_wait();
    let err = scheduler.step(None).unwrap_err();
    assert!(matches!(err, SchedulerError::AcquisitionStopped));

    h.station.join_acquisition();
    assert!(h.station.acquisition_failed());
    assert!(h.source.reports.load(Ordering::Relaxed) >= 1);
}

#[test]
fn threaded_run_follows_the_match() {
    let h = harness();
    h.register_spies();
    h.station.start_acquisition().unwrap();

    let station = Arc::clone(&h.station);
    let runner = thread::spawn(move || ModeScheduler::new(station).run());

    let mut expected_cycles = 0;
    for word in [AUTON_WORD, AUTON_WORD, TELEOP_WORD, TELEOP_WORD] {
        h.source.push(Packet::with_word(word));
        expected_cycles += 1;
        wait_until("acquisition", || h.station.stats().cycles == expected_cycles);
        wait_until("dispatch", || {
            h.calls().last().is_some_and(|c| c.ends_with("periodic"))
                && h.source.heartbeats.load(Ordering::Relaxed) >= expected_cycles
        });
    }
    assert_eq!(h.station.current_game_mode(), GameMode::Teleop);

    h.station.request_stop(true);
    runner.join().unwrap().unwrap();
    h.station.join_acquisition();

    let calls = h.calls();
    let exit_auton = calls.iter().position(|c| c == "Auton.exit").unwrap();
    let enter_teleop = calls.iter().position(|c| c == "Teleop.enter").unwrap();
    assert!(exit_auton < enter_teleop);
    assert!(!calls.iter().any(|c| c == "Disabled.enter"));
}

#[test]
fn run_reports_periodic_failure() {
    let h = harness();
    h.register_spies();
    let mut failing = SpyMode::new("Auton", &h.log);
    failing.fail_periodic = true;
    h.station.register(GameMode::Auton, mode_handle(failing));
    h.station.start_acquisition().unwrap();

    let station = Arc::clone(&h.station);
    let runner = thread::spawn(move || ModeScheduler::new(station).run());
    h.source.push(Packet::with_word(AUTON_WORD));

    let err = runner.join().unwrap().unwrap_err();
    assert!(matches!(err, SchedulerError::PeriodicFailed { ref mode, .. } if mode == "Auton"));
    assert!(h.source.last_report().contains("periodic hook of mode 'Auton'"));

    h.station.request_stop(true);
    h.station.join_acquisition();
    assert!(!h.station.acquisition_failed());
}
