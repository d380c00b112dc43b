//! Mode transitions and hook dispatch, driven by manual acquisition cycles.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use kestrel_common::hal::types::ControlWord;
use kestrel_common::mode::GameMode;
use kestrel_runtime::acquisition::Acquisition;
use kestrel_runtime::config::RuntimeConfig;
use kestrel_runtime::mode::{ModeScheduler, NoopMode, SchedulerError, StepOutcome, mode_handle};

use super::harness::{
    AUTON_WORD, Harness, Packet, SpyMode, TELEOP_WORD, TEST_WORD, harness, harness_with,
};

const NO_WAIT: Option<Duration> = Some(Duration::ZERO);

fn cycle(h: &Harness, acquisition: &mut Acquisition, word: ControlWord) {
    h.source.set_current(Packet::with_word(word));
    acquisition.run_cycle().unwrap();
}

#[test]
fn none_disabled_auton_teleop_sequence() {
    let h = harness();
    h.register_spies();
    let mut acquisition = h.station.new_acquisition();
    let mut scheduler = ModeScheduler::new(Arc::clone(&h.station));

    assert_eq!(h.station.current_game_mode(), GameMode::None);

    cycle(&h, &mut acquisition, ControlWord::empty());
    assert_eq!(scheduler.step(NO_WAIT).unwrap(), StepOutcome::Ran);
    assert_eq!(h.station.current_game_mode(), GameMode::Disabled);

    cycle(&h, &mut acquisition, AUTON_WORD);
    assert_eq!(scheduler.step(NO_WAIT).unwrap(), StepOutcome::Ran);
    assert_eq!(h.station.current_game_mode(), GameMode::Auton);

    cycle(&h, &mut acquisition, TELEOP_WORD);
    assert_eq!(scheduler.step(NO_WAIT).unwrap(), StepOutcome::Ran);
    assert_eq!(h.station.current_game_mode(), GameMode::Teleop);

    assert_eq!(
        h.calls(),
        [
            "Disabled.periodic",
            "Disabled.exit",
            "Auton.enter",
            "Auton.periodic",
            "Auton.exit",
            "Teleop.enter",
            "Teleop.periodic",
        ]
    );
    assert_eq!(scheduler.transitions(), 2);
}

#[test]
fn initial_disabled_is_activated_without_enter() {
    let h = harness();
    h.register_spies();
    let mut acquisition = h.station.new_acquisition();
    let mut scheduler = ModeScheduler::new(Arc::clone(&h.station));

    for _ in 0..3 {
        cycle(&h, &mut acquisition, ControlWord::DS_ATTACHED);
        scheduler.step(NO_WAIT).unwrap();
    }

    let calls = h.calls();
    assert!(!calls.iter().any(|c| c == "Disabled.enter"));
    assert_eq!(calls, ["Disabled.periodic"; 3]);
    assert_eq!(scheduler.transitions(), 0);
}

#[test]
fn exit_failure_still_completes_transition() {
    let h = harness();
    h.register_spies();
    let mut failing = SpyMode::new("Disabled", &h.log);
    failing.fail_exit = true;
    // Not active yet, so the replacement is accepted.
    assert!(h.station.register(GameMode::Disabled, mode_handle(failing)));

    let mut acquisition = h.station.new_acquisition();
    let mut scheduler = ModeScheduler::new(Arc::clone(&h.station));
    scheduler.start();

    cycle(&h, &mut acquisition, AUTON_WORD);
    assert_eq!(scheduler.step(NO_WAIT).unwrap(), StepOutcome::Ran);

    assert_eq!(h.calls(), ["Disabled.exit", "Auton.enter", "Auton.periodic"]);
    assert_eq!(h.station.current_game_mode(), GameMode::Auton);
    assert_eq!(h.source.reports.load(Ordering::Relaxed), 1);
    assert!(h.source.last_report().contains("'Disabled'"));
}

#[test]
fn enter_failure_is_logged_and_periodic_still_runs() {
    let h = harness();
    h.register_spies();
    let mut failing = SpyMode::new("Test", &h.log);
    failing.fail_enter = true;
    h.station.register(GameMode::Test, mode_handle(failing));

    let mut acquisition = h.station.new_acquisition();
    let mut scheduler = ModeScheduler::new(Arc::clone(&h.station));

    cycle(&h, &mut acquisition, TEST_WORD);
    assert_eq!(scheduler.step(NO_WAIT).unwrap(), StepOutcome::Ran);
    assert_eq!(h.calls(), ["Disabled.exit", "Test.enter", "Test.periodic"]);
    assert!(h.source.last_report().contains("enter hook of mode 'Test'"));
}

#[test]
fn periodic_failure_escalates() {
    let h = harness();
    h.register_spies();
    let mut failing = SpyMode::new("Teleop", &h.log);
    failing.fail_periodic = true;
    h.station.register(GameMode::Teleop, mode_handle(failing));

    let mut acquisition = h.station.new_acquisition();
    let mut scheduler = ModeScheduler::new(Arc::clone(&h.station));

    cycle(&h, &mut acquisition, TELEOP_WORD);
    let err = scheduler.step(NO_WAIT).unwrap_err();
    match err {
        SchedulerError::PeriodicFailed { mode, source } => {
            assert_eq!(mode, "Teleop");
            assert_eq!(source.to_string(), "Teleop periodic failed");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn mode_bit_change_within_same_mode_reenters() {
    let h = harness();
    h.register_spies();
    let mut acquisition = h.station.new_acquisition();
    let mut scheduler = ModeScheduler::new(Arc::clone(&h.station));

    cycle(&h, &mut acquisition, ControlWord::empty());
    scheduler.step(NO_WAIT).unwrap();
    // Autonomous bit while disabled: still DISABLED, but the bits changed.
    cycle(&h, &mut acquisition, ControlWord::AUTONOMOUS);
    scheduler.step(NO_WAIT).unwrap();
    // Non-mode bits never cause a transition.
    cycle(
        &h,
        &mut acquisition,
        ControlWord::AUTONOMOUS | ControlWord::FMS_ATTACHED,
    );
    scheduler.step(NO_WAIT).unwrap();

    assert_eq!(
        h.calls(),
        [
            "Disabled.periodic",
            "Disabled.exit",
            "Disabled.enter",
            "Disabled.periodic",
            "Disabled.periodic",
        ]
    );
}

#[test]
fn register_is_ignored_for_active_mode() {
    let h = harness();
    h.register_spies();
    let mut scheduler = ModeScheduler::new(Arc::clone(&h.station));
    scheduler.start();
    assert_eq!(h.station.current_game_mode(), GameMode::Disabled);

    let original = h.station.modes().lookup(GameMode::Disabled);
    let replacement = mode_handle(SpyMode::new("Replacement", &h.log));
    assert!(!h.station.register(GameMode::Disabled, Arc::clone(&replacement)));
    assert!(Arc::ptr_eq(&h.station.modes().lookup(GameMode::Disabled), &original));

    assert!(h.station.register(GameMode::Test, Arc::clone(&replacement)));
    assert!(Arc::ptr_eq(&h.station.modes().lookup(GameMode::Test), &replacement));
}

#[test]
fn unregistered_modes_fall_back_to_noop() {
    let h = harness();
    let mut acquisition = h.station.new_acquisition();
    let mut scheduler = ModeScheduler::new(Arc::clone(&h.station));

    cycle(&h, &mut acquisition, AUTON_WORD);
    assert_eq!(scheduler.step(NO_WAIT).unwrap(), StepOutcome::Ran);
    assert_eq!(scheduler.active_handle().lock().name(), NoopMode::NAME);
}

#[test]
fn timeout_without_data_is_idle() {
    let h = harness();
    h.register_spies();
    let mut scheduler = ModeScheduler::new(Arc::clone(&h.station));

    let outcome = scheduler.step(Some(Duration::from_millis(10))).unwrap();
    assert_eq!(outcome, StepOutcome::Idle);
    assert!(h.calls().is_empty());
    assert_eq!(h.source.heartbeats.load(Ordering::Relaxed), 0);
}

#[test]
fn coalesced_cycles_run_periodic_once() {
    let h = harness();
    h.register_spies();
    let mut acquisition = h.station.new_acquisition();
    let mut scheduler = ModeScheduler::new(Arc::clone(&h.station));

    for _ in 0..5 {
        cycle(&h, &mut acquisition, TELEOP_WORD);
    }
    assert_eq!(scheduler.step(NO_WAIT).unwrap(), StepOutcome::Ran);
    assert_eq!(scheduler.step(NO_WAIT).unwrap(), StepOutcome::Idle);

    h.clear_calls();
    cycle(&h, &mut acquisition, TELEOP_WORD);
    assert_eq!(scheduler.step(NO_WAIT).unwrap(), StepOutcome::Ran);
    assert_eq!(h.calls(), ["Teleop.periodic"]);
    assert_eq!(h.source.heartbeats.load(Ordering::Relaxed), 2);
}

#[test]
fn heap_trim_option_does_not_change_dispatch() {
    let mut config = RuntimeConfig::default();
    config.scheduler.trim_heap_on_transition = true;
    let h = harness_with(&config);
    h.register_spies();
    let mut acquisition = h.station.new_acquisition();
    let mut scheduler = ModeScheduler::with_config(Arc::clone(&h.station), &config.scheduler);

    cycle(&h, &mut acquisition, TEST_WORD);
    scheduler.step(NO_WAIT).unwrap();
    assert_eq!(h.calls(), ["Disabled.exit", "Test.enter", "Test.periodic"]);
}
