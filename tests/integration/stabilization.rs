//! Topology bursts, cooldown, and the pause gate, driven through the engine.

use std::time::Duration;

use tokio::time::Instant;

use winlayout::engine::{EngineEvent, Outcome};
use winlayout::geometry::Rect;
use winlayout::stabilize::DetectorState;
use winlayout::store::AUTO_SLOT;

use crate::common::fixtures::{APP1, EXTERNAL, app1_home, memory_engine, scenario_desktop};
use crate::common::init_test_logging;
use crate::common::timeline::{count, drain, drive, passes};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn displaced() -> Rect {
    Rect::new(2560.0, 0.0, 800.0, 600.0)
}

#[test]
fn test_burst_restores_exactly_once() {
    init_test_logging();
    let desktop = scenario_desktop();
    let mut engine = memory_engine(&desktop);
    let mut rx = engine.subscribe();
    let t0 = Instant::now();
    engine.capture_slot(AUTO_SLOT, t0).unwrap();
    desktop.move_window(APP1, displaced());

    // Six signals 600ms apart, each well inside the stabilization delay.
    for i in 0..6 {
        let at = t0 + ms(i * 600);
        engine.handle(EngineEvent::TopologyChanged, at);
        drive(&mut engine, at + ms(599));
    }
    drive(&mut engine, t0 + Duration::from_secs(60));

    let outcomes = drain(&mut rx);
    assert_eq!(count(&outcomes, |o| matches!(o, Outcome::CycleStarted { .. })), 1);
    assert_eq!(passes(&outcomes), 1);
    assert_eq!(desktop.window_frame(APP1), Some(app1_home()));
    assert_eq!(desktop.move_count(), 1);
}

#[test]
fn test_separate_bursts_restore_separately() {
    let desktop = scenario_desktop();
    let mut engine = memory_engine(&desktop);
    let mut rx = engine.subscribe();
    let t0 = Instant::now();
    engine.capture_slot(AUTO_SLOT, t0).unwrap();

    engine.handle(EngineEvent::TopologyChanged, t0);
    drive(&mut engine, t0 + Duration::from_secs(20));
    assert_eq!(engine.detector_state(), DetectorState::Idle);

    let t1 = t0 + Duration::from_secs(20);
    engine.handle(EngineEvent::TopologyChanged, t1);
    drive(&mut engine, t1 + Duration::from_secs(20));

    let outcomes = drain(&mut rx);
    assert_eq!(count(&outcomes, |o| matches!(o, Outcome::CycleStarted { .. })), 2);
    assert_eq!(passes(&outcomes), 2);
}

#[test]
fn test_cooldown_absorbs_signals_after_restore() {
    let desktop = scenario_desktop();
    let mut engine = memory_engine(&desktop);
    let mut rx = engine.subscribe();
    let t0 = Instant::now();
    engine.capture_slot(AUTO_SLOT, t0).unwrap();

    engine.handle(EngineEvent::TopologyChanged, t0);
    // Settles at 3s, restores at 4s, cools down until 9s.
    drive(&mut engine, t0 + ms(4_000));
    assert_eq!(engine.detector_state(), DetectorState::CooldownActive);

    engine.handle(EngineEvent::TopologyChanged, t0 + ms(4_500));
    assert_eq!(engine.detector_state(), DetectorState::CooldownActive);

    drive(&mut engine, t0 + ms(9_000));
    assert_eq!(engine.detector_state(), DetectorState::Idle);
    engine.handle(EngineEvent::TopologyChanged, t0 + ms(9_500));

    let outcomes = drain(&mut rx);
    assert_eq!(count(&outcomes, |o| matches!(o, Outcome::SignalAbsorbed)), 1);
    assert_eq!(count(&outcomes, |o| matches!(o, Outcome::CycleStarted { .. })), 2);
}

#[test]
fn test_display_added_during_cooldown_starts_cycle() {
    let desktop = scenario_desktop();
    let mut engine = memory_engine(&desktop);
    let mut rx = engine.subscribe();
    let t0 = Instant::now();
    engine.capture_slot(AUTO_SLOT, t0).unwrap();

    engine.handle(EngineEvent::TopologyChanged, t0);
    drive(&mut engine, t0 + ms(4_000));

    desktop.disconnect(EXTERNAL);
    engine.handle(EngineEvent::TopologyChanged, t0 + ms(4_200));
    desktop.reconnect(EXTERNAL);
    engine.handle(EngineEvent::TopologyChanged, t0 + ms(4_400));

    let outcomes = drain(&mut rx);
    assert_eq!(count(&outcomes, |o| matches!(o, Outcome::SignalAbsorbed)), 1);
    assert_eq!(count(&outcomes, |o| matches!(o, Outcome::CycleStarted { .. })), 2);
    assert!(matches!(engine.detector_state(), DetectorState::Pending { .. }));
}

#[test]
fn test_pause_defers_restoration_until_resume() {
    let desktop = scenario_desktop();
    let mut engine = memory_engine(&desktop);
    let mut rx = engine.subscribe();
    let t0 = Instant::now();
    engine.capture_slot(AUTO_SLOT, t0).unwrap();
    desktop.move_window(APP1, displaced());
    let calls = desktop.enumerate_calls();

    engine.handle(EngineEvent::TopologyChanged, t0);
    engine.handle(EngineEvent::SetPaused { until: None }, t0);
    drive(&mut engine, t0 + Duration::from_secs(30));

    assert_eq!(passes(&drain(&mut rx)), 0);
    assert_eq!(desktop.enumerate_calls(), calls);
    assert!(matches!(engine.detector_state(), DetectorState::Pending { .. }));

    let resumed = t0 + Duration::from_secs(30);
    engine.handle(EngineEvent::Resume, resumed);
    drive(&mut engine, resumed + Duration::from_secs(5));

    assert_eq!(passes(&drain(&mut rx)), 1);
    assert_eq!(desktop.window_frame(APP1), Some(app1_home()));
}

#[test]
fn test_timed_pause_expires_on_its_own() {
    let desktop = scenario_desktop();
    let mut engine = memory_engine(&desktop);
    let mut rx = engine.subscribe();
    let t0 = Instant::now();
    engine.capture_slot(AUTO_SLOT, t0).unwrap();

    engine.handle(
        EngineEvent::SetPaused {
            until: Some(Duration::from_secs(10)),
        },
        t0,
    );
    engine.handle(EngineEvent::TopologyChanged, t0);

    drive(&mut engine, t0 + ms(9_900));
    assert_eq!(passes(&drain(&mut rx)), 0);

    drive(&mut engine, t0 + Duration::from_secs(30));
    assert_eq!(passes(&drain(&mut rx)), 1);
}

#[test]
fn test_fallback_forces_pass_missed_while_paused() {
    let desktop = scenario_desktop();
    let mut engine = memory_engine(&desktop);
    let mut rx = engine.subscribe();
    let t0 = Instant::now();
    engine.capture_slot(AUTO_SLOT, t0).unwrap();

    engine.handle(EngineEvent::TopologyChanged, t0);
    drive(&mut engine, t0 + ms(3_000));
    assert_eq!(engine.detector_state(), DetectorState::RestorationScheduled);

    // Paused across the restore delay: the pass is deferred.
    engine.handle(EngineEvent::SetPaused { until: None }, t0 + ms(3_500));
    drive(&mut engine, t0 + ms(12_000));
    assert_eq!(passes(&drain(&mut rx)), 0);

    // The watchdog armed at settle time (3s + 10s) forces it.
    engine.handle(EngineEvent::Resume, t0 + ms(12_000));
    drive(&mut engine, t0 + ms(13_000));
    assert_eq!(passes(&drain(&mut rx)), 1);
}
