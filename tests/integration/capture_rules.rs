//! Guards around automatic capture.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use winlayout::capture::{CaptureOutcome, SkipReason};
use winlayout::config::Settings;
use winlayout::engine::{Engine, EngineEvent, Outcome};
use winlayout::geometry::Rect;
use winlayout::platform::mock::MockDesktop;
use winlayout::store::{AUTO_SLOT, SnapshotStore};
use winlayout::timeline::TimerKind;

use crate::common::fixtures::{APP1, EXTERNAL, engine_with, memory_engine, scenario_desktop};
use crate::common::timeline::{drain, drive};

fn auto_engine(desktop: &Arc<MockDesktop>) -> Engine {
    engine_with(desktop, SnapshotStore::in_memory(5), Settings::default())
}

#[test]
fn test_initial_capture_then_single_display_skip() {
    let desktop = scenario_desktop();
    let mut engine = auto_engine(&desktop);
    let mut rx = engine.subscribe();
    let t0 = Instant::now();

    engine.start(t0);
    assert_eq!(engine.pending_timers(), vec![TimerKind::InitialCapture]);
    drive(&mut engine, t0 + Duration::from_secs(5));

    assert_eq!(
        drain(&mut rx),
        vec![Outcome::CaptureFinished {
            slot: AUTO_SLOT,
            windows: 3,
            displays: 2,
        }]
    );
    let external = engine.slots()[AUTO_SLOT].windows.get(&EXTERNAL).cloned();
    assert!(external.is_some());

    desktop.disconnect(EXTERNAL);
    drive(&mut engine, t0 + Duration::from_secs(35));

    assert_eq!(
        drain(&mut rx),
        vec![Outcome::CaptureSkipped {
            slot: AUTO_SLOT,
            reason: SkipReason::SingleDisplay,
        }]
    );
    assert_eq!(engine.slots()[AUTO_SLOT].windows.get(&EXTERNAL).cloned(), external);
}

#[test]
fn test_auto_capture_waits_for_cycle_to_finish() {
    let desktop = scenario_desktop();
    let mut engine = auto_engine(&desktop);
    let mut rx = engine.subscribe();
    let t0 = Instant::now();

    engine.start(t0);
    // Pending until 7.5s, restores at 8.5s: the 5s capture lands mid-cycle.
    engine.handle(EngineEvent::TopologyChanged, t0 + Duration::from_millis(4_500));
    drive(&mut engine, t0 + Duration::from_secs(6));

    let outcomes = drain(&mut rx);
    assert!(outcomes.contains(&Outcome::CaptureSkipped {
        slot: AUTO_SLOT,
        reason: SkipReason::CycleInFlight,
    }));

    drive(&mut engine, t0 + Duration::from_secs(36));
    let outcomes = drain(&mut rx);
    assert!(
        outcomes
            .iter()
            .any(|o| matches!(o, Outcome::CaptureFinished { slot: AUTO_SLOT, .. }))
    );
}

#[test]
fn test_explicit_capture_allowed_with_one_display() {
    let desktop = scenario_desktop();
    desktop.disconnect(EXTERNAL);
    let mut engine = memory_engine(&desktop);
    let t0 = Instant::now();

    let outcome = engine.capture_slot(1, t0).unwrap();
    assert!(matches!(outcome, CaptureOutcome::Captured { windows: 3, displays: 1, .. }));

    let outcome = engine.capture_slot(AUTO_SLOT, t0).unwrap();
    assert_eq!(
        outcome,
        CaptureOutcome::Skipped {
            reason: SkipReason::SingleDisplay
        }
    );
}

#[test]
fn test_capture_paused_leaves_slot_alone() {
    let desktop = scenario_desktop();
    let mut engine = memory_engine(&desktop);
    let t0 = Instant::now();

    engine.handle(EngineEvent::SetPaused { until: None }, t0);
    let calls = desktop.enumerate_calls();
    let outcome = engine.capture_slot(1, t0).unwrap();

    assert_eq!(
        outcome,
        CaptureOutcome::Skipped {
            reason: SkipReason::Paused
        }
    );
    assert!(engine.slots()[1].is_empty());
    assert_eq!(desktop.enumerate_calls(), calls);
}

#[test]
fn test_empty_external_bucket_keeps_previous_capture() {
    let desktop = scenario_desktop();
    let mut engine = memory_engine(&desktop);
    let t0 = Instant::now();
    engine.capture_slot(1, t0).unwrap();
    let before = engine.slots()[1].windows.get(&EXTERNAL).cloned();

    // The external display still reports, but its window list came back
    // empty for this capture.
    desktop.move_window(APP1, Rect::new(2600.0, 500.0, 800.0, 300.0));
    let outcome = engine.capture_slot(1, t0).unwrap();

    assert!(matches!(
        outcome,
        CaptureOutcome::Captured {
            restored_from_backup: 1,
            ..
        }
    ));
    assert_eq!(engine.slots()[1].windows.get(&EXTERNAL).cloned(), before);
}

#[test]
fn test_sleep_cancels_periodic_capture_and_wake_rearms() {
    let desktop = scenario_desktop();
    let mut engine = auto_engine(&desktop);
    let t0 = Instant::now();

    engine.start(t0);
    engine.handle(EngineEvent::SystemWillSleep, t0 + Duration::from_secs(1));
    assert!(engine.pending_timers().is_empty());

    engine.handle(EngineEvent::SystemDidWake, t0 + Duration::from_secs(60));
    let pending = engine.pending_timers();
    assert!(pending.contains(&TimerKind::InitialCapture));
    assert!(pending.contains(&TimerKind::StabilizationPoll));
}
