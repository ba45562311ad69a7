//! Reconnect scenarios and the retry policy.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use winlayout::engine::{EngineEvent, Outcome};
use winlayout::geometry::{Point, Rect};
use winlayout::platform::mock::{MockDesktop, Operation};
use winlayout::restore::RestoreReport;
use winlayout::stabilize::DetectorState;

use crate::common::fixtures::{
    APP1, APP2, EXTERNAL, app1_home, app2_home, memory_engine, scenario_desktop,
};
use crate::common::timeline::{count, drain, drive, passes};

fn reports(outcomes: &[Outcome]) -> Vec<RestoreReport> {
    outcomes
        .iter()
        .filter_map(|o| match o {
            Outcome::RestorationFinished { report, .. } => Some(report.clone()),
            _ => None,
        })
        .collect()
}

fn attempts(outcomes: &[Outcome]) -> Vec<u32> {
    outcomes
        .iter()
        .filter_map(|o| match o {
            Outcome::RestorationFinished { attempt, .. } => Some(*attempt),
            _ => None,
        })
        .collect()
}

/// Two windows on two displays, both pushed off their saved frames.
fn two_window_desktop() -> Arc<MockDesktop> {
    let desktop = MockDesktop::dual_display();
    desktop.add_window("App1", 101, APP1, app1_home());
    desktop.add_window("App2", 102, APP2, app2_home());
    Arc::new(desktop)
}

fn displace_both(desktop: &MockDesktop) {
    desktop.move_window(APP1, Rect::new(2560.0, 0.0, 800.0, 600.0));
    desktop.move_window(APP2, Rect::new(3000.0, 300.0, 600.0, 400.0));
}

#[test]
fn test_reconnect_restores_window_from_external_display() {
    let desktop = scenario_desktop();
    let mut engine = memory_engine(&desktop);
    let mut rx = engine.subscribe();
    let t0 = Instant::now();

    engine.capture_slot(1, t0).unwrap();
    engine.store_mut().set_active_slot(1).unwrap();

    desktop.disconnect(EXTERNAL);
    assert_ne!(desktop.window_frame(APP1), Some(app1_home()));
    engine.handle(EngineEvent::TopologyChanged, t0);

    desktop.reconnect(EXTERNAL);
    engine.handle(EngineEvent::TopologyChanged, t0 + Duration::from_millis(800));
    drive(&mut engine, t0 + Duration::from_secs(30));

    let outcomes = drain(&mut rx);
    assert!(matches!(
        outcomes.first(),
        Some(Outcome::CycleStarted { slot: 1, .. })
    ));

    let reports = reports(&outcomes);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].slot_index, 1);
    assert_eq!(reports[0].restored_count, 1);
    assert_eq!(reports[0].unchanged, 2);
    assert_eq!(desktop.window_frame(APP1), Some(app1_home()));
    desktop.assert_contains(&Operation::SetFrame {
        pid: 101,
        window_number: APP1,
        frame: app1_home(),
    });
}

#[test]
fn test_restoring_nothing_retries_twice_then_gives_up() {
    let desktop = two_window_desktop();
    let mut engine = memory_engine(&desktop);
    let mut rx = engine.subscribe();
    let t0 = Instant::now();
    engine.capture_slot(0, t0).unwrap();

    displace_both(&desktop);
    desktop.fail_controller(true);

    engine.handle(EngineEvent::TopologyChanged, t0);
    // First pass at settle (3s) + restore delay (1s).
    drive(&mut engine, t0 + Duration::from_secs(4));
    assert_eq!(
        engine.next_deadline(),
        Some(t0 + Duration::from_secs(7)),
        "retry is due one retry delay after the pass"
    );

    drive(&mut engine, t0 + Duration::from_secs(60));
    let outcomes = drain(&mut rx);

    assert_eq!(passes(&outcomes), 3);
    assert_eq!(attempts(&outcomes), vec![0, 1, 2]);
    let retries: Vec<_> = outcomes
        .iter()
        .filter_map(|o| match o {
            Outcome::RetryScheduled { attempt, delay_ms } => Some((*attempt, *delay_ms)),
            _ => None,
        })
        .collect();
    assert_eq!(retries, vec![(1, 3_000), (2, 3_000)]);
    assert_eq!(count(&outcomes, |o| matches!(o, Outcome::RetriesExhausted { .. })), 1);
    for report in reports(&outcomes) {
        assert_eq!(report.restored_count, 0);
        assert_eq!(report.skipped.len(), 2);
    }
    desktop.assert_no_moves();
    assert_eq!(engine.detector_state(), DetectorState::Idle);
}

#[test]
fn test_retry_stops_once_a_pass_restores() {
    let desktop = two_window_desktop();
    let mut engine = memory_engine(&desktop);
    let mut rx = engine.subscribe();
    let t0 = Instant::now();
    engine.capture_slot(0, t0).unwrap();

    displace_both(&desktop);
    desktop.fail_controller(true);
    engine.handle(EngineEvent::TopologyChanged, t0);
    drive(&mut engine, t0 + Duration::from_secs(4));

    desktop.fail_controller(false);
    drive(&mut engine, t0 + Duration::from_secs(60));

    let outcomes = drain(&mut rx);
    assert_eq!(attempts(&outcomes), vec![0, 1]);
    assert_eq!(reports(&outcomes)[1].restored_count, 2);
    assert_eq!(count(&outcomes, |o| matches!(o, Outcome::RetriesExhausted { .. })), 0);
    assert_eq!(desktop.window_frame(APP1), Some(app1_home()));
    assert_eq!(desktop.window_frame(APP2), Some(app2_home()));
}

#[test]
fn test_new_signal_resets_attempt_counter() {
    let desktop = two_window_desktop();
    let mut engine = memory_engine(&desktop);
    let mut rx = engine.subscribe();
    let t0 = Instant::now();
    engine.capture_slot(0, t0).unwrap();

    displace_both(&desktop);
    desktop.fail_controller(true);
    engine.handle(EngineEvent::TopologyChanged, t0);
    drive(&mut engine, t0 + Duration::from_secs(4));

    // A fresh signal while the retry is pending starts a new cycle.
    engine.handle(EngineEvent::TopologyChanged, t0 + Duration::from_secs(5));
    drive(&mut engine, t0 + Duration::from_secs(60));

    let outcomes = drain(&mut rx);
    assert_eq!(count(&outcomes, |o| matches!(o, Outcome::CycleStarted { .. })), 2);
    assert_eq!(attempts(&outcomes), vec![0, 0, 1, 2]);
}

#[test]
fn test_window_moved_since_enumeration_is_skipped() {
    let desktop = scenario_desktop();
    let mut engine = memory_engine(&desktop);
    let t0 = Instant::now();
    engine.capture_slot(1, t0).unwrap();

    desktop.move_window(APP1, Rect::new(2560.0, 0.0, 800.0, 600.0));
    desktop.drift_window(APP1, Point::new(50.0, 0.0));

    let report = engine.restore_slot(1, t0).unwrap().expect("not paused");
    assert_eq!(report.restored_count, 0);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].window_number, Some(APP1));
    assert!(report.skipped[0].reason.contains("moved"));
    desktop.assert_no_moves();
}

#[test]
fn test_one_failing_window_does_not_stop_the_rest() {
    let desktop = two_window_desktop();
    let mut engine = memory_engine(&desktop);
    let t0 = Instant::now();
    engine.capture_slot(1, t0).unwrap();

    displace_both(&desktop);
    desktop.fail_window(APP1);

    let report = engine.restore_slot(1, t0).unwrap().expect("not paused");
    assert_eq!(report.restored_count, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(desktop.window_frame(APP2), Some(app2_home()));
}

#[test]
fn test_explicit_restore_is_gated_by_pause() {
    let desktop = scenario_desktop();
    let mut engine = memory_engine(&desktop);
    let mut rx = engine.subscribe();
    let t0 = Instant::now();
    engine.capture_slot(1, t0).unwrap();

    engine.handle(EngineEvent::SetPaused { until: None }, t0);
    engine.handle(EngineEvent::RestoreNow { slot: 1 }, t0);

    let outcomes = drain(&mut rx);
    assert_eq!(
        outcomes,
        vec![Outcome::RestorationSkipped {
            slot: 1,
            reason: "paused".to_string(),
        }]
    );
    desktop.assert_no_moves();
}
