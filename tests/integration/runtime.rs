//! The engine on a tokio task, under a paused clock.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;

use winlayout::engine::{EngineEvent, Outcome};
use winlayout::geometry::Rect;
use winlayout::restore::RestoreReport;

use crate::common::fixtures::{APP1, APP2, APP3, EXTERNAL, app1_home, memory_engine, scenario_desktop};

async fn next_pass(rx: &mut broadcast::Receiver<Outcome>) -> (RestoreReport, Instant) {
    loop {
        match rx.recv().await {
            Ok(Outcome::RestorationFinished { report, .. }) => return (report, Instant::now()),
            Ok(_) => {}
            Err(e) => panic!("outcome stream ended: {e}"),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_spawned_engine_restores_after_reconnect() {
    let desktop = scenario_desktop();
    let mut engine = memory_engine(&desktop);
    engine.capture_slot(0, Instant::now()).unwrap();

    let (handle, task) = engine.spawn();
    let mut rx = handle.subscribe();

    desktop.disconnect(EXTERNAL);
    handle.send(EngineEvent::TopologyChanged).await.unwrap();
    tokio::time::sleep(Duration::from_millis(700)).await;
    desktop.reconnect(EXTERNAL);
    handle.send(EngineEvent::TopologyChanged).await.unwrap();

    let started = Instant::now();
    let (report, at) = next_pass(&mut rx).await;
    assert_eq!(report.restored_count, 1);
    assert_eq!(desktop.window_frame(APP1), Some(app1_home()));
    assert!(at - started >= Duration::from_secs(4));

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_retries_are_spaced_by_retry_delay() {
    let desktop = scenario_desktop();
    let mut engine = memory_engine(&desktop);
    engine.capture_slot(0, Instant::now()).unwrap();
    desktop.move_window(APP1, Rect::new(2560.0, 0.0, 800.0, 600.0));
    desktop.move_window(APP2, Rect::new(2900.0, 300.0, 600.0, 400.0));
    desktop.move_window(APP3, Rect::new(3000.0, 200.0, 500.0, 500.0));
    desktop.fail_controller(true);

    let (handle, task) = engine.spawn();
    let mut rx = handle.subscribe();
    handle.send(EngineEvent::TopologyChanged).await.unwrap();

    let (_, first) = next_pass(&mut rx).await;
    let (second_report, second) = next_pass(&mut rx).await;
    assert_eq!(second_report.attempt, 1);
    assert_eq!(second - first, Duration::from_secs(3));

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_engine_stops_when_every_handle_is_dropped() {
    let desktop = scenario_desktop();
    let engine = memory_engine(&desktop);
    let (handle, task) = engine.spawn();

    drop(handle);
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_handle_errors_after_shutdown() {
    let desktop = scenario_desktop();
    let engine = memory_engine(&desktop);
    let (handle, task) = engine.spawn();

    handle.shutdown().await.unwrap();
    task.await.unwrap();
    assert!(handle.send(EngineEvent::Resume).await.is_err());
}
