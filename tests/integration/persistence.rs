//! SQLite round-trips, privacy mode, and migration from older formats.

use std::collections::BTreeMap;

use tokio::time::Instant;

use winlayout::engine::{EngineEvent, Outcome};
use winlayout::store::{
    ACTIVE_SLOT_KEY, KeyValueStore, LAYOUTS_KEY, SALT_KEY, SLOTS_KEY, SlotWindows, WINDOWS_KEY,
};

use crate::common::fixtures::{Workspace, engine_with, manual_settings, scenario_desktop};
use crate::common::timeline::drain;

#[test]
fn test_slots_survive_reopen() {
    let ws = Workspace::new();
    let desktop = scenario_desktop();
    let t0 = Instant::now();

    let mut engine = engine_with(&desktop, ws.open_store(5), manual_settings());
    engine.capture_slot(1, t0).unwrap();
    engine.capture_slot(3, t0).unwrap();
    let saved = engine.slots().to_vec();
    drop(engine);

    let mut store = ws.open_store(5);
    let loaded = store.load_slots().unwrap().expect("slots persisted");
    assert_eq!(loaded.len(), saved.len());
    for (a, b) in loaded.iter().zip(&saved) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.windows, b.windows);
    }

    // Same salt on reopen, so a fresh capture yields identical identities.
    let mut engine = engine_with(&desktop, store, manual_settings());
    engine.capture_slot(1, t0).unwrap();
    assert_eq!(engine.slots()[1].windows, saved[1].windows);
}

#[test]
fn test_privacy_purge_survives_restart() {
    let ws = Workspace::new();
    let desktop = scenario_desktop();
    let t0 = Instant::now();

    let mut engine = engine_with(&desktop, ws.open_store(5), manual_settings());
    engine.capture_slot(1, t0).unwrap();
    engine.store_mut().set_active_slot(2).unwrap();

    let purged = engine.store_mut().set_privacy_mode(true).unwrap();
    assert_eq!(purged, 2);

    // In-memory captures keep working but are not written.
    engine.capture_slot(4, t0).unwrap();
    assert!(!engine.slots()[4].is_empty());
    drop(engine);

    let mut store = ws.open_store(5);
    assert!(store.privacy_mode());
    assert!(store.load_slots().unwrap().is_none());
    assert_eq!(store.active_slot().unwrap(), 0);
    assert!(store.kv_mut().get(SALT_KEY).unwrap().is_some());
    assert!(store.kv_mut().get(ACTIVE_SLOT_KEY).unwrap().is_none());

    let engine = engine_with(&desktop, store, manual_settings());
    assert!(engine.slots().iter().all(|s| s.is_empty()));
}

#[test]
fn test_disabling_privacy_resumes_persistence() {
    let ws = Workspace::new();
    let desktop = scenario_desktop();
    let t0 = Instant::now();

    let mut engine = engine_with(&desktop, ws.open_store(5), manual_settings());
    engine.store_mut().set_privacy_mode(true).unwrap();
    assert_eq!(engine.store_mut().set_privacy_mode(false).unwrap(), 0);
    engine.capture_slot(2, t0).unwrap();
    drop(engine);

    let mut store = ws.open_store(5);
    assert!(!store.privacy_mode());
    let (count, updated) = store.slot_info(2).unwrap();
    assert_eq!(count, 3);
    assert!(updated.is_some());
}

#[test]
fn test_previous_generation_layouts_migrated_on_open() {
    let ws = Workspace::new();
    let desktop = scenario_desktop();
    let t0 = Instant::now();

    // Capture with the real salt, then rewrite the payload in the old shape.
    let mut engine = engine_with(&desktop, ws.open_store(5), manual_settings());
    engine.capture_slot(2, t0).unwrap();
    let windows: SlotWindows = engine.slots()[2].windows.clone();
    drop(engine);

    let mut store = ws.open_store(5);
    let legacy: BTreeMap<String, SlotWindows> = BTreeMap::from([("2".to_string(), windows.clone())]);
    store.kv_mut().remove(SLOTS_KEY).unwrap();
    store
        .kv_mut()
        .set(LAYOUTS_KEY, &serde_json::to_vec(&legacy).unwrap())
        .unwrap();

    let mut engine = engine_with(&desktop, store, manual_settings());
    assert_eq!(engine.slots()[2].windows, windows);
    assert!(engine.slots()[1].is_empty());

    let kv = engine.store_mut().kv_mut();
    assert!(kv.get(SLOTS_KEY).unwrap().is_some());
    assert!(kv.get(LAYOUTS_KEY).unwrap().is_none());
}

#[test]
fn test_unsalted_generation_is_discarded() {
    let ws = Workspace::new();
    let desktop = scenario_desktop();

    let mut store = ws.open_store(5);
    store
        .kv_mut()
        .set(WINDOWS_KEY, br#"{"wn:1":{"x":0,"y":0,"width":10,"height":10}}"#)
        .unwrap();

    let mut engine = engine_with(&desktop, store, manual_settings());
    assert!(engine.slots().iter().all(|s| s.is_empty()));
    assert!(engine.store_mut().kv_mut().get(WINDOWS_KEY).unwrap().is_none());
}

#[test]
fn test_undecodable_slots_left_untouched_with_notice() {
    let ws = Workspace::new();
    let desktop = scenario_desktop();

    let mut store = ws.open_store(5);
    store.kv_mut().set(SLOTS_KEY, b"not json").unwrap();

    let mut engine = engine_with(&desktop, store, manual_settings());
    let mut rx = engine.subscribe();
    engine.start(Instant::now());

    assert!(engine.slots().iter().all(|s| s.is_empty()));
    let outcomes = drain(&mut rx);
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(&outcomes[0], Outcome::Notice { message } if message.contains("could not be read")));
    assert_eq!(
        engine.store_mut().kv_mut().get(SLOTS_KEY).unwrap(),
        Some(b"not json".to_vec())
    );
}

#[test]
fn test_purged_slots_stay_purged_after_privacy_is_disabled() {
    let ws = Workspace::new();
    let desktop = scenario_desktop();
    let t0 = Instant::now();

    let mut engine = engine_with(&desktop, ws.open_store(5), manual_settings());
    let mut rx = engine.subscribe();
    engine.capture_slot(1, t0).unwrap();

    engine.handle(EngineEvent::SetPrivacy { enabled: true }, t0);
    assert!(engine.slots().iter().all(|s| s.is_empty()));
    engine.handle(EngineEvent::SetPrivacy { enabled: false }, t0);
    engine.capture_slot(2, t0).unwrap();

    let outcomes = drain(&mut rx);
    assert_eq!(
        &outcomes[..2],
        &[
            Outcome::PrivacyChanged {
                enabled: true,
                purged: 1
            },
            Outcome::PrivacyChanged {
                enabled: false,
                purged: 0
            },
        ]
    );
    drop(engine);

    let mut store = ws.open_store(5);
    assert_eq!(store.slot_info(1).unwrap().0, 0);
    assert_eq!(store.slot_info(2).unwrap().0, 3);
}

#[test]
fn test_capture_writes_only_its_own_slot() {
    let ws = Workspace::new();
    let desktop = scenario_desktop();
    let t0 = Instant::now();

    // Purge through the store directly, behind the engine's back.
    let mut engine = engine_with(&desktop, ws.open_store(5), manual_settings());
    engine.capture_slot(1, t0).unwrap();
    engine.store_mut().set_privacy_mode(true).unwrap();
    engine.store_mut().set_privacy_mode(false).unwrap();
    engine.capture_slot(2, t0).unwrap();
    assert!(engine.slots()[1].is_empty());
    drop(engine);

    let mut store = ws.open_store(5);
    assert_eq!(store.slot_info(1).unwrap().0, 0);
    assert_eq!(store.slot_info(2).unwrap().0, 3);
}

#[test]
fn test_privacy_enabled_by_another_process_stops_running_engine() {
    let ws = Workspace::new();
    let desktop = scenario_desktop();
    let t0 = Instant::now();

    let mut engine = engine_with(&desktop, ws.open_store(5), manual_settings());
    engine.capture_slot(1, t0).unwrap();

    let mut other = ws.open_store(5);
    assert_eq!(other.set_privacy_mode(true).unwrap(), 1);
    drop(other);

    engine.capture_slot(2, t0).unwrap();
    assert!(engine.store().privacy_mode());
    assert!(engine.slots()[1].is_empty());
    assert!(!engine.slots()[2].is_empty());
    drop(engine);

    let mut store = ws.open_store(5);
    assert!(store.privacy_mode());
    assert!(store.load_slots().unwrap().is_none());
}
