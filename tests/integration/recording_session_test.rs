//! Integration tests for a recording session from start to stop

use super::support::{fix, FlakyStore, RigBuilder};
use slopetrace::recording::{
    Activity, AdvisoryError, AutosaveSnapshot, FixOutcome, PreconditionError, SessionState,
    SNAPSHOT_KEY,
};
use slopetrace::storage::{list_tracks, load_track, TrackStore};
use std::sync::Arc;

fn snapshot(store: &Arc<dyn TrackStore>) -> Option<AutosaveSnapshot> {
    store
        .read(SNAPSHOT_KEY)
        .unwrap()
        .map(|bytes| serde_json::from_slice(&bytes).unwrap())
}

#[test]
fn test_full_recording_flow() {
    let mut rig = RigBuilder::new().build();

    assert_eq!(rig.session.state(), SessionState::Idle);
    rig.session.start().unwrap();
    assert_eq!(rig.session.state(), SessionState::Recording);

    // Two minutes of skiing at one fix per second
    for i in 0..120 {
        assert_eq!(rig.session.handle_fix(fix(i * 1000)), FixOutcome::Accepted);
    }
    rig.clock.advance(chrono::Duration::seconds(120));
    rig.session.tick(Activity::ElapsedTick);
    rig.session.tick(Activity::LiveStats);
    rig.session.tick(Activity::Autosave);

    assert_eq!(rig.session.elapsed_seconds(), 120);
    assert_eq!(snapshot(&rig.store).unwrap().points.len(), 120);
    let live = rig.session.live_stats().unwrap().clone();
    assert!((live.total_descent_m - 119.0).abs() < 1e-6);

    let outcome = rig.session.stop().unwrap();
    assert!(outcome.persisted());
    assert_eq!(rig.session.state(), SessionState::Stopped);
    assert_eq!(outcome.track.points.len(), 120);
    assert!(snapshot(&rig.store).is_none());

    let names = list_tracks(rig.store.as_ref()).unwrap();
    assert_eq!(names, vec!["2024-02-10 09:30 Ski Session".to_string()]);
    let stored = load_track(rig.store.as_ref(), &names[0]).unwrap().unwrap();
    assert_eq!(stored.stats, outcome.track.stats);
}

#[test]
fn test_start_refused_below_fifty_megabytes() {
    let mut rig = RigBuilder::new()
        .free_bytes(Some(49 * 1024 * 1024))
        .build();

    let err = rig.session.start().unwrap_err();
    assert!(matches!(err, PreconditionError::InsufficientStorage { .. }));
    assert_eq!(rig.session.state(), SessionState::Idle);
    assert_eq!(rig.provider.subscriber_count(), 0);
    assert!(snapshot(&rig.store).is_none());
}

#[test]
fn test_fix_spacing() {
    let mut rig = RigBuilder::new().build();
    rig.session.start().unwrap();

    rig.session.handle_fix(fix(0));
    assert_eq!(rig.session.point_count(), 1);

    rig.session.handle_fix(fix(500));
    assert_eq!(rig.session.point_count(), 1);

    rig.session.handle_fix(fix(1000));
    assert_eq!(rig.session.point_count(), 2);
}

#[test]
fn test_fixes_drained_from_subscription() {
    let mut rig = RigBuilder::new().build();
    rig.session.start().unwrap();

    for i in 0..5 {
        rig.provider.push(fix(i * 1000));
    }
    for f in rig.runtime.drain_fixes() {
        rig.session.handle_fix(f);
    }
    assert_eq!(rig.session.point_count(), 5);
}

#[test]
fn test_critical_battery_stops_session() {
    let mut rig = RigBuilder::new().build();
    rig.session.start().unwrap();
    rig.session.handle_fix(fix(0));

    let outcome = rig.session.on_battery_level(0.05);
    assert!(outcome.is_some());
    assert_eq!(rig.session.state(), SessionState::Stopped);
    assert!(rig.runtime.scheduled().is_empty());
}

#[test]
fn test_critical_battery_with_no_points_goes_idle() {
    let mut rig = RigBuilder::new().build();
    rig.session.start().unwrap();

    assert!(rig.session.on_battery_level(0.05).is_none());
    assert_eq!(rig.session.state(), SessionState::Idle);
}

#[test]
fn test_persistence_failure_keeps_snapshot() {
    let store = Arc::new(FlakyStore::default());
    store.fail_track_writes(true);
    let mut rig = RigBuilder::new().store(store.clone()).build();

    rig.session.start().unwrap();
    for i in 0..10 {
        rig.session.handle_fix(fix(i * 1000));
    }

    let outcome = rig.session.stop().unwrap();
    assert!(!outcome.persisted());
    assert_eq!(outcome.track.points.len(), 10);
    assert_eq!(rig.session.state(), SessionState::Idle);
    assert!(matches!(
        rig.session.advisory(),
        Some(AdvisoryError::PersistenceFailed(_))
    ));

    // The snapshot holds every point and is offered for recovery
    assert_eq!(snapshot(&rig.store).unwrap().points.len(), 10);
    assert!(rig.session.check_for_recovery());
}

#[test]
fn test_restart_after_stop() {
    let mut rig = RigBuilder::new().build();
    rig.session.start().unwrap();
    rig.session.handle_fix(fix(0));
    rig.session.stop().unwrap();
    assert_eq!(rig.session.state(), SessionState::Stopped);

    rig.session.start().unwrap();
    assert_eq!(rig.session.state(), SessionState::Recording);
    assert_eq!(rig.session.point_count(), 0);
}

#[test]
fn test_start_twice_is_rejected() {
    let mut rig = RigBuilder::new().build();
    rig.session.start().unwrap();
    assert!(matches!(
        rig.session.start(),
        Err(PreconditionError::InvalidState { .. })
    ));
    assert_eq!(rig.provider.subscriber_count(), 1);
}

#[test]
fn test_place_name_only_when_reachable() {
    let mut rig = RigBuilder::new().build();
    rig.network.set(false);
    rig.session.start().unwrap();

    rig.session.handle_fix(fix(0));
    assert!(rig.runtime.place_requests().is_empty());

    rig.network.set(true);
    rig.session.handle_fix(fix(1000));
    assert_eq!(rig.runtime.place_requests().len(), 1);

    // A failed lookup leaves the fallback label in place
    rig.session.apply_place_name(None);
    let outcome = rig.session.stop().unwrap();
    assert!(outcome.track.name.ends_with("Ski Session"));
}
