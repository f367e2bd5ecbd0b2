//! Integration tests for crash recovery through the SQLite store

use super::support::{fix, RigBuilder};
use slopetrace::recording::{ManualClock, PreconditionError, SessionState};
use slopetrace::storage::{list_tracks, Database, TrackStore};
use std::sync::{Arc, Mutex};

fn open_store(path: &std::path::Path) -> Arc<dyn TrackStore> {
    Arc::new(Mutex::new(Database::open(path).unwrap()))
}

#[test]
fn test_resume_after_crash() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("slopetrace.db");
    let clock = Arc::new(ManualClock::new(super::support::t0()));

    {
        let mut rig = RigBuilder::new()
            .store(open_store(&db_path))
            .clock(clock.clone())
            .build();
        rig.session.start().unwrap();
        for i in 0..30 {
            rig.session.handle_fix(fix(i * 1000));
        }
        rig.session.autosave(false);
        // Process dies here without stopping
    }

    clock.advance(chrono::Duration::minutes(5));

    let mut rig = RigBuilder::new()
        .store(open_store(&db_path))
        .clock(clock.clone())
        .build();

    assert!(rig.session.check_for_recovery());
    let offer = rig.session.begin_recovery().unwrap();
    assert_eq!(offer.point_count, 30);
    assert_eq!(offer.started_at, super::support::t0());
    assert_eq!(rig.session.state(), SessionState::Recovering);

    rig.session.resume().unwrap();
    assert_eq!(rig.session.state(), SessionState::Recording);
    assert_eq!(rig.session.elapsed_seconds(), 300);

    rig.session.handle_fix(fix(31_000));
    let outcome = rig.session.stop().unwrap();
    assert!(outcome.persisted());
    assert_eq!(outcome.track.points.len(), 31);

    assert!(!rig.session.check_for_recovery());
    assert_eq!(list_tracks(rig.store.as_ref()).unwrap().len(), 1);
}

#[test]
fn test_discard_recovery() {
    let store: Arc<dyn TrackStore> = Arc::new(slopetrace::storage::MemoryStore::new());

    {
        let mut rig = RigBuilder::new().store(store.clone()).build();
        rig.session.start().unwrap();
        rig.session.handle_fix(fix(0));
    }

    let mut rig = RigBuilder::new().store(store.clone()).build();
    rig.session.begin_recovery().unwrap();
    rig.session.discard();

    assert_eq!(rig.session.state(), SessionState::Idle);
    assert!(!rig.session.check_for_recovery());
    assert!(matches!(
        rig.session.begin_recovery(),
        Err(PreconditionError::NoSnapshot)
    ));
}

#[test]
fn test_graceful_pause_is_not_offered() {
    let store: Arc<dyn TrackStore> = Arc::new(slopetrace::storage::MemoryStore::new());

    {
        let mut rig = RigBuilder::new().store(store.clone()).build();
        rig.session.start().unwrap();
        rig.session.handle_fix(fix(0));
        rig.session.on_foreground_changed(false);
        // Killed by the OS while in the background
    }

    let mut rig = RigBuilder::new().store(store).build();
    assert_eq!(rig.session.state(), SessionState::Idle);
    assert!(!rig.session.check_for_recovery());
    assert!(matches!(
        rig.session.begin_recovery(),
        Err(PreconditionError::NoSnapshot)
    ));
}

#[test]
fn test_check_for_recovery_requires_idle() {
    let store: Arc<dyn TrackStore> = Arc::new(slopetrace::storage::MemoryStore::new());
    let mut rig = RigBuilder::new().store(store).build();

    rig.session.start().unwrap();
    rig.session.handle_fix(fix(0));
    rig.session.autosave(false);

    // A live session never offers to recover itself
    assert!(!rig.session.check_for_recovery());
}

#[test]
fn test_start_clears_stale_snapshot() {
    let store: Arc<dyn TrackStore> = Arc::new(slopetrace::storage::MemoryStore::new());

    {
        let mut rig = RigBuilder::new().store(store.clone()).build();
        rig.session.start().unwrap();
        rig.session.handle_fix(fix(0));
    }

    let mut rig = RigBuilder::new().store(store).build();
    rig.session.start().unwrap();
    assert_eq!(rig.session.point_count(), 0);

    rig.session.discard();
    assert!(!rig.session.check_for_recovery());
}
