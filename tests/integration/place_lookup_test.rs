//! Integration tests for place names resolved by a configured session

use super::support::{fix, t0};
use slopetrace::integrations::NetworkFlag;
use slopetrace::recording::{LogStatusPublisher, ManualClock, SessionActor, SessionServices};
use slopetrace::sensors::ChannelLocationProvider;
use slopetrace::storage::config::AppConfig;
use slopetrace::storage::disk::DiskSpaceProbe;
use slopetrace::storage::{list_tracks, MemoryStore, TrackStore};
use slopetrace::SessionHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Answer every reverse lookup on localhost with `village`.
async fn serve_place(village: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}/reverse", listener.local_addr().unwrap());

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await;
            let body = format!(r#"{{"address":{{"village":"{}"}}}}"#, village);
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
        }
    });

    endpoint
}

fn services(store: Arc<dyn TrackStore>, data_dir: &std::path::Path) -> SessionServices {
    SessionServices {
        store,
        storage: Arc::new(DiskSpaceProbe::new(data_dir)),
        location: Arc::new(ChannelLocationProvider::new()),
        background: None,
        reachability: Arc::new(NetworkFlag::new(true)),
        status: Arc::new(LogStatusPublisher),
        clock: Arc::new(ManualClock::new(t0())),
    }
}

async fn wait_for_place(handle: &SessionHandle) -> Option<String> {
    for _ in 0..100 {
        let name = handle.status().await.and_then(|s| s.location_name);
        if name.is_some() {
            return name;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    None
}

#[tokio::test]
async fn test_configured_session_names_track_from_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.geocoding.endpoint = serve_place("Zermatt").await;
    config.geocoding.timeout_secs = 2;

    let store: Arc<dyn TrackStore> = Arc::new(MemoryStore::new());
    let handle = SessionActor::spawn_configured(&config, services(store.clone(), dir.path()));

    handle.start().await.unwrap();
    handle.push_fix(fix(0));
    assert_eq!(wait_for_place(&handle).await.as_deref(), Some("Zermatt"));

    handle.push_fix(fix(1000));
    let outcome = handle.stop().await.unwrap();
    assert_eq!(
        outcome.stored_as.as_deref(),
        Some("track/2024-02-10 09:30 Zermatt")
    );
    assert_eq!(
        list_tracks(store.as_ref()).unwrap(),
        vec!["2024-02-10 09:30 Zermatt".to_string()]
    );
}

#[tokio::test]
async fn test_disabled_lookup_never_calls_out() {
    let dir = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

    let mut config = AppConfig::default();
    config.geocoding.enabled = false;
    config.geocoding.endpoint = format!("http://{}/reverse", listener.local_addr().unwrap());

    let store: Arc<dyn TrackStore> = Arc::new(MemoryStore::new());
    let handle = SessionActor::spawn_configured(&config, services(store, dir.path()));

    handle.start().await.unwrap();
    handle.push_fix(fix(0));
    handle.push_fix(fix(1000));
    let outcome = handle.stop().await.unwrap();

    assert_eq!(outcome.track.name, "2024-02-10 09:30 Ski Session");
    let connection = tokio::time::timeout(Duration::from_millis(100), listener.accept()).await;
    assert!(connection.is_err());
}
