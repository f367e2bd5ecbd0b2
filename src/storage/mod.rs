//! Storage: durable named-blob store, disk headroom probe and configuration.

pub mod config;
pub mod database;
pub mod disk;
pub mod schema;

pub use config::{AppConfig, ConfigError};
pub use database::{Database, DatabaseError};
pub use disk::{DiskSpaceProbe, StorageProbe, StorageStatus};

use crate::track::Track;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

/// Prefix under which finalized tracks are persisted.
pub const TRACK_PREFIX: &str = "track/";

/// Receipt for a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreHandle {
    pub name: String,
    pub size_bytes: usize,
}

impl StoreHandle {
    pub fn new(name: &str, size_bytes: usize) -> Self {
        Self {
            name: name.to_string(),
            size_bytes,
        }
    }
}

/// Errors from a durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Durable store of named byte blobs.
pub trait TrackStore: Send + Sync {
    /// Write (or overwrite) `name`.
    fn write(&self, name: &str, bytes: &[u8]) -> Result<StoreHandle, StoreError>;

    /// Read `name`, `None` when absent.
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Delete `name`. Missing names are not an error.
    fn delete(&self, name: &str) -> Result<(), StoreError>;

    /// Names starting with `prefix`.
    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// In-memory store, used when no database is configured and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>, StoreError> {
        self.blobs
            .lock()
            .map_err(|e| StoreError::Backend(format!("Store lock failed: {}", e)))
    }
}

impl TrackStore for MemoryStore {
    fn write(&self, name: &str, bytes: &[u8]) -> Result<StoreHandle, StoreError> {
        self.lock()?.insert(name.to_string(), bytes.to_vec());
        Ok(StoreHandle::new(name, bytes.len()))
    }

    fn read(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.lock()?.get(name).cloned())
    }

    fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.lock()?.remove(name);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut names: Vec<String> = self
            .lock()?
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }
}

/// Serialize `track` as JSON under `track/<name>`. Returns the key.
///
/// A name already in the store gets a ` (2)`, ` (3)`, ... suffix so earlier
/// tracks are never replaced.
pub fn save_track(store: &dyn TrackStore, track: &Track) -> Result<String, StoreError> {
    let key = unused_track_key(store, &track.name)?;
    let bytes = serde_json::to_vec(track).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let handle = store.write(&key, &bytes)?;
    tracing::info!("Saved track {} ({} bytes)", key, handle.size_bytes);
    Ok(key)
}

fn unused_track_key(store: &dyn TrackStore, name: &str) -> Result<String, StoreError> {
    let base = format!("{}{}", TRACK_PREFIX, name);
    let existing = store.list(&base)?;
    if !existing.contains(&base) {
        return Ok(base);
    }

    let mut n = 2;
    loop {
        let candidate = format!("{} ({})", base, n);
        if !existing.contains(&candidate) {
            tracing::warn!("Track {} already exists, saving as {}", base, candidate);
            return Ok(candidate);
        }
        n += 1;
    }
}

/// Load a stored track by name (with or without the `track/` prefix).
pub fn load_track(store: &dyn TrackStore, name: &str) -> Result<Option<Track>, StoreError> {
    let key = if name.starts_with(TRACK_PREFIX) {
        name.to_string()
    } else {
        format!("{}{}", TRACK_PREFIX, name)
    };

    match store.read(&key)? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Serialization(e.to_string())),
        None => Ok(None),
    }
}

/// Names of all stored tracks, without the prefix.
pub fn list_tracks(store: &dyn TrackStore) -> Result<Vec<String>, StoreError> {
    Ok(store
        .list(TRACK_PREFIX)?
        .into_iter()
        .map(|key| key.trim_start_matches(TRACK_PREFIX).to_string())
        .collect())
}
