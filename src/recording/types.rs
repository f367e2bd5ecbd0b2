//! Recording session types: states, configuration, snapshots and errors.

use crate::metrics::Stats;
use crate::storage::disk::MIN_DISK_SPACE_BYTES;
use crate::track::{Track, TrackPoint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Store key of the crash-recovery snapshot.
pub const SNAPSHOT_KEY: &str = "autosave/current";

/// Lifecycle state of a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    /// Nothing recording
    #[default]
    Idle,
    /// Actively sampling
    Recording,
    /// An interrupted session was found and awaits resume or discard
    Recovering,
    /// Last session finished and was persisted
    Stopped,
}

/// Periodic work the session schedules while recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Activity {
    ElapsedTick,
    LiveStats,
    Autosave,
    StatusUpdate,
    SignalWatchdog,
}

impl Activity {
    pub const ALL: [Activity; 5] = [
        Activity::ElapsedTick,
        Activity::LiveStats,
        Activity::Autosave,
        Activity::StatusUpdate,
        Activity::SignalWatchdog,
    ];
}

/// Recording configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Free space required to start, in bytes
    pub min_free_bytes: u64,
    /// Fixes less accurate than this are dropped (meters)
    pub max_accuracy_m: f64,
    /// Minimum spacing between accepted fixes (milliseconds)
    pub min_fix_interval_ms: u64,
    /// First fix better than this triggers the place lookup (meters)
    pub geocode_accuracy_m: f64,
    /// Elapsed-time tick interval in seconds
    pub tick_interval_secs: u64,
    /// Live statistics recompute interval in seconds
    pub live_stats_interval_secs: u64,
    /// Auto-save interval in seconds
    pub autosave_interval_secs: u64,
    /// External status update interval in seconds
    pub status_interval_secs: u64,
    /// Signal watchdog interval in seconds
    pub watchdog_interval_secs: u64,
    /// Seconds without an accepted fix before signal counts as lost
    pub signal_lost_after_secs: u64,
    /// Battery fraction at or below which an autosave and warning are forced
    pub low_battery_level: f32,
    /// Battery fraction at or below which the session is stopped
    pub critical_battery_level: f32,
    /// Track label used when no place name was resolved
    pub fallback_label: String,
    /// Label passed to the background execution facility
    pub background_label: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            min_free_bytes: MIN_DISK_SPACE_BYTES,
            max_accuracy_m: 50.0,
            min_fix_interval_ms: 1000,
            geocode_accuracy_m: 20.0,
            tick_interval_secs: 1,
            live_stats_interval_secs: 5,
            autosave_interval_secs: 60,
            status_interval_secs: 5,
            watchdog_interval_secs: 5,
            signal_lost_after_secs: 30,
            low_battery_level: 0.10,
            critical_battery_level: 0.05,
            fallback_label: "Ski Session".to_string(),
            background_label: "slopetrace-recording".to_string(),
        }
    }
}

impl RecorderConfig {
    /// Period of a scheduled activity.
    pub fn period(&self, activity: Activity) -> Duration {
        let secs = match activity {
            Activity::ElapsedTick => self.tick_interval_secs,
            Activity::LiveStats => self.live_stats_interval_secs,
            Activity::Autosave => self.autosave_interval_secs,
            Activity::StatusUpdate => self.status_interval_secs,
            Activity::SignalWatchdog => self.watchdog_interval_secs,
        };
        Duration::from_secs(secs.max(1))
    }
}

/// Crash-recovery snapshot of an in-progress session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutosaveSnapshot {
    pub points: Vec<TrackPoint>,
    pub started_at: DateTime<Utc>,
    pub location_name: Option<String>,
    pub captured_at: DateTime<Utc>,
    /// Written while backgrounded; such snapshots are not offered for recovery
    pub graceful_pause: bool,
}

/// Summary shown to the user before resuming an interrupted session.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryOffer {
    pub point_count: usize,
    pub started_at: DateTime<Utc>,
    pub captured_at: DateTime<Utc>,
    pub location_name: Option<String>,
}

impl From<&AutosaveSnapshot> for RecoveryOffer {
    fn from(snapshot: &AutosaveSnapshot) -> Self {
        Self {
            point_count: snapshot.points.len(),
            started_at: snapshot.started_at,
            captured_at: snapshot.captured_at,
            location_name: snapshot.location_name.clone(),
        }
    }
}

/// Periodic status pushed to the platform (notification, widget, watch).
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub state: SessionState,
    pub elapsed_seconds: u64,
    pub point_count: usize,
    pub last_accuracy_m: Option<f64>,
    pub location_name: Option<String>,
    /// Last live statistics snapshot; advisory until the session stops
    pub live_stats: Option<Stats>,
    pub advisory: Option<AdvisoryError>,
    pub fatal: Option<FatalSessionError>,
}

/// Result of stopping a session that had data.
#[derive(Debug, Clone)]
pub struct StopOutcome {
    pub track: Track,
    /// Store key the track was written under, `None` if persisting failed
    pub stored_as: Option<String>,
}

impl StopOutcome {
    pub fn persisted(&self) -> bool {
        self.stored_as.is_some()
    }
}

/// Reasons Start, Resume or recovery were refused. No state changes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PreconditionError {
    #[error("Insufficient storage: {free_bytes} bytes free, {required_bytes} required")]
    InsufficientStorage { free_bytes: u64, required_bytes: u64 },

    #[error("Background execution denied: {0}")]
    BackgroundDenied(String),

    #[error("Location unavailable: {0}")]
    LocationUnavailable(String),

    #[error("Cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("No recovery snapshot available")]
    NoSnapshot,

    #[error("Recovery snapshot unreadable: {0}")]
    SnapshotUnreadable(String),

    #[error("Recording session has shut down")]
    SessionClosed,
}

/// Problems surfaced to the user while the session carries on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdvisoryError {
    #[error("Battery low ({:.0}%)", .level * 100.0)]
    LowBattery { level: f32 },

    #[error("GPS signal lost for {seconds}s")]
    SignalLost { seconds: u64 },

    #[error("Failed to save track: {0}")]
    PersistenceFailed(String),

    #[error("Auto-save failed: {0}")]
    AutosaveFailed(String),

    #[error("Teardown incomplete: {0}")]
    TeardownFailed(String),
}

/// Conditions that ended (or prevented) a session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FatalSessionError {
    #[error("Battery critical ({:.0}%), recording stopped", .level * 100.0)]
    CriticalBattery { level: f32 },

    #[error("Background execution token unavailable: {0}")]
    BackgroundTokenDenied(String),
}
