//! Location sensor types and the collaborator traits the recorder consumes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// A single position report from the platform location service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Altitude in meters
    pub elevation: f64,
    /// Horizontal accuracy radius in meters (smaller is better)
    pub accuracy_m: f64,
    /// Time the fix was taken
    pub timestamp: DateTime<Utc>,
}

impl LocationFix {
    pub fn new(
        latitude: f64,
        longitude: f64,
        elevation: f64,
        accuracy_m: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            latitude,
            longitude,
            elevation,
            accuracy_m,
            timestamp,
        }
    }
}

/// Accuracy requested from the location service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccuracyHint {
    /// Best available, highest power draw
    #[default]
    Best,
    /// Roughly ten meters
    NearestTenMeters,
    /// Coarse, power saving
    Reduced,
}

/// Identifier of an active location subscription.
pub type SubscriptionId = Uuid;

/// Live subscription handed out by a [`LocationProvider`].
#[derive(Debug)]
pub struct LocationSubscription {
    pub id: SubscriptionId,
    pub fixes: mpsc::UnboundedReceiver<LocationFix>,
}

/// Token proving the process may keep running while backgrounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundToken {
    pub id: Uuid,
    pub label: String,
}

impl BackgroundToken {
    pub fn new(label: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.to_string(),
        }
    }
}

/// Source of location fixes.
pub trait LocationProvider: Send + Sync {
    /// Start delivering fixes at the given accuracy.
    fn subscribe(&self, hint: AccuracyHint) -> Result<LocationSubscription, SensorError>;

    /// Stop delivering fixes for `id`.
    fn unsubscribe(&self, id: SubscriptionId) -> Result<(), SensorError>;
}

/// Platform facility that keeps the process alive in the background.
pub trait BackgroundExecution: Send + Sync {
    fn acquire(&self, label: &str) -> Result<BackgroundToken, SensorError>;

    fn release(&self, token: BackgroundToken) -> Result<(), SensorError>;
}

/// Errors from the sensor collaborators.
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location service unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown subscription: {0}")]
    UnknownSubscription(SubscriptionId),

    #[error("Background execution denied: {0}")]
    BackgroundDenied(String),

    #[error("Background token release failed: {0}")]
    ReleaseFailed(String),
}
