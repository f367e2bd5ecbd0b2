//! Track and track point types shared by import, analysis and recording.

use crate::geo::Coordinate;
use crate::metrics::calculator::analyze;
use crate::metrics::types::{AnalysisConfig, Run, Stats};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name used when a source carries no session name.
pub const UNNAMED_TRACK: &str = "Unnamed Track";

/// One normalized position/elevation/time sample.
///
/// The raw fields come from ingestion or the live sensor stream; the derived
/// fields are filled in by [`analyze`] and default to zero until then.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    /// GPS latitude in degrees
    pub latitude: f64,
    /// GPS longitude in degrees
    pub longitude: f64,
    /// Elevation in meters
    pub elevation: f64,
    /// Sample time
    pub timestamp: DateTime<Utc>,
    /// Heart rate in BPM
    #[serde(default)]
    pub heart_rate: Option<u8>,
    /// Speed reported by the device in km/h
    #[serde(default)]
    pub reported_speed_kmh: Option<f64>,
    /// Speed from the previous point in km/h
    #[serde(default)]
    pub instant_speed_kmh: f64,
    /// Window-smoothed speed in km/h
    #[serde(default)]
    pub speed_kmh: f64,
    /// Distance from the first point in meters
    #[serde(default)]
    pub cumulative_distance_m: f64,
    /// Slope from the previous point in degrees (positive = downhill)
    #[serde(default)]
    pub slope_deg: f64,
    /// Whether the point was classified as descending
    #[serde(default)]
    pub descending: bool,
}

impl TrackPoint {
    /// Create a point with no heart rate and no derived data.
    pub fn new(latitude: f64, longitude: f64, elevation: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            elevation,
            timestamp,
            heart_rate: None,
            reported_speed_kmh: None,
            instant_speed_kmh: 0.0,
            speed_kmh: 0.0,
            cumulative_distance_m: 0.0,
            slope_deg: 0.0,
            descending: false,
        }
    }

    /// Attach a heart rate reading. Zero means "no reading".
    pub fn with_heart_rate(mut self, bpm: Option<u8>) -> Self {
        self.heart_rate = bpm.filter(|hr| *hr > 0);
        self
    }

    /// Attach a device-reported speed in km/h.
    pub fn with_reported_speed(mut self, speed_kmh: Option<f64>) -> Self {
        self.reported_speed_kmh = speed_kmh.filter(|s| s.is_finite() && *s >= 0.0);
        self
    }
}

impl Coordinate for TrackPoint {
    fn latitude(&self) -> f64 {
        self.latitude
    }

    fn longitude(&self) -> f64 {
        self.longitude
    }
}

/// A finalized session: points, statistics and detected runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    /// Unique identifier
    pub id: Uuid,
    /// Session name
    pub name: String,
    /// Annotated points in chronological order
    pub points: Vec<TrackPoint>,
    /// Session-wide statistics
    pub stats: Stats,
    /// Detected runs in chronological order
    pub runs: Vec<Run>,
    /// When the track was finalized
    pub created_at: DateTime<Utc>,
}

impl Track {
    /// Analyze `points` and build a finalized track.
    pub fn from_points(name: impl Into<String>, points: Vec<TrackPoint>, config: &AnalysisConfig) -> Self {
        let analysis = analyze(&points, config);
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            points: analysis.points,
            stats: analysis.stats,
            runs: analysis.runs,
            created_at: Utc::now(),
        }
    }

    /// Start time of the track, if it has any points.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.points.first().map(|p| p.timestamp)
    }
}
