//! Statistics, run and analysis configuration types.

use crate::track::TrackPoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session-wide statistics.
///
/// The `ski_*` fields cover only the points inside detected runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    /// Total path distance in meters
    pub total_distance_m: f64,
    /// Sum of positive elevation deltas in meters
    pub total_ascent_m: f64,
    /// Sum of negative elevation deltas in meters (positive number)
    pub total_descent_m: f64,
    /// Maximum valid speed in km/h
    pub max_speed_kmh: f64,
    /// Average of valid speeds in km/h
    pub avg_speed_kmh: f64,
    /// Lowest elevation in meters
    pub min_altitude_m: f64,
    /// Highest elevation in meters
    pub max_altitude_m: f64,
    /// Time from first to last point in seconds
    pub duration_s: f64,
    /// Average downhill slope in degrees
    pub avg_slope_deg: f64,
    /// Steepest downhill slope in degrees
    pub max_slope_deg: f64,
    /// Average heart rate in BPM
    pub avg_heart_rate: Option<f64>,
    /// Maximum heart rate in BPM
    pub max_heart_rate: Option<u8>,
    /// Number of detected runs
    pub run_count: usize,
    /// Distance covered inside runs in meters
    pub ski_distance_m: f64,
    /// Vertical drop summed over runs in meters
    pub ski_vertical_m: f64,
    /// Time spent inside runs in seconds
    pub ski_duration_s: f64,
    /// Average valid speed inside runs in km/h
    pub ski_avg_speed_kmh: f64,
    /// Maximum speed inside runs in km/h
    pub ski_max_speed_kmh: f64,
}

/// A contiguous, filtered descent segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// Sequential id starting at 1
    pub id: u32,
    /// Index of the first point of the run
    pub start_index: usize,
    /// Index of the last point of the run
    pub end_index: usize,
    /// Path distance in meters
    pub distance_m: f64,
    /// Highest minus lowest elevation in meters
    pub vertical_drop_m: f64,
    /// Average valid speed in km/h
    pub avg_speed_kmh: f64,
    /// Maximum valid speed in km/h
    pub max_speed_kmh: f64,
    /// Duration in seconds
    pub duration_s: f64,
    /// Elevation at the first point
    pub start_elevation_m: f64,
    /// Elevation at the last point
    pub end_elevation_m: f64,
    /// Time of the first point
    pub start_time: DateTime<Utc>,
    /// Time of the last point
    pub end_time: DateTime<Utc>,
    /// atan2(vertical drop, distance) in degrees
    pub avg_slope_deg: f64,
    /// Average heart rate in BPM
    pub avg_heart_rate: Option<f64>,
    /// Maximum heart rate in BPM
    pub max_heart_rate: Option<u8>,
}

/// Tuning constants for speed smoothing and run detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Points spanned by the smoothed speed window; values below 2 act as 2
    pub speed_window: usize,
    /// Points in the centered elevation moving average
    pub elevation_window: usize,
    /// Points looked back and ahead when classifying the trend
    pub trend_window: usize,
    /// Minimum smoothed drop across the trend span in meters
    pub min_trend_drop_m: f64,
    /// Lower bound (exclusive) of plausible skiing speed in km/h
    pub min_descent_speed_kmh: f64,
    /// Upper bound (exclusive) of plausible skiing speed in km/h
    pub max_descent_speed_kmh: f64,
    /// Below this speed a rising point looks like a lift ride
    pub lift_speed_kmh: f64,
    /// Rise over the back elevation that marks a lift ride in meters
    pub lift_rise_m: f64,
    /// Consecutive non-descending points that close a segment
    pub close_tolerance: usize,
    /// Largest time gap bridged when merging segments in seconds
    pub merge_max_gap_s: f64,
    /// Largest ascent tolerated inside a merge gap in meters
    pub merge_max_ascent_m: f64,
    /// Minimum vertical drop of a run in meters
    pub min_vertical_drop_m: f64,
    /// Minimum duration of a run in seconds
    pub min_duration_s: f64,
    /// Speeds at or above this are GPS outliers in km/h
    pub max_valid_speed_kmh: f64,
    /// Drop between consecutive points that counts as descending in meters
    pub descending_min_drop_m: f64,
    /// Instant speed above which a dropping point counts as descending
    pub descending_min_speed_kmh: f64,
    /// Horizontal distance needed before a slope is accumulated in meters
    pub min_slope_distance_m: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            speed_window: 5,
            elevation_window: 5,
            trend_window: 20,
            min_trend_drop_m: 10.0,
            min_descent_speed_kmh: 5.0,
            max_descent_speed_kmh: 120.0,
            lift_speed_kmh: 15.0,
            lift_rise_m: 2.0,
            close_tolerance: 15,
            merge_max_gap_s: 120.0,
            merge_max_ascent_m: 50.0,
            min_vertical_drop_m: 30.0,
            min_duration_s: 60.0,
            max_valid_speed_kmh: 150.0,
            descending_min_drop_m: 0.5,
            descending_min_speed_kmh: 3.0,
            min_slope_distance_m: 1.0,
        }
    }
}

impl AnalysisConfig {
    /// Whether a speed should feed speed accumulators.
    pub fn is_valid_speed(&self, speed_kmh: f64) -> bool {
        speed_kmh > 0.0 && speed_kmh < self.max_valid_speed_kmh
    }
}

/// Output of the statistics and segmentation engine.
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    /// Input points with derived fields filled in
    pub points: Vec<TrackPoint>,
    /// Session statistics
    pub stats: Stats,
    /// Detected runs
    pub runs: Vec<Run>,
}
