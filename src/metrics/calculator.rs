//! Statistics engine: derived point metrics, session totals and ski aggregates.
//!
//! [`analyze`] is a pure function of its input. It runs two passes over the
//! points (pairwise totals, then windowed speed/slope) and hands the annotated
//! points to run detection.

use crate::geo::{distance, rad_to_deg};
use crate::metrics::segments::detect_runs;
use crate::metrics::smoothing::{
    centered_moving_average, speed_kmh, Accumulator, HeartRateAccumulator,
};
use crate::metrics::types::{Analysis, AnalysisConfig, Run, Stats};
use crate::track::TrackPoint;
use chrono::{DateTime, Utc};

/// Seconds from `from` to `to` with millisecond resolution.
pub fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

/// Compute statistics and runs for a point sequence.
pub fn analyze(points: &[TrackPoint], config: &AnalysisConfig) -> Analysis {
    if points.is_empty() {
        return Analysis::default();
    }

    let mut points = points.to_vec();
    let mut stats = Stats::default();

    pairwise_pass(&mut points, &mut stats);
    windowed_pass(&mut points, &mut stats, config);

    let elevations: Vec<f64> = points.iter().map(|p| p.elevation).collect();
    let smoothed = centered_moving_average(&elevations, config.elevation_window);
    let runs = detect_runs(&points, &smoothed, config);

    ski_aggregates(&points, &runs, &mut stats, config);

    Analysis {
        points,
        stats,
        runs,
    }
}

/// Pass 1: distance, cumulative distance, ascent/descent, altitude and duration.
fn pairwise_pass(points: &mut [TrackPoint], stats: &mut Stats) {
    let mut total = 0.0;
    let mut min_alt = points[0].elevation;
    let mut max_alt = points[0].elevation;

    points[0].cumulative_distance_m = 0.0;

    for i in 1..points.len() {
        let step = distance(&points[i - 1], &points[i]);
        total += step;
        points[i].cumulative_distance_m = total;

        let delta = points[i].elevation - points[i - 1].elevation;
        if delta > 0.0 {
            stats.total_ascent_m += delta;
        } else {
            stats.total_descent_m -= delta;
        }

        min_alt = min_alt.min(points[i].elevation);
        max_alt = max_alt.max(points[i].elevation);
    }

    stats.total_distance_m = total;
    stats.min_altitude_m = min_alt;
    stats.max_altitude_m = max_alt;
    stats.duration_s = seconds_between(points[0].timestamp, points[points.len() - 1].timestamp);
}

/// Pass 2: instantaneous and smoothed speed, slope, descending flag and heart rate.
fn windowed_pass(points: &mut [TrackPoint], stats: &mut Stats, config: &AnalysisConfig) {
    // A window spans at least the previous point
    let window = config.speed_window.max(2);
    let mut speeds = Accumulator::new();
    let mut slopes = Accumulator::new();
    let mut heart_rate = HeartRateAccumulator::default();

    let first_speed = points[0].reported_speed_kmh.unwrap_or(0.0);
    points[0].instant_speed_kmh = first_speed;
    points[0].speed_kmh = first_speed;
    if config.is_valid_speed(first_speed) {
        speeds.add(first_speed);
    }
    heart_rate.add(points[0].heart_rate);

    for i in 1..points.len() {
        let prev = &points[i - 1];
        let cur = &points[i];

        let step = cur.cumulative_distance_m - prev.cumulative_distance_m;
        let dt = seconds_between(prev.timestamp, cur.timestamp);
        let instant = cur.reported_speed_kmh.unwrap_or_else(|| speed_kmh(step, dt));

        let smoothed = match cur.reported_speed_kmh {
            Some(reported) => reported,
            None if i < window => instant,
            None => {
                let from = &points[i + 1 - window];
                speed_kmh(
                    cur.cumulative_distance_m - from.cumulative_distance_m,
                    seconds_between(from.timestamp, cur.timestamp),
                )
            }
        };

        // Positive slope means downhill.
        let drop = prev.elevation - cur.elevation;
        let slope = rad_to_deg(drop.atan2(step));
        if slope > 0.0 && step > config.min_slope_distance_m {
            slopes.add(slope);
        }

        let descending =
            drop > config.descending_min_drop_m && instant > config.descending_min_speed_kmh;

        if config.is_valid_speed(smoothed) {
            speeds.add(smoothed);
        }
        heart_rate.add(cur.heart_rate);

        let point = &mut points[i];
        point.instant_speed_kmh = instant;
        point.speed_kmh = smoothed;
        point.slope_deg = slope;
        point.descending = descending;
    }

    stats.max_speed_kmh = speeds.max();
    stats.avg_speed_kmh = speeds.mean();
    stats.avg_slope_deg = slopes.mean();
    stats.max_slope_deg = slopes.max();
    stats.avg_heart_rate = heart_rate.average();
    stats.max_heart_rate = heart_rate.max();
}

/// Ski-only aggregates over exactly the run ranges.
fn ski_aggregates(points: &[TrackPoint], runs: &[Run], stats: &mut Stats, config: &AnalysisConfig) {
    let mut speeds = Accumulator::new();

    for run in runs {
        stats.ski_distance_m += run.distance_m;
        stats.ski_vertical_m += run.vertical_drop_m;
        stats.ski_duration_s += run.duration_s;

        for point in &points[run.start_index..=run.end_index] {
            if config.is_valid_speed(point.speed_kmh) {
                speeds.add(point.speed_kmh);
            }
        }
    }

    stats.run_count = runs.len();
    stats.ski_avg_speed_kmh = speeds.mean();
    stats.ski_max_speed_kmh = speeds.max();
}
