//! Run detection: trend classification, raw segmentation, merging and filtering.

use crate::geo::{distance, rad_to_deg};
use crate::metrics::calculator::seconds_between;
use crate::metrics::smoothing::{Accumulator, HeartRateAccumulator};
use crate::metrics::types::{AnalysisConfig, Run};
use crate::track::TrackPoint;
use chrono::{DateTime, Utc};

/// A candidate descent before filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSegment {
    pub start_index: usize,
    pub end_index: usize,
    pub min_elevation: f64,
    pub max_elevation: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl RawSegment {
    fn open(points: &[TrackPoint], index: usize) -> Self {
        let p = &points[index];
        Self {
            start_index: index,
            end_index: index,
            min_elevation: p.elevation,
            max_elevation: p.elevation,
            start_time: p.timestamp,
            end_time: p.timestamp,
        }
    }

    fn extend_to(&mut self, points: &[TrackPoint], index: usize) {
        for p in &points[self.end_index + 1..=index] {
            self.min_elevation = self.min_elevation.min(p.elevation);
            self.max_elevation = self.max_elevation.max(p.elevation);
        }
        self.end_index = index;
        self.end_time = points[index].timestamp;
    }

    fn vertical_drop(&self) -> f64 {
        self.max_elevation - self.min_elevation
    }

    fn duration_s(&self) -> f64 {
        seconds_between(self.start_time, self.end_time)
    }
}

/// Detect runs in annotated points, given the smoothed elevation profile.
pub fn detect_runs(points: &[TrackPoint], smoothed: &[f64], config: &AnalysisConfig) -> Vec<Run> {
    if points.len() < 2 || smoothed.len() != points.len() {
        return Vec::new();
    }

    let flags = classify_trend(points, smoothed, config);
    let raw = segment(points, &flags, config);
    let merged = merge_segments(points, raw, config);
    finalize_runs(points, merged, config)
}

/// Mark each point "in descent" from the smoothed trend around it.
pub fn classify_trend(points: &[TrackPoint], smoothed: &[f64], config: &AnalysisConfig) -> Vec<bool> {
    let last = points.len() - 1;

    (0..points.len())
        .map(|i| {
            let back = smoothed[i.saturating_sub(config.trend_window)];
            let ahead = smoothed[(i + config.trend_window).min(last)];
            let speed = points[i].speed_kmh;

            let dropping = back - ahead > config.min_trend_drop_m;
            let plausible_speed =
                speed > config.min_descent_speed_kmh && speed < config.max_descent_speed_kmh;
            let riding_lift =
                speed < config.lift_speed_kmh && smoothed[i] - back > config.lift_rise_m;

            dropping && plausible_speed && !riding_lift
        })
        .collect()
}

/// Turn descent flags into raw segments.
///
/// A segment ends on its last flagged point once `close_tolerance` unflagged
/// points follow it, or at the end of the data.
pub fn segment(points: &[TrackPoint], flags: &[bool], config: &AnalysisConfig) -> Vec<RawSegment> {
    let mut segments = Vec::new();
    let mut current: Option<RawSegment> = None;
    let mut quiet = 0usize;

    for (i, &in_descent) in flags.iter().enumerate() {
        if in_descent {
            quiet = 0;
            match current.as_mut() {
                Some(seg) => seg.extend_to(points, i),
                None => current = Some(RawSegment::open(points, i)),
            }
        } else if current.is_some() {
            quiet += 1;
            if quiet >= config.close_tolerance {
                segments.extend(current.take());
                quiet = 0;
            }
        }
    }

    segments.extend(current);
    segments
}

/// Merge segments separated by a short, mostly flat gap.
pub fn merge_segments(
    points: &[TrackPoint],
    segments: Vec<RawSegment>,
    config: &AnalysisConfig,
) -> Vec<RawSegment> {
    let mut merged: Vec<RawSegment> = Vec::new();

    for next in segments {
        let Some(running) = merged.last_mut() else {
            merged.push(next);
            continue;
        };

        let gap = seconds_between(running.end_time, next.start_time);
        let gap_ascent = ascent_between(points, running.end_index, next.start_index);

        if gap > 0.0
            && gap < config.merge_max_gap_s
            && gap_ascent < config.merge_max_ascent_m
            && next.min_elevation <= running.max_elevation
        {
            running.extend_to(points, next.end_index);
        } else {
            merged.push(next);
        }
    }

    merged
}

/// Sum of positive elevation steps from `from` to `to`.
fn ascent_between(points: &[TrackPoint], from: usize, to: usize) -> f64 {
    if to <= from {
        return 0.0;
    }
    points[from..=to]
        .windows(2)
        .map(|pair| (pair[1].elevation - pair[0].elevation).max(0.0))
        .sum()
}

/// Drop short segments and compute run metrics for the rest.
pub fn finalize_runs(
    points: &[TrackPoint],
    segments: Vec<RawSegment>,
    config: &AnalysisConfig,
) -> Vec<Run> {
    segments
        .into_iter()
        .filter(|seg| {
            seg.end_index > seg.start_index
                && seg.vertical_drop() >= config.min_vertical_drop_m
                && seg.duration_s() >= config.min_duration_s
        })
        .enumerate()
        .map(|(n, seg)| build_run(points, &seg, n as u32 + 1, config))
        .collect()
}

fn build_run(points: &[TrackPoint], seg: &RawSegment, id: u32, config: &AnalysisConfig) -> Run {
    let range = &points[seg.start_index..=seg.end_index];

    let path: f64 = range.windows(2).map(|pair| distance(&pair[0], &pair[1])).sum();

    let mut speeds = Accumulator::new();
    let mut heart_rate = HeartRateAccumulator::default();
    for p in range {
        if config.is_valid_speed(p.speed_kmh) {
            speeds.add(p.speed_kmh);
        }
        heart_rate.add(p.heart_rate);
    }

    let vertical_drop = seg.vertical_drop();
    let first = &range[0];
    let last = &range[range.len() - 1];

    Run {
        id,
        start_index: seg.start_index,
        end_index: seg.end_index,
        distance_m: path,
        vertical_drop_m: vertical_drop,
        avg_speed_kmh: speeds.mean(),
        max_speed_kmh: speeds.max(),
        duration_s: seg.duration_s(),
        start_elevation_m: first.elevation,
        end_elevation_m: last.elevation,
        start_time: first.timestamp,
        end_time: last.timestamp,
        avg_slope_deg: rad_to_deg(vertical_drop.atan2(path)),
        avg_heart_rate: heart_rate.average(),
        max_heart_rate: heart_rate.max(),
    }
}
