//! Unit tests for the statistics and run detection engine

use super::trace_builder::{t0, two_run_day, TraceBuilder};
use chrono::Duration;
use slopetrace::{analyze, AnalysisConfig, TrackPoint};

#[test]
fn test_cumulative_distance_is_monotonic() {
    let analysis = analyze(&two_run_day(), &AnalysisConfig::default());

    assert_eq!(analysis.points[0].cumulative_distance_m, 0.0);
    for pair in analysis.points.windows(2) {
        assert!(pair[1].cumulative_distance_m >= pair[0].cumulative_distance_m);
    }
    let last = analysis.points.last().unwrap();
    assert!((last.cumulative_distance_m - analysis.stats.total_distance_m).abs() < 1e-6);
}

#[test]
fn test_two_runs_split_by_lift() {
    let analysis = analyze(&two_run_day(), &AnalysisConfig::default());

    assert_eq!(analysis.runs.len(), 2);
    assert_eq!(analysis.stats.run_count, 2);

    for (i, run) in analysis.runs.iter().enumerate() {
        assert_eq!(run.id, i as u32 + 1);
        assert!(run.end_index > run.start_index);
        assert!(run.vertical_drop_m >= 30.0);
        assert!(run.duration_s >= 60.0);
        assert!(run.start_elevation_m > run.end_elevation_m);
        assert!(run.avg_slope_deg > 0.0);
    }

    // Second run starts after the lift
    assert!(analysis.runs[1].start_index > 120 + 150 - 1);
    assert!(analysis.runs[0].end_index < 120);
}

#[test]
fn test_ski_aggregates_cover_runs_only() {
    let analysis = analyze(&two_run_day(), &AnalysisConfig::default());
    let stats = &analysis.stats;

    let distance: f64 = analysis.runs.iter().map(|r| r.distance_m).sum();
    let vertical: f64 = analysis.runs.iter().map(|r| r.vertical_drop_m).sum();
    let duration: f64 = analysis.runs.iter().map(|r| r.duration_s).sum();

    assert!((stats.ski_distance_m - distance).abs() < 1e-6);
    assert!((stats.ski_vertical_m - vertical).abs() < 1e-6);
    assert!((stats.ski_duration_s - duration).abs() < 1e-6);

    // The lift is part of the session but not of skiing
    assert!(stats.ski_distance_m < stats.total_distance_m);
    assert!(stats.ski_duration_s < stats.duration_s);
    assert!(stats.total_ascent_m > 250.0);
    assert!(stats.ski_max_speed_kmh <= stats.max_speed_kmh);
}

#[test]
fn test_fifty_sample_descent_is_one_run() {
    let points: Vec<TrackPoint> = (0..50)
        .map(|i| {
            TrackPoint::new(
                46.0 + i as f64 * 0.0001,
                7.5,
                2000.0 - i as f64 * 2.0,
                t0() + Duration::seconds(i * 2),
            )
            .with_reported_speed(Some(20.0))
        })
        .collect();

    let analysis = analyze(&points, &AnalysisConfig::default());

    assert_eq!(analysis.runs.len(), 1);
    let run = &analysis.runs[0];
    assert!(run.vertical_drop_m >= 98.0, "drop {}", run.vertical_drop_m);
    assert!(run.duration_s >= 98.0, "duration {}", run.duration_s);
    assert_eq!(run.max_speed_kmh, 20.0);
}

#[test]
fn test_flat_scenario() {
    let points = vec![
        TrackPoint::new(45.000, 7.000, 1000.0, t0()),
        TrackPoint::new(45.001, 7.001, 1000.0, t0() + Duration::seconds(30)),
        TrackPoint::new(45.002, 7.002, 1000.0, t0() + Duration::seconds(60)),
    ];
    let stats = analyze(&points, &AnalysisConfig::default()).stats;

    assert_eq!(stats.duration_s, 60.0);
    assert_eq!(stats.total_ascent_m, 0.0);
    assert_eq!(stats.total_descent_m, 0.0);
    assert_eq!(stats.run_count, 0);
}

#[test]
fn test_short_stop_keeps_one_run() {
    let points = TraceBuilder::new(2400.0)
        .descent(60, 1.5)
        .leg(6, 5, 0.0, 0.0)
        .descent(60, 1.5)
        .build();

    let analysis = analyze(&points, &AnalysisConfig::default());
    assert_eq!(analysis.runs.len(), 1);
    assert!(analysis.runs[0].vertical_drop_m > 120.0);
}

#[test]
fn test_small_drop_is_not_a_run() {
    let points = TraceBuilder::new(1500.0)
        .leg(20, 2, 0.0001, 0.0)
        .descent(10, 1.5)
        .leg(20, 2, 0.0001, 0.0)
        .build();

    let analysis = analyze(&points, &AnalysisConfig::default());
    assert!(analysis.runs.is_empty());
    assert_eq!(analysis.stats.ski_distance_m, 0.0);
    assert_eq!(analysis.stats.ski_avg_speed_kmh, 0.0);
}

#[test]
fn test_thresholds_come_from_config() {
    let strict = AnalysisConfig {
        min_vertical_drop_m: 250.0,
        ..Default::default()
    };
    let analysis = analyze(&two_run_day(), &strict);
    assert!(analysis.runs.is_empty());
}

#[test]
fn test_analysis_is_deterministic() {
    let points = two_run_day();
    let a = analyze(&points, &AnalysisConfig::default());
    let b = analyze(&points, &AnalysisConfig::default());
    assert_eq!(a.stats, b.stats);
    assert_eq!(a.runs, b.runs);
}
