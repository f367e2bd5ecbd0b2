//! Unit tests for FIT file parsing
//!
//! Edge cases are built from already-decoded records; the recordings under
//! `tests/unit/fixtures/` cover decoding of real device files.

use chrono::{TimeZone, Utc};
use slopetrace::import::fit::{extract_points, parse_fit, to_degrees, DecodedRecord, FieldValue};
use slopetrace::read_fit;

fn semicircles(degrees: f64) -> FieldValue {
    FieldValue::Int((degrees * 2_147_483_648.0 / 180.0).round() as i64)
}

fn record(lat: f64, lon: f64, seconds: i64) -> DecodedRecord {
    DecodedRecord::new("record")
        .with("position_lat", semicircles(lat))
        .with("position_long", semicircles(lon))
        .with(
            "timestamp",
            FieldValue::Time(Utc.with_ymd_and_hms(2024, 2, 10, 9, 0, 0).unwrap()
                + chrono::Duration::seconds(seconds)),
        )
}

#[test]
fn test_parse_fit_empty() {
    assert!(parse_fit(&[]).is_err());
}

#[test]
fn test_parse_fit_invalid_header() {
    assert!(read_fit(b"not a valid FIT file header").is_err());
}

#[test]
fn test_semicircle_conversion() {
    assert!((to_degrees(536_870_912.0) - 45.0).abs() < 1e-9);
    assert_eq!(to_degrees(45.5), 45.5);
    assert_eq!(to_degrees(-179.0), -179.0);
}

#[test]
fn test_no_positions_reports_scan_count() {
    let records = vec![
        DecodedRecord::new("file_id"),
        DecodedRecord::new("record").with("heart_rate", FieldValue::Int(120)),
        DecodedRecord::new("record").with("heart_rate", FieldValue::Int(121)),
    ];
    let err = extract_points(&records).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("No GPS records found"), "{}", message);
    assert!(message.contains("3 records scanned"), "{}", message);
}

#[test]
fn test_fields_and_preferences() {
    let records = vec![
        record(46.0, 7.5, 0)
            .with("altitude", FieldValue::Float(2000.0))
            .with("enhanced_altitude", FieldValue::Float(2001.5))
            .with("heart_rate", FieldValue::Int(0))
            .with("speed", FieldValue::Float(3.0))
            .with("enhanced_speed", FieldValue::Float(5.0)),
        record(46.0001, 7.5, 2).with("altitude", FieldValue::Float(1999.0)),
    ];

    let parsed = extract_points(&records).unwrap();
    assert_eq!(parsed.points.len(), 2);

    let first = &parsed.points[0];
    assert!((first.latitude - 46.0).abs() < 1e-6);
    assert_eq!(first.elevation, 2001.5);
    assert_eq!(first.heart_rate, None);
    assert!((first.reported_speed_kmh.unwrap() - 18.0).abs() < 1e-9);

    assert_eq!(parsed.points[1].elevation, 1999.0);
    assert_eq!(parsed.points[1].reported_speed_kmh, None);
}

#[test]
fn test_output_sorted_and_invalid_dropped() {
    let records = vec![
        record(46.0002, 7.5, 4),
        record(46.0, 7.5, 0),
        DecodedRecord::new("record")
            .with("position_lat", FieldValue::Float(95.0))
            .with("position_long", FieldValue::Float(7.5)),
        record(46.0001, 7.5, 2),
    ];

    let parsed = extract_points(&records).unwrap();
    assert_eq!(parsed.points.len(), 3);
    for pair in parsed.points.windows(2) {
        assert!(pair[0].timestamp <= pair[1].timestamp);
    }
}

#[test]
fn test_other_group_used_when_records_have_no_position() {
    let records = vec![
        DecodedRecord::new("record").with("heart_rate", FieldValue::Int(120)),
        DecodedRecord::new("lap"),
        DecodedRecord::new("gps_metadata")
            .with("position_lat", FieldValue::Float(46.0))
            .with("position_long", FieldValue::Float(7.5))
            .with("timestamp", FieldValue::Int(1_707_555_600_000)),
    ];

    let parsed = extract_points(&records).unwrap();
    assert_eq!(parsed.points.len(), 1);
    assert_eq!(parsed.points[0].timestamp.timestamp(), 1_707_555_600);
}

#[test]
fn test_session_sport_names_track() {
    let records = vec![
        record(46.0, 7.5, 0),
        DecodedRecord::new("session").with("sport", FieldValue::Text("alpine_skiing".to_string())),
    ];
    assert_eq!(extract_points(&records).unwrap().name, "Alpine Skiing");

    let unnamed = vec![record(46.0, 7.5, 0)];
    assert_eq!(extract_points(&unnamed).unwrap().name, "Unnamed Track");
}

fn fixture(name: &str) -> Vec<u8> {
    std::fs::read(format!("tests/unit/fixtures/{}", name)).expect("Failed to read fixture")
}

#[test]
fn test_decode_fenix_bike_file() {
    let parsed = parse_fit(&fixture("fenix5_bike.fit")).unwrap();

    assert_eq!(parsed.name, "Bike");
    assert_eq!(parsed.points.len(), 19);

    let first = &parsed.points[0];
    assert!((first.latitude - 37.411).abs() < 0.001, "{}", first.latitude);
    assert!((first.longitude + 122.069).abs() < 0.001, "{}", first.longitude);
    assert_eq!(first.elevation, 0.0);
    assert_eq!(first.heart_rate, Some(77));

    for pair in parsed.points.windows(2) {
        assert!(pair[0].timestamp <= pair[1].timestamp);
    }
}

#[test]
fn test_decode_running_file() {
    let parsed = parse_fit(&fixture("running.fit")).unwrap();

    assert_eq!(parsed.name, "Running");
    assert_eq!(parsed.points.len(), 14);

    let first = &parsed.points[0];
    assert!((first.latitude - 41.513).abs() < 0.001, "{}", first.latitude);
    assert!((first.longitude + 73.148).abs() < 0.001, "{}", first.longitude);
    assert!((first.elevation - 278.2).abs() < 0.05, "{}", first.elevation);
    assert_eq!(first.heart_rate, None);

    for pair in parsed.points.windows(2) {
        assert!(pair[0].timestamp <= pair[1].timestamp);
    }
}

#[test]
fn test_read_fit_analyzes_real_file() {
    let track = read_fit(&fixture("running.fit")).unwrap();
    assert_eq!(track.points.len(), 14);
    assert!(track.stats.total_distance_m > 0.0);
    assert!(track.stats.duration_s > 0.0);
    assert_eq!(track.points[0].cumulative_distance_m, 0.0);
}
