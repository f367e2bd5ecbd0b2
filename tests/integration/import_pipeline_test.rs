//! Integration tests for importing files into the track store

use slopetrace::import::{detect_format, import_file, FileFormat, ImportError};
use slopetrace::storage::{list_tracks, load_track, save_track, Database, TrackStore};
use slopetrace::AnalysisConfig;
use std::path::Path;
use std::sync::Mutex;

/// One straight descent: 150 points two seconds apart, 1.5 m lower each time.
fn descent_gpx() -> String {
    let mut gpx = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <trk>
    <name>Saturday Laps</name>
    <trkseg>
"#,
    );
    for i in 0..150 {
        let seconds = i * 2;
        gpx.push_str(&format!(
            "      <trkpt lat=\"{:.6}\" lon=\"7.500000\"><ele>{:.1}</ele><time>2024-02-10T09:{:02}:{:02}Z</time></trkpt>\n",
            46.0 + i as f64 * 0.0001,
            2400.0 - i as f64 * 1.5,
            seconds / 60,
            seconds % 60,
        ));
    }
    gpx.push_str("    </trkseg>\n  </trk>\n</gpx>\n");
    gpx
}

#[test]
fn test_import_and_store_gpx() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("laps.GPX");
    std::fs::write(&file, descent_gpx()).unwrap();

    let track = import_file(&file, &AnalysisConfig::default()).unwrap();
    assert_eq!(track.name, "Saturday Laps");
    assert_eq!(track.points.len(), 150);
    assert_eq!(track.stats.duration_s, 298.0);
    assert!((track.stats.total_descent_m - 223.5).abs() < 1e-6);
    assert_eq!(track.stats.total_ascent_m, 0.0);
    assert_eq!(track.stats.run_count, 1);
    assert_eq!(track.runs.len(), 1);

    let store = Mutex::new(Database::open(&dir.path().join("tracks.db")).unwrap());
    let key = save_track(&store, &track).unwrap();
    assert_eq!(key, "track/Saturday Laps");

    let names = list_tracks(&store).unwrap();
    assert_eq!(names, vec!["Saturday Laps".to_string()]);

    let loaded = load_track(&store, &key).unwrap().unwrap();
    assert_eq!(loaded.id, track.id);
    assert_eq!(loaded.stats, track.stats);
    assert_eq!(loaded.runs, track.runs);
}

#[test]
fn test_saving_same_name_keeps_both() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("laps.gpx");
    std::fs::write(&file, descent_gpx()).unwrap();
    let store = Mutex::new(Database::open_in_memory().unwrap());

    let first = import_file(&file, &AnalysisConfig::default()).unwrap();
    let second = import_file(&file, &AnalysisConfig::default()).unwrap();
    save_track(&store, &first).unwrap();
    let key = save_track(&store, &second).unwrap();
    assert_eq!(key, "track/Saturday Laps (2)");

    let mut names = list_tracks(&store).unwrap();
    names.sort();
    assert_eq!(
        names,
        vec!["Saturday Laps".to_string(), "Saturday Laps (2)".to_string()]
    );
    assert_eq!(store.list("track/").unwrap().len(), 2);

    let original = load_track(&store, "Saturday Laps").unwrap().unwrap();
    assert_eq!(original.id, first.id);
    let copy = load_track(&store, &key).unwrap().unwrap();
    assert_eq!(copy.id, second.id);
}

#[test]
fn test_detect_format() {
    assert_eq!(detect_format(Path::new("a/b/day.gpx")).unwrap(), FileFormat::Gpx);
    assert_eq!(detect_format(Path::new("day.Fit")).unwrap(), FileFormat::Fit);
    assert!(matches!(
        detect_format(Path::new("day.tcx")),
        Err(ImportError::InvalidFormat(_))
    ));
    assert!(matches!(
        detect_format(Path::new("no_extension")),
        Err(ImportError::InvalidFormat(_))
    ));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nowhere.gpx");
    assert!(matches!(
        import_file(&missing, &AnalysisConfig::default()),
        Err(ImportError::FileNotFound(_))
    ));
}

#[test]
fn test_corrupt_fit_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("watch.fit");
    std::fs::write(&file, b"\x0e\x10garbage").unwrap();
    assert!(import_file(&file, &AnalysisConfig::default()).is_err());
}
