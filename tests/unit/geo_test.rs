//! Unit tests for great-circle distance

use slopetrace::geo::{deg_to_rad, distance, haversine_distance, rad_to_deg};

const PLACES: [(f64, f64); 5] = [
    (45.9763, 7.6586),   // Zermatt
    (46.0207, 7.7491),   // Gornergrat
    (45.9237, 6.8694),   // Chamonix
    (-33.4489, -70.6693),
    (0.0, 179.9999),
];

#[test]
fn test_distance_to_self_is_zero() {
    for p in PLACES {
        assert_eq!(distance(&p, &p), 0.0);
    }
}

#[test]
fn test_distance_is_symmetric() {
    for a in PLACES {
        for b in PLACES {
            assert_eq!(distance(&a, &b), distance(&b, &a));
        }
    }
}

#[test]
fn test_known_distance() {
    // Zermatt to Chamonix is roughly 62 km as the crow flies
    let d = haversine_distance(45.9763, 7.6586, 45.9237, 6.8694);
    assert!((d - 61_300.0).abs() < 1_500.0, "got {}", d);
}

#[test]
fn test_antimeridian_is_short() {
    let d = haversine_distance(0.0, 179.9999, 0.0, -179.9999);
    assert!(d < 30.0, "got {}", d);
}

#[test]
fn test_angle_conversions_are_inverse() {
    for deg in [-180.0, -45.5, 0.0, 12.25, 90.0] {
        assert!((rad_to_deg(deg_to_rad(deg)) - deg).abs() < 1e-12);
    }
}
