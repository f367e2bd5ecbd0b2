//! Synthetic trace builders shared by the unit tests.

use chrono::{DateTime, Duration, TimeZone, Utc};
use slopetrace::TrackPoint;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 10, 9, 0, 0).unwrap()
}

/// Appends points to a trace, moving north at a fixed pace.
pub struct TraceBuilder {
    points: Vec<TrackPoint>,
    latitude: f64,
    elevation: f64,
    time: DateTime<Utc>,
}

impl TraceBuilder {
    pub fn new(elevation: f64) -> Self {
        Self {
            points: Vec::new(),
            latitude: 46.0,
            elevation,
            time: t0(),
        }
    }

    /// `count` samples, `every_s` apart, each moving `lat_step` degrees north
    /// and changing elevation by `ele_step` meters.
    pub fn leg(mut self, count: usize, every_s: i64, lat_step: f64, ele_step: f64) -> Self {
        for _ in 0..count {
            self.points
                .push(TrackPoint::new(self.latitude, 7.5, self.elevation, self.time));
            self.latitude += lat_step;
            self.elevation += ele_step;
            self.time += Duration::seconds(every_s);
        }
        self
    }

    /// Descent at roughly 20 km/h losing `drop_per_sample` every 2 s.
    pub fn descent(self, count: usize, drop_per_sample: f64) -> Self {
        self.leg(count, 2, 0.0001, -drop_per_sample)
    }

    /// Chairlift at roughly 3.6 km/h gaining 2 m every 4 s.
    pub fn lift(self, count: usize) -> Self {
        self.leg(count, 4, 0.000036, 2.0)
    }

    pub fn build(self) -> Vec<TrackPoint> {
        self.points
    }
}

/// Two runs separated by a long lift ride.
pub fn two_run_day() -> Vec<TrackPoint> {
    TraceBuilder::new(2400.0)
        .descent(120, 1.5)
        .lift(150)
        .descent(100, 2.0)
        .build()
}
