//! GPX reader.
//!
//! Streams the document with `quick-xml` so that heart rate and speed can be
//! picked out of vendor `<extensions>` blocks regardless of namespace prefix.

use super::{ImportError, ParsedTrack};
use crate::metrics::AnalysisConfig;
use crate::track::{Track, TrackPoint, UNNAMED_TRACK};
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

/// Extension tag names (lowercased, prefix stripped) that carry heart rate.
const HEART_RATE_TAGS: &[&str] = &["hr", "heartrate", "heart_rate", "heartratebpm"];

/// Point fields collected between a `<trkpt>` start and end tag.
#[derive(Debug)]
struct PendingPoint {
    latitude: f64,
    longitude: f64,
    elevation: Option<f64>,
    timestamp: Option<DateTime<Utc>>,
    heart_rate: Option<u8>,
    speed_mps: Option<f64>,
}

impl PendingPoint {
    fn from_element(element: &BytesStart<'_>) -> Result<Self, ImportError> {
        let mut lat = None;
        let mut lon = None;

        for attr in element.attributes() {
            let attr = attr.map_err(|e| ImportError::ParseError(format!("Bad attribute: {}", e)))?;
            let value = attr
                .unescape_value()
                .map_err(|e| ImportError::ParseError(format!("Bad attribute value: {}", e)))?;
            match attr.key.local_name().as_ref() {
                b"lat" => lat = value.trim().parse::<f64>().ok(),
                b"lon" => lon = value.trim().parse::<f64>().ok(),
                _ => {}
            }
        }

        match (lat, lon) {
            (Some(latitude), Some(longitude)) => Ok(Self {
                latitude,
                longitude,
                elevation: None,
                timestamp: None,
                heart_rate: None,
                speed_mps: None,
            }),
            _ => Err(ImportError::ParseError(
                "Point is missing a valid lat/lon".to_string(),
            )),
        }
    }

    fn into_point(self, fallback_time: DateTime<Utc>) -> TrackPoint {
        TrackPoint::new(
            self.latitude,
            self.longitude,
            self.elevation.unwrap_or(0.0),
            self.timestamp.unwrap_or(fallback_time),
        )
        .with_heart_rate(self.heart_rate)
        .with_reported_speed(self.speed_mps.map(|s| s * 3.6))
    }
}

fn local_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.local_name().as_ref()).into_owned()
}

fn parse_time(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_heart_rate(text: &str) -> Option<u8> {
    let value: f64 = text.trim().parse().ok()?;
    (value.is_finite() && value > 0.0).then(|| value.round().min(255.0) as u8)
}

fn is_point_tag(name: &str) -> bool {
    name == "trkpt" || name == "rtept"
}

/// Parse GPX text into points and a session name.
///
/// Track points are preferred; route points are used when the document has no
/// tracks. Points keep document order.
pub fn parse_gpx(text: &str) -> Result<ParsedTrack, ImportError> {
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let fallback_time = Utc::now();
    let mut track_points = Vec::new();
    let mut route_points = Vec::new();
    let mut track_name: Option<String> = None;
    let mut route_name: Option<String> = None;
    let mut metadata_name: Option<String> = None;

    let mut path: Vec<String> = Vec::new();
    let mut pending: Option<(String, PendingPoint)> = None;
    let mut missing_time = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = local_name(&e);
                if is_point_tag(&name) {
                    pending = Some((name.clone(), PendingPoint::from_element(&e)?));
                }
                path.push(name);
            }
            Ok(Event::Empty(e)) => {
                let name = local_name(&e);
                if is_point_tag(&name) {
                    let point = PendingPoint::from_element(&e)?;
                    missing_time += 1;
                    let target = if name == "trkpt" {
                        &mut track_points
                    } else {
                        &mut route_points
                    };
                    target.push(point.into_point(fallback_time));
                }
            }
            Ok(Event::Text(t)) => {
                let value = t
                    .unescape()
                    .map_err(|e| ImportError::ParseError(format!("GPX parse error: {}", e)))?;
                let Some(element) = path.last() else {
                    continue;
                };
                let element = element.to_lowercase();

                if let Some((_, point)) = pending.as_mut() {
                    let in_extensions = path.iter().any(|p| p == "extensions");
                    match element.as_str() {
                        "ele" => point.elevation = value.trim().parse().ok(),
                        "time" => point.timestamp = parse_time(&value),
                        "speed" => point.speed_mps = value.trim().parse().ok(),
                        tag if in_extensions && HEART_RATE_TAGS.contains(&tag) => {
                            point.heart_rate = parse_heart_rate(&value);
                        }
                        _ => {}
                    }
                } else if element == "name" && path.len() >= 2 {
                    let name = value.trim().to_string();
                    match path[path.len() - 2].as_str() {
                        "trk" if track_name.is_none() => track_name = Some(name),
                        "rte" if route_name.is_none() => route_name = Some(name),
                        "metadata" if metadata_name.is_none() => metadata_name = Some(name),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if is_point_tag(&name) {
                    if let Some((tag, point)) = pending.take() {
                        if point.timestamp.is_none() {
                            missing_time += 1;
                        }
                        let target = if tag == "trkpt" {
                            &mut track_points
                        } else {
                            &mut route_points
                        };
                        target.push(point.into_point(fallback_time));
                    }
                }
                path.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ImportError::ParseError(format!(
                    "GPX parse error at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    let points = if track_points.is_empty() {
        route_points
    } else {
        track_points
    };

    if points.is_empty() {
        return Err(ImportError::ParseError(
            "No GPS points found in GPX file".to_string(),
        ));
    }

    if missing_time > 0 {
        tracing::warn!(
            "{} GPX points had no timestamp, using import time instead",
            missing_time
        );
    }

    let name = track_name
        .or(route_name)
        .or(metadata_name)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| UNNAMED_TRACK.to_string());

    Ok(ParsedTrack { name, points })
}

/// Read a GPX document into a finalized track with default analysis settings.
pub fn read_gpx(text: &str) -> Result<Track, ImportError> {
    read_gpx_with(text, &AnalysisConfig::default())
}

/// Read a GPX document into a finalized track.
pub fn read_gpx_with(text: &str, config: &AnalysisConfig) -> Result<Track, ImportError> {
    Ok(parse_gpx(text)?.finalize(config))
}
