//! FIT reader.
//!
//! Decoding is done by `fitparser`; its messages are flattened into
//! [`DecodedRecord`]s so point extraction does not depend on the decoder's
//! value types.

use super::{ImportError, ParsedTrack};
use crate::metrics::AnalysisConfig;
use crate::track::{Track, TrackPoint, UNNAMED_TRACK};
use chrono::{DateTime, TimeZone, Utc};

/// Message groups checked for positions before any other group.
const KNOWN_POSITION_GROUPS: &[&str] = &["record"];

/// Semicircles per 180 degrees (2^31).
const SEMICIRCLES_PER_180: f64 = 2_147_483_648.0;

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Text(String),
    Time(DateTime<Utc>),
}

impl FieldValue {
    fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::Float(v) if v.is_finite() => Some(*v),
            _ => None,
        }
    }
}

/// One decoded message: its kind and named fields.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    /// Message kind in lowercase (`record`, `session`, ...)
    pub kind: String,
    pub fields: Vec<(String, FieldValue)>,
}

impl DecodedRecord {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: Vec::new(),
        }
    }

    /// Builder used by tests and adapters.
    pub fn with(mut self, name: &str, value: FieldValue) -> Self {
        self.fields.push((name.to_string(), value));
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    fn number(&self, name: &str) -> Option<f64> {
        self.field(name).and_then(FieldValue::as_f64)
    }

    fn has_position(&self) -> bool {
        self.field("position_lat").is_some() && self.field("position_long").is_some()
    }
}

fn convert_value(value: &fitparser::Value) -> Option<FieldValue> {
    use fitparser::Value;

    let converted = match value {
        Value::Timestamp(t) => FieldValue::Time(t.with_timezone(&Utc)),
        Value::Byte(v) | Value::Enum(v) | Value::UInt8(v) | Value::UInt8z(v) => {
            FieldValue::Int(*v as i64)
        }
        Value::SInt8(v) => FieldValue::Int(*v as i64),
        Value::SInt16(v) => FieldValue::Int(*v as i64),
        Value::UInt16(v) | Value::UInt16z(v) => FieldValue::Int(*v as i64),
        Value::SInt32(v) => FieldValue::Int(*v as i64),
        Value::UInt32(v) | Value::UInt32z(v) => FieldValue::Int(*v as i64),
        Value::SInt64(v) => FieldValue::Int(*v),
        Value::Float32(v) => FieldValue::Float(*v as f64),
        Value::Float64(v) => FieldValue::Float(*v),
        Value::String(s) => FieldValue::Text(s.clone()),
        _ => return None,
    };
    Some(converted)
}

/// Decode FIT bytes into flattened records.
pub fn decode(content: &[u8]) -> Result<Vec<DecodedRecord>, ImportError> {
    let fit_data = fitparser::from_bytes(content)
        .map_err(|e| ImportError::ParseError(format!("FIT parse error: {}", e)))?;

    Ok(fit_data
        .iter()
        .map(|record| DecodedRecord {
            kind: format!("{:?}", record.kind()).to_lowercase(),
            fields: record
                .fields()
                .iter()
                .filter_map(|field| {
                    convert_value(field.value()).map(|v| (field.name().to_string(), v))
                })
                .collect(),
        })
        .collect())
}

/// Convert a coordinate to degrees, treating large values as semicircles.
pub fn to_degrees(value: f64) -> f64 {
    if value.abs() > 180.0 {
        value * (180.0 / SEMICIRCLES_PER_180)
    } else {
        value
    }
}

/// Coerce a date, date string or epoch-millis value to a UTC timestamp.
fn coerce_timestamp(value: &FieldValue) -> Option<DateTime<Utc>> {
    match value {
        FieldValue::Time(t) => Some(*t),
        FieldValue::Text(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        FieldValue::Int(ms) => Utc.timestamp_millis_opt(*ms).single(),
        FieldValue::Float(ms) if ms.is_finite() => Utc.timestamp_millis_opt(*ms as i64).single(),
        FieldValue::Float(_) => None,
    }
}

/// Pick the record group that carries positions.
fn position_group(records: &[DecodedRecord]) -> Option<&str> {
    let mut kinds: Vec<&str> = Vec::new();
    for record in records {
        if !kinds.contains(&record.kind.as_str()) {
            kinds.push(&record.kind);
        }
    }

    let has_positions =
        |kind: &str| records.iter().any(|r| r.kind == kind && r.has_position());

    KNOWN_POSITION_GROUPS
        .iter()
        .copied()
        .find(|kind| has_positions(*kind))
        .or_else(|| kinds.into_iter().find(|kind| has_positions(*kind)))
}

fn record_to_point(record: &DecodedRecord, fallback_time: DateTime<Utc>) -> Option<TrackPoint> {
    let latitude = to_degrees(record.number("position_lat")?);
    let longitude = to_degrees(record.number("position_long")?);
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return None;
    }

    let elevation = record
        .number("enhanced_altitude")
        .or_else(|| record.number("altitude"))
        .unwrap_or(0.0);

    let heart_rate = record
        .number("heart_rate")
        .filter(|hr| *hr > 0.0)
        .map(|hr| hr.round().min(255.0) as u8);

    let speed_kmh = record
        .number("enhanced_speed")
        .or_else(|| record.number("speed"))
        .map(|mps| mps * 3.6);

    let timestamp = record
        .field("timestamp")
        .and_then(coerce_timestamp)
        .unwrap_or(fallback_time);

    Some(
        TrackPoint::new(latitude, longitude, elevation, timestamp)
            .with_heart_rate(heart_rate)
            .with_reported_speed(speed_kmh),
    )
}

fn session_name(records: &[DecodedRecord]) -> Option<String> {
    records
        .iter()
        .filter(|r| r.kind == "session" || r.kind == "sport")
        .find_map(|r| match r.field("name").or_else(|| r.field("sport")) {
            Some(FieldValue::Text(s)) if !s.is_empty() => Some(title_case(s)),
            _ => None,
        })
}

fn title_case(raw: &str) -> String {
    raw.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extract points from decoded records, sorted by timestamp.
pub fn extract_points(records: &[DecodedRecord]) -> Result<ParsedTrack, ImportError> {
    let fallback_time = Utc::now();
    let mut points: Vec<TrackPoint> = match position_group(records) {
        Some(kind) => records
            .iter()
            .filter(|r| r.kind == kind)
            .filter_map(|r| record_to_point(r, fallback_time))
            .collect(),
        None => Vec::new(),
    };

    if points.is_empty() {
        return Err(ImportError::ParseError(format!(
            "No GPS records found ({} records scanned)",
            records.len()
        )));
    }

    points.sort_by_key(|p| p.timestamp);

    let name = session_name(records).unwrap_or_else(|| UNNAMED_TRACK.to_string());
    tracing::debug!("Extracted {} FIT points from {} records", points.len(), records.len());

    Ok(ParsedTrack { name, points })
}

/// Parse FIT bytes into points and a session name.
pub fn parse_fit(content: &[u8]) -> Result<ParsedTrack, ImportError> {
    let records = decode(content)?;
    extract_points(&records)
}

/// Read a FIT file into a finalized track with default analysis settings.
pub fn read_fit(content: &[u8]) -> Result<Track, ImportError> {
    read_fit_with(content, &AnalysisConfig::default())
}

/// Read a FIT file into a finalized track.
pub fn read_fit_with(content: &[u8], config: &AnalysisConfig) -> Result<Track, ImportError> {
    Ok(parse_fit(content)?.finalize(config))
}
