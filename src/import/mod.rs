//! Track import from GPX and FIT files.
//!
//! Both readers yield an ordered [`TrackPoint`] sequence and a session name,
//! which are then analyzed into a finalized [`Track`].

pub mod fit;
pub mod gpx;

use crate::metrics::AnalysisConfig;
use crate::track::{Track, TrackPoint};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during track import
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("File not found: {0}")]
    FileNotFound(std::path::PathBuf),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Points and name extracted by a reader, before analysis.
#[derive(Debug, Clone)]
pub struct ParsedTrack {
    pub name: String,
    pub points: Vec<TrackPoint>,
}

impl ParsedTrack {
    /// Run the statistics engine and build the finalized track.
    pub fn finalize(self, config: &AnalysisConfig) -> Track {
        Track::from_points(self.name, self.points, config)
    }
}

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Gpx,
    Fit,
}

/// Detect file format from extension
pub fn detect_format(path: &Path) -> Result<FileFormat, ImportError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .ok_or_else(|| ImportError::InvalidFormat("No file extension".to_string()))?;

    match ext.as_str() {
        "gpx" => Ok(FileFormat::Gpx),
        "fit" => Ok(FileFormat::Fit),
        _ => Err(ImportError::InvalidFormat(format!(
            "Unsupported format: {}",
            ext
        ))),
    }
}

/// Parse file content of a known format.
pub fn parse_bytes(format: FileFormat, content: &[u8]) -> Result<ParsedTrack, ImportError> {
    match format {
        FileFormat::Gpx => {
            let text = std::str::from_utf8(content)
                .map_err(|e| ImportError::ParseError(format!("Invalid UTF-8: {}", e)))?;
            gpx::parse_gpx(text)
        }
        FileFormat::Fit => fit::parse_fit(content),
    }
}

/// Read, parse and analyze a track file.
pub fn import_file(path: &Path, config: &AnalysisConfig) -> Result<Track, ImportError> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.to_path_buf()));
    }

    let format = detect_format(path)?;
    let content = std::fs::read(path)?;
    let parsed = parse_bytes(format, &content)?;

    tracing::info!(
        "Imported {} points from {} ({:?})",
        parsed.points.len(),
        path.display(),
        format
    );

    Ok(parsed.finalize(config))
}
