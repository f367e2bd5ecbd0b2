//! SlopeTrace - ski GPS track analysis and recording
//!
//! Reads GPX and FIT traces, computes session statistics, splits a day into
//! individual downhill runs, and records new sessions with crash recovery.

pub mod geo;
pub mod import;
pub mod integrations;
pub mod metrics;
pub mod recording;
pub mod sensors;
pub mod storage;
pub mod track;

// Re-export commonly used types
pub use import::fit::read_fit;
pub use import::gpx::read_gpx;
pub use import::{import_file, ImportError};
pub use metrics::{analyze, AnalysisConfig, Run, Stats};
pub use recording::{RecordingSession, SessionHandle, SessionState};
pub use track::{Track, TrackPoint};
