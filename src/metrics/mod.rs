//! Statistics and run segmentation for GPS traces.

pub mod calculator;
pub mod segments;
pub mod smoothing;
pub mod types;

pub use calculator::analyze;
pub use types::{Analysis, AnalysisConfig, Run, Stats};
