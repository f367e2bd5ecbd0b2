//! Live recording: session state machine, its async actor and supporting types.

pub mod actor;
pub mod recorder;
pub mod runtime;
pub mod types;

pub use actor::{SessionActor, SessionHandle};
pub use recorder::{FixOutcome, RecordingSession, SessionServices};
pub use runtime::{
    Clock, LogStatusPublisher, ManualClock, ManualRuntime, SessionRuntime, StatusPublisher,
    SystemClock,
};
pub use types::{
    Activity, AdvisoryError, AutosaveSnapshot, FatalSessionError, PreconditionError,
    RecorderConfig, RecoveryOffer, SessionState, SessionStatus, StopOutcome, SNAPSHOT_KEY,
};
