//! Seams between the session state machine and the world around it:
//! wall clock, status publishing and the scheduler that drives periodic work.

use crate::recording::types::{Activity, SessionStatus};
use crate::sensors::LocationFix;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Wall clock used for elapsed time, signal watchdog and snapshot capture time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = to;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|_| Utc::now())
    }
}

/// Receives the periodic external status update.
pub trait StatusPublisher: Send + Sync {
    fn publish(&self, status: &SessionStatus);
}

/// Publishes status to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStatusPublisher;

impl StatusPublisher for LogStatusPublisher {
    fn publish(&self, status: &SessionStatus) {
        tracing::info!(
            state = ?status.state,
            elapsed = status.elapsed_seconds,
            points = status.point_count,
            "Session status"
        );
    }
}

/// Scheduler errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("No async runtime available: {0}")]
    NoRuntime(String),

    #[error("Failed to cancel {0:?}: {1}")]
    CancelFailed(Activity, String),
}

/// Scheduling backend for a session. Every callback the backend produces
/// (ticks, fixes, place names) must be fed back into the same session.
pub trait SessionRuntime: Send {
    /// Deliver `activity` ticks every `period` until cancelled.
    fn start_activity(&mut self, activity: Activity, period: Duration) -> Result<(), RuntimeError>;

    /// Stop delivering `activity` ticks. Cancelling an unscheduled activity is a no-op.
    fn cancel_activity(&mut self, activity: Activity) -> Result<(), RuntimeError>;

    /// Forward fixes from a location subscription into the session.
    fn attach_fixes(&mut self, fixes: mpsc::UnboundedReceiver<LocationFix>);

    /// Stop forwarding fixes.
    fn detach_fixes(&mut self);

    /// Resolve a place name in the background; the answer comes back later.
    fn request_place_name(&mut self, latitude: f64, longitude: f64);
}

#[derive(Debug, Default)]
struct ManualState {
    scheduled: HashMap<Activity, Duration>,
    fixes: Option<mpsc::UnboundedReceiver<LocationFix>>,
    place_requests: Vec<(f64, f64)>,
    failing_cancel: Vec<Activity>,
}

/// Runtime that records requests instead of spawning work, for callers that
/// drive the session from their own loop.
#[derive(Debug, Clone, Default)]
pub struct ManualRuntime {
    state: Arc<Mutex<ManualState>>,
}

impl ManualRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activities currently scheduled, with their periods.
    pub fn scheduled(&self) -> HashMap<Activity, Duration> {
        self.state
            .lock()
            .map(|s| s.scheduled.clone())
            .unwrap_or_default()
    }

    pub fn is_scheduled(&self, activity: Activity) -> bool {
        self.scheduled().contains_key(&activity)
    }

    /// Coordinates passed to `request_place_name`, oldest first.
    pub fn place_requests(&self) -> Vec<(f64, f64)> {
        self.state
            .lock()
            .map(|s| s.place_requests.clone())
            .unwrap_or_default()
    }

    pub fn has_fix_stream(&self) -> bool {
        self.state.lock().map(|s| s.fixes.is_some()).unwrap_or(false)
    }

    /// Pull every fix buffered on the attached subscription.
    pub fn drain_fixes(&self) -> Vec<LocationFix> {
        let mut drained = Vec::new();
        if let Ok(mut state) = self.state.lock() {
            if let Some(rx) = state.fixes.as_mut() {
                while let Ok(fix) = rx.try_recv() {
                    drained.push(fix);
                }
            }
        }
        drained
    }

    /// Make cancelling `activity` fail (it is still removed).
    pub fn fail_cancel_of(&self, activity: Activity) {
        if let Ok(mut state) = self.state.lock() {
            state.failing_cancel.push(activity);
        }
    }
}

impl SessionRuntime for ManualRuntime {
    fn start_activity(&mut self, activity: Activity, period: Duration) -> Result<(), RuntimeError> {
        self.state
            .lock()
            .map_err(|e| RuntimeError::NoRuntime(e.to_string()))?
            .scheduled
            .insert(activity, period);
        Ok(())
    }

    fn cancel_activity(&mut self, activity: Activity) -> Result<(), RuntimeError> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| RuntimeError::CancelFailed(activity, e.to_string()))?;
        state.scheduled.remove(&activity);
        if state.failing_cancel.contains(&activity) {
            return Err(RuntimeError::CancelFailed(
                activity,
                "injected failure".to_string(),
            ));
        }
        Ok(())
    }

    fn attach_fixes(&mut self, fixes: mpsc::UnboundedReceiver<LocationFix>) {
        if let Ok(mut state) = self.state.lock() {
            state.fixes = Some(fixes);
        }
    }

    fn detach_fixes(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.fixes = None;
        }
    }

    fn request_place_name(&mut self, latitude: f64, longitude: f64) {
        if let Ok(mut state) = self.state.lock() {
            state.place_requests.push((latitude, longitude));
        }
    }
}
