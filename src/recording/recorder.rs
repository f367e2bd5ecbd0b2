//! Recording session state machine.
//!
//! `RecordingSession` is synchronous and owns the point buffer. Everything
//! asynchronous (fix delivery, periodic ticks, place lookups) happens in the
//! [`SessionRuntime`] and comes back in through the `handle_*`/`tick` methods,
//! so one owner serializes every mutation.

use crate::integrations::geocoding::Reachability;
use crate::metrics::{analyze, AnalysisConfig, Stats};
use crate::recording::runtime::{Clock, SessionRuntime, StatusPublisher};
use crate::recording::types::{
    Activity, AdvisoryError, AutosaveSnapshot, FatalSessionError, PreconditionError,
    RecorderConfig, RecoveryOffer, SessionState, SessionStatus, StopOutcome, SNAPSHOT_KEY,
};
use crate::sensors::{
    AccuracyHint, BackgroundExecution, BackgroundToken, LocationFix, LocationProvider,
    SubscriptionId,
};
use crate::storage::disk::{StorageProbe, StorageStatus};
use crate::storage::{save_track, StoreError, TrackStore};
use crate::track::{Track, TrackPoint};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// External collaborators a session needs.
#[derive(Clone)]
pub struct SessionServices {
    pub store: Arc<dyn TrackStore>,
    pub storage: Arc<dyn StorageProbe>,
    pub location: Arc<dyn LocationProvider>,
    /// `None` on platforms where the process is never suspended
    pub background: Option<Arc<dyn BackgroundExecution>>,
    pub reachability: Arc<dyn Reachability>,
    pub status: Arc<dyn StatusPublisher>,
    pub clock: Arc<dyn Clock>,
}

/// What happened to an incoming fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixOutcome {
    Accepted,
    /// Accuracy radius above the configured maximum
    Inaccurate,
    /// Arrived too soon after the last accepted fix
    TooSoon,
    /// Session is not recording
    Ignored,
}

/// A recording session.
pub struct RecordingSession {
    config: RecorderConfig,
    analysis: AnalysisConfig,
    services: SessionServices,
    runtime: Box<dyn SessionRuntime>,
    state: SessionState,
    started_at: Option<DateTime<Utc>>,
    points: Vec<TrackPoint>,
    /// Timestamp of the last accepted fix
    last_fix_at: Option<DateTime<Utc>>,
    /// Wall-clock time the signal was last known good
    last_signal_at: Option<DateTime<Utc>>,
    last_accuracy_m: Option<f64>,
    elapsed_seconds: u64,
    live_stats: Option<Stats>,
    location_name: Option<String>,
    place_requested: bool,
    subscription: Option<SubscriptionId>,
    background_token: Option<BackgroundToken>,
    advisory: Option<AdvisoryError>,
    fatal: Option<FatalSessionError>,
    pending_recovery: Option<AutosaveSnapshot>,
}

impl RecordingSession {
    pub fn new(
        config: RecorderConfig,
        analysis: AnalysisConfig,
        services: SessionServices,
        runtime: Box<dyn SessionRuntime>,
    ) -> Self {
        Self {
            config,
            analysis,
            services,
            runtime,
            state: SessionState::Idle,
            started_at: None,
            points: Vec::new(),
            last_fix_at: None,
            last_signal_at: None,
            last_accuracy_m: None,
            elapsed_seconds: 0,
            live_stats: None,
            location_name: None,
            place_requested: false,
            subscription: None,
            background_token: None,
            advisory: None,
            fatal: None,
            pending_recovery: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds
    }

    pub fn location_name(&self) -> Option<&str> {
        self.location_name.as_deref()
    }

    pub fn live_stats(&self) -> Option<&Stats> {
        self.live_stats.as_ref()
    }

    pub fn advisory(&self) -> Option<&AdvisoryError> {
        self.advisory.as_ref()
    }

    pub fn fatal(&self) -> Option<&FatalSessionError> {
        self.fatal.as_ref()
    }

    /// Begin recording from Idle or Stopped.
    pub fn start(&mut self) -> Result<(), PreconditionError> {
        if !matches!(self.state, SessionState::Idle | SessionState::Stopped) {
            return Err(PreconditionError::InvalidState {
                operation: "start",
                state: self.state,
            });
        }

        let free_bytes = self.services.storage.free_bytes();
        match StorageStatus::classify(free_bytes, self.config.min_free_bytes) {
            StorageStatus::Critical => {
                tracing::error!("Storage is critically low - cannot start recording");
                return Err(PreconditionError::InsufficientStorage {
                    free_bytes: free_bytes.unwrap_or(0),
                    required_bytes: self.config.min_free_bytes,
                });
            }
            StorageStatus::Low => tracing::warn!("Storage is running low"),
            StorageStatus::Unknown => {
                tracing::warn!("Free storage unknown, starting anyway")
            }
            StorageStatus::Ok => {}
        }

        if let Err(e) = self.services.store.delete(SNAPSHOT_KEY) {
            tracing::warn!("Failed to clear stale snapshot: {}", e);
        }

        self.fatal = None;
        self.advisory = None;
        self.acquire_and_run()?;

        self.points.clear();
        self.started_at = Some(self.services.clock.now());
        self.last_fix_at = None;
        self.last_accuracy_m = None;
        self.elapsed_seconds = 0;
        self.live_stats = None;
        self.location_name = None;
        self.place_requested = false;
        self.last_signal_at = self.started_at;

        self.autosave(false);
        tracing::info!("Started recording session");
        Ok(())
    }

    /// Acquire the sensor stream and background token, then schedule the
    /// periodic activities. Leaves nothing held on failure.
    fn acquire_and_run(&mut self) -> Result<(), PreconditionError> {
        let subscription = self
            .services
            .location
            .subscribe(AccuracyHint::Best)
            .map_err(|e| PreconditionError::LocationUnavailable(e.to_string()))?;

        if let Some(background) = &self.services.background {
            match background.acquire(&self.config.background_label) {
                Ok(token) => self.background_token = Some(token),
                Err(e) => {
                    tracing::error!("Background execution denied: {}", e);
                    if let Err(e) = self.services.location.unsubscribe(subscription.id) {
                        tracing::warn!("Failed to release location subscription: {}", e);
                    }
                    self.fatal = Some(FatalSessionError::BackgroundTokenDenied(e.to_string()));
                    return Err(PreconditionError::BackgroundDenied(e.to_string()));
                }
            }
        }

        self.subscription = Some(subscription.id);
        self.runtime.attach_fixes(subscription.fixes);

        for activity in Activity::ALL {
            if let Err(e) = self
                .runtime
                .start_activity(activity, self.config.period(activity))
            {
                tracing::warn!("Failed to schedule {:?}: {}", activity, e);
            }
        }

        self.state = SessionState::Recording;
        Ok(())
    }

    /// Feed one fix from the location stream.
    pub fn handle_fix(&mut self, fix: LocationFix) -> FixOutcome {
        if self.state != SessionState::Recording {
            return FixOutcome::Ignored;
        }

        if fix.accuracy_m.is_nan() || fix.accuracy_m > self.config.max_accuracy_m {
            tracing::debug!("Dropping fix with accuracy {:.1} m", fix.accuracy_m);
            return FixOutcome::Inaccurate;
        }

        if let Some(last) = self.last_fix_at {
            let gap_ms = (fix.timestamp - last).num_milliseconds();
            if gap_ms < self.config.min_fix_interval_ms as i64 {
                return FixOutcome::TooSoon;
            }
        }

        self.points.push(TrackPoint::new(
            fix.latitude,
            fix.longitude,
            fix.elevation,
            fix.timestamp,
        ));
        self.last_fix_at = Some(fix.timestamp);
        self.last_accuracy_m = Some(fix.accuracy_m);
        self.last_signal_at = Some(self.services.clock.now());

        if matches!(self.advisory, Some(AdvisoryError::SignalLost { .. })) {
            tracing::info!("GPS signal restored");
            self.advisory = None;
        }

        if !self.place_requested
            && self.location_name.is_none()
            && fix.accuracy_m < self.config.geocode_accuracy_m
            && self.services.reachability.is_reachable()
        {
            self.place_requested = true;
            self.runtime.request_place_name(fix.latitude, fix.longitude);
        }

        FixOutcome::Accepted
    }

    /// Result of a place lookup. `None` (failure or timeout) is ignored.
    pub fn apply_place_name(&mut self, name: Option<String>) {
        match name {
            Some(name) if self.state == SessionState::Recording => {
                tracing::info!("Session location resolved: {}", name);
                self.location_name = Some(name);
            }
            Some(_) => {}
            None => tracing::debug!("No place name resolved"),
        }
    }

    /// Battery notification, as a fraction in `0.0..=1.0`.
    pub fn on_battery_level(&mut self, level: f32) -> Option<StopOutcome> {
        if self.state != SessionState::Recording {
            return None;
        }

        if level <= self.config.critical_battery_level {
            tracing::error!("Battery critical ({:.0}%), stopping", level * 100.0);
            self.fatal = Some(FatalSessionError::CriticalBattery { level });
            return self.stop();
        }

        if level <= self.config.low_battery_level {
            tracing::warn!("Battery low ({:.0}%), saving", level * 100.0);
            self.autosave(false);
            self.advisory = Some(AdvisoryError::LowBattery { level });
        }

        None
    }

    /// App moved to (`true`) or from (`false`) the foreground.
    pub fn on_foreground_changed(&mut self, foreground: bool) {
        if self.state != SessionState::Recording {
            return;
        }

        if foreground {
            self.autosave(false);
            self.delete_snapshot();
        } else {
            tracing::info!("Backgrounded, saving paused snapshot");
            self.autosave(true);
        }
    }

    /// A periodic activity fired.
    pub fn tick(&mut self, activity: Activity) {
        if self.state != SessionState::Recording {
            return;
        }

        match activity {
            Activity::ElapsedTick => self.update_elapsed(),
            Activity::LiveStats => self.recompute_live_stats(),
            Activity::Autosave => {
                self.autosave(false);
            }
            Activity::StatusUpdate => self.services.status.publish(&self.status()),
            Activity::SignalWatchdog => self.check_signal(),
        }
    }

    fn update_elapsed(&mut self) {
        if let Some(started_at) = self.started_at {
            let elapsed = (self.services.clock.now() - started_at).num_seconds();
            self.elapsed_seconds = elapsed.max(0) as u64;
        }
    }

    /// Run the statistics engine on a copy of the buffer.
    pub fn recompute_live_stats(&mut self) {
        let snapshot = self.points.clone();
        let analysis = analyze(&snapshot, &self.analysis);
        tracing::debug!(
            "Live stats: {:.0} m, {} runs",
            analysis.stats.total_distance_m,
            analysis.stats.run_count
        );
        self.live_stats = Some(analysis.stats);
    }

    /// Raise or keep the signal-lost advisory when fixes stopped arriving.
    pub fn check_signal(&mut self) {
        let Some(reference) = self.last_signal_at.or(self.started_at) else {
            return;
        };

        let silent = (self.services.clock.now() - reference).num_seconds().max(0) as u64;
        if silent > self.config.signal_lost_after_secs {
            if !matches!(self.advisory, Some(AdvisoryError::SignalLost { .. })) {
                tracing::warn!("No accepted fix for {}s", silent);
            }
            self.advisory = Some(AdvisoryError::SignalLost { seconds: silent });
        }
    }

    /// Write the crash-recovery snapshot. Failures are advisory only.
    pub fn autosave(&mut self, graceful_pause: bool) -> bool {
        let Some(started_at) = self.started_at else {
            return false;
        };

        let snapshot = AutosaveSnapshot {
            points: self.points.clone(),
            started_at,
            location_name: self.location_name.clone(),
            captured_at: self.services.clock.now(),
            graceful_pause,
        };

        let result = serde_json::to_vec(&snapshot)
            .map_err(|e| StoreError::Serialization(e.to_string()))
            .and_then(|bytes| self.services.store.write(SNAPSHOT_KEY, &bytes));

        match result {
            Ok(handle) => {
                tracing::debug!(
                    "Autosaved {} points ({} bytes)",
                    snapshot.points.len(),
                    handle.size_bytes
                );
                if matches!(self.advisory, Some(AdvisoryError::AutosaveFailed(_))) {
                    self.advisory = None;
                }
                true
            }
            Err(e) => {
                tracing::warn!("Autosave failed: {}", e);
                self.advisory = Some(AdvisoryError::AutosaveFailed(e.to_string()));
                false
            }
        }
    }

    /// End the session. Returns the finalized track when there was data.
    pub fn stop(&mut self) -> Option<StopOutcome> {
        if self.state != SessionState::Recording {
            tracing::debug!("Stop ignored while {:?}", self.state);
            return None;
        }

        self.teardown();

        if self.points.is_empty() {
            tracing::info!("Stopped recording with no data");
            self.delete_snapshot();
            self.reset();
            self.state = SessionState::Idle;
            return None;
        }

        // Freshest copy on disk in case persisting the track fails
        self.autosave(false);

        let name = self.track_name();
        let points = std::mem::take(&mut self.points);
        let track = Track::from_points(name, points, &self.analysis);

        let outcome = match save_track(self.services.store.as_ref(), &track) {
            Ok(key) => {
                self.delete_snapshot();
                self.state = SessionState::Stopped;
                tracing::info!(
                    "Finished recording {} with {} points, {} runs",
                    key,
                    track.points.len(),
                    track.runs.len()
                );
                StopOutcome {
                    track,
                    stored_as: Some(key),
                }
            }
            Err(e) => {
                tracing::error!("Failed to persist track, keeping snapshot: {}", e);
                self.advisory = Some(AdvisoryError::PersistenceFailed(e.to_string()));
                self.state = SessionState::Idle;
                StopOutcome {
                    track,
                    stored_as: None,
                }
            }
        };

        self.reset();
        Some(outcome)
    }

    /// Throw away the session (or the pending recovery) without saving.
    pub fn discard(&mut self) {
        self.teardown();
        self.delete_snapshot();
        self.points.clear();
        self.reset();
        self.pending_recovery = None;
        self.state = SessionState::Idle;
        tracing::info!("Discarded recording");
    }

    /// True when an interrupted (not gracefully paused) session can be resumed.
    pub fn check_for_recovery(&self) -> bool {
        if self.state != SessionState::Idle {
            return false;
        }

        match self.load_snapshot() {
            Ok(Some(snapshot)) => !snapshot.graceful_pause,
            Ok(None) => false,
            Err(e) => {
                tracing::warn!("Unreadable recovery snapshot: {}", e);
                false
            }
        }
    }

    /// Move Idle → Recovering and describe what would be resumed.
    pub fn begin_recovery(&mut self) -> Result<RecoveryOffer, PreconditionError> {
        if self.state != SessionState::Idle {
            return Err(PreconditionError::InvalidState {
                operation: "recover",
                state: self.state,
            });
        }

        let snapshot = self
            .load_snapshot()
            .map_err(|e| PreconditionError::SnapshotUnreadable(e.to_string()))?
            .filter(|s| !s.graceful_pause)
            .ok_or(PreconditionError::NoSnapshot)?;

        let offer = RecoveryOffer::from(&snapshot);
        tracing::info!(
            "Found interrupted session with {} points from {}",
            offer.point_count,
            offer.started_at
        );
        self.pending_recovery = Some(snapshot);
        self.state = SessionState::Recovering;
        Ok(offer)
    }

    /// Continue the interrupted session. Skips the storage check.
    pub fn resume(&mut self) -> Result<(), PreconditionError> {
        let from_idle = self.state == SessionState::Idle;
        if from_idle {
            self.begin_recovery()?;
        }

        if self.state != SessionState::Recovering {
            return Err(PreconditionError::InvalidState {
                operation: "resume",
                state: self.state,
            });
        }

        let snapshot = self
            .pending_recovery
            .take()
            .ok_or(PreconditionError::NoSnapshot)?;

        if let Err(e) = self.acquire_and_run() {
            // The snapshot stays on disk either way
            if from_idle {
                self.state = SessionState::Idle;
            } else {
                self.pending_recovery = Some(snapshot);
            }
            return Err(e);
        }

        self.last_fix_at = snapshot.points.last().map(|p| p.timestamp);
        self.points = snapshot.points;
        self.started_at = Some(snapshot.started_at);
        self.place_requested = snapshot.location_name.is_some();
        self.location_name = snapshot.location_name;
        self.last_accuracy_m = None;
        self.last_signal_at = Some(self.services.clock.now());
        self.update_elapsed();

        self.autosave(false);
        tracing::info!(
            "Resumed recording with {} points, {}s elapsed",
            self.points.len(),
            self.elapsed_seconds
        );
        Ok(())
    }

    /// Current status as published to the platform.
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state,
            elapsed_seconds: self.elapsed_seconds,
            point_count: self.points.len(),
            last_accuracy_m: self.last_accuracy_m,
            location_name: self.location_name.clone(),
            live_stats: self.live_stats.clone(),
            advisory: self.advisory.clone(),
            fatal: self.fatal.clone(),
        }
    }

    /// Release everything held for recording. Each step runs regardless of
    /// earlier failures.
    fn teardown(&mut self) {
        let mut failures = Vec::new();

        for activity in Activity::ALL {
            if let Err(e) = self.runtime.cancel_activity(activity) {
                tracing::warn!("Teardown: {}", e);
                failures.push(e.to_string());
            }
        }

        self.runtime.detach_fixes();

        if let Some(id) = self.subscription.take() {
            if let Err(e) = self.services.location.unsubscribe(id) {
                tracing::warn!("Teardown: failed to unsubscribe: {}", e);
                failures.push(e.to_string());
            }
        }

        if let Some(token) = self.background_token.take() {
            if let Some(background) = &self.services.background {
                if let Err(e) = background.release(token) {
                    tracing::warn!("Teardown: failed to release background token: {}", e);
                    failures.push(e.to_string());
                }
            }
        }

        if !failures.is_empty() {
            self.advisory = Some(AdvisoryError::TeardownFailed(failures.join("; ")));
        }
    }

    fn reset(&mut self) {
        self.started_at = None;
        self.last_fix_at = None;
        self.last_signal_at = None;
        self.last_accuracy_m = None;
        self.elapsed_seconds = 0;
        self.live_stats = None;
        self.location_name = None;
        self.place_requested = false;
    }

    fn delete_snapshot(&self) {
        if let Err(e) = self.services.store.delete(SNAPSHOT_KEY) {
            tracing::warn!("Failed to delete snapshot: {}", e);
        }
    }

    fn load_snapshot(&self) -> Result<Option<AutosaveSnapshot>, StoreError> {
        match self.services.store.read(SNAPSHOT_KEY)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// `"<start date and time> <place>"`, falling back to the configured label.
    fn track_name(&self) -> String {
        let started_at = self
            .started_at
            .or_else(|| self.points.first().map(|p| p.timestamp))
            .unwrap_or_else(|| self.services.clock.now());
        let label = self
            .location_name
            .as_deref()
            .unwrap_or(self.config.fallback_label.as_str());
        format!("{} {}", started_at.format("%Y-%m-%d %H:%M"), label)
    }
}
