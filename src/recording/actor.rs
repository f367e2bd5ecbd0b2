//! Async front end for a [`RecordingSession`].
//!
//! One tokio task owns the session and drains a single mpsc channel. Timers,
//! the location stream and place lookups are tasks that post into that
//! channel, so the buffer only ever has one writer.

use crate::integrations::geocoding::{lookup_with_timeout, place_lookup, PlaceLookup};
use crate::metrics::AnalysisConfig;
use crate::recording::recorder::{RecordingSession, SessionServices};
use crate::recording::runtime::{RuntimeError, SessionRuntime};
use crate::recording::types::{
    Activity, PreconditionError, RecorderConfig, RecoveryOffer, SessionState, SessionStatus,
    StopOutcome,
};
use crate::sensors::LocationFix;
use crate::storage::config::AppConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Everything the session actor reacts to.
#[derive(Debug)]
pub enum SessionEvent {
    Fix(LocationFix),
    Tick(Activity),
    Battery(f32),
    Foreground(bool),
    PlaceResolved(Option<String>),
    Command(SessionCommand),
}

/// Requests that expect an answer.
#[derive(Debug)]
pub enum SessionCommand {
    Start(oneshot::Sender<Result<(), PreconditionError>>),
    Stop(oneshot::Sender<Option<StopOutcome>>),
    Discard(oneshot::Sender<()>),
    CheckForRecovery(oneshot::Sender<bool>),
    BeginRecovery(oneshot::Sender<Result<RecoveryOffer, PreconditionError>>),
    Resume(oneshot::Sender<Result<(), PreconditionError>>),
    Status(oneshot::Sender<SessionStatus>),
    Shutdown,
}

/// Scheduler backed by tokio tasks.
///
/// Tasks hold only a weak sender, so dropping every [`SessionHandle`] closes
/// the channel and ends the actor.
pub struct TokioRuntime {
    events: mpsc::WeakUnboundedSender<SessionEvent>,
    activities: HashMap<Activity, JoinHandle<()>>,
    fix_forwarder: Option<JoinHandle<()>>,
    place_lookup: Option<Arc<dyn PlaceLookup>>,
    lookup_timeout: Duration,
    lookup_task: Option<JoinHandle<()>>,
}

impl TokioRuntime {
    pub fn new(
        events: mpsc::WeakUnboundedSender<SessionEvent>,
        place_lookup: Option<Arc<dyn PlaceLookup>>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            events,
            activities: HashMap::new(),
            fix_forwarder: None,
            place_lookup,
            lookup_timeout,
            lookup_task: None,
        }
    }

    fn ensure_runtime() -> Result<tokio::runtime::Handle, RuntimeError> {
        tokio::runtime::Handle::try_current().map_err(|e| RuntimeError::NoRuntime(e.to_string()))
    }
}

impl SessionRuntime for TokioRuntime {
    fn start_activity(&mut self, activity: Activity, period: Duration) -> Result<(), RuntimeError> {
        let handle = Self::ensure_runtime()?;
        let events = self.events.clone();

        let task = handle.spawn(async move {
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(tx) = events.upgrade() else { break };
                if tx.send(SessionEvent::Tick(activity)).is_err() {
                    break;
                }
            }
        });

        if let Some(previous) = self.activities.insert(activity, task) {
            previous.abort();
        }
        Ok(())
    }

    fn cancel_activity(&mut self, activity: Activity) -> Result<(), RuntimeError> {
        if let Some(task) = self.activities.remove(&activity) {
            task.abort();
        }
        Ok(())
    }

    fn attach_fixes(&mut self, mut fixes: mpsc::UnboundedReceiver<LocationFix>) {
        let Ok(handle) = Self::ensure_runtime() else {
            tracing::error!("No runtime to forward location fixes on");
            return;
        };
        let events = self.events.clone();

        let task = handle.spawn(async move {
            while let Some(fix) = fixes.recv().await {
                let Some(tx) = events.upgrade() else { break };
                if tx.send(SessionEvent::Fix(fix)).is_err() {
                    break;
                }
            }
        });

        if let Some(previous) = self.fix_forwarder.replace(task) {
            previous.abort();
        }
    }

    fn detach_fixes(&mut self) {
        if let Some(task) = self.fix_forwarder.take() {
            task.abort();
        }
        if let Some(task) = self.lookup_task.take() {
            task.abort();
        }
    }

    fn request_place_name(&mut self, latitude: f64, longitude: f64) {
        let Some(lookup) = self.place_lookup.clone() else {
            return;
        };
        let Ok(handle) = Self::ensure_runtime() else {
            return;
        };
        let events = self.events.clone();
        let timeout = self.lookup_timeout;

        let task = handle.spawn(async move {
            let name = lookup_with_timeout(lookup, latitude, longitude, timeout).await;
            if let Some(tx) = events.upgrade() {
                let _ = tx.send(SessionEvent::PlaceResolved(name));
            }
        });

        if let Some(previous) = self.lookup_task.replace(task) {
            previous.abort();
        }
    }
}

impl Drop for TokioRuntime {
    fn drop(&mut self) {
        for (_, task) in self.activities.drain() {
            task.abort();
        }
        self.detach_fixes();
    }
}

/// Owns a [`RecordingSession`] and serializes every event onto it.
pub struct SessionActor {
    session: RecordingSession,
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl SessionActor {
    /// Spawn the actor on the current tokio runtime.
    pub fn spawn(
        config: RecorderConfig,
        analysis: AnalysisConfig,
        services: SessionServices,
        place_lookup: Option<Arc<dyn PlaceLookup>>,
        lookup_timeout: Duration,
    ) -> SessionHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let runtime = TokioRuntime::new(tx.downgrade(), place_lookup, lookup_timeout);
        let session = RecordingSession::new(config, analysis, services, Box::new(runtime));

        let actor = SessionActor {
            session,
            events: rx,
        };
        tokio::spawn(actor.run());

        SessionHandle { events: tx }
    }

    /// Spawn with the settings from `config`, including the place lookup
    /// when `[geocoding]` enables it.
    pub fn spawn_configured(config: &AppConfig, services: SessionServices) -> SessionHandle {
        Self::spawn(
            config.recording.clone(),
            config.analysis.clone(),
            services,
            place_lookup(&config.geocoding),
            config.geocoding.timeout(),
        )
    }

    async fn run(mut self) {
        tracing::debug!("Session actor started");
        while let Some(event) = self.events.recv().await {
            if !self.handle(event) {
                break;
            }
        }

        // Timers die with the runtime; keep a fresh snapshot for recovery
        if self.session.state() == SessionState::Recording {
            tracing::warn!("Session actor closing while recording");
            self.session.autosave(false);
        }
        tracing::debug!("Session actor stopped");
    }

    /// Returns false when the actor should exit.
    fn handle(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Fix(fix) => {
                self.session.handle_fix(fix);
            }
            SessionEvent::Tick(activity) => self.session.tick(activity),
            SessionEvent::Battery(level) => {
                if let Some(outcome) = self.session.on_battery_level(level) {
                    tracing::info!(
                        "Session stopped on battery with {} points",
                        outcome.track.points.len()
                    );
                }
            }
            SessionEvent::Foreground(foreground) => self.session.on_foreground_changed(foreground),
            SessionEvent::PlaceResolved(name) => self.session.apply_place_name(name),
            SessionEvent::Command(command) => return self.handle_command(command),
        }
        true
    }

    fn handle_command(&mut self, command: SessionCommand) -> bool {
        // A dropped reply receiver only means the caller stopped waiting
        match command {
            SessionCommand::Start(reply) => {
                let _ = reply.send(self.session.start());
            }
            SessionCommand::Stop(reply) => {
                let _ = reply.send(self.session.stop());
            }
            SessionCommand::Discard(reply) => {
                self.session.discard();
                let _ = reply.send(());
            }
            SessionCommand::CheckForRecovery(reply) => {
                let _ = reply.send(self.session.check_for_recovery());
            }
            SessionCommand::BeginRecovery(reply) => {
                let _ = reply.send(self.session.begin_recovery());
            }
            SessionCommand::Resume(reply) => {
                let _ = reply.send(self.session.resume());
            }
            SessionCommand::Status(reply) => {
                let _ = reply.send(self.session.status());
            }
            SessionCommand::Shutdown => return false,
        }
        true
    }
}

/// Cloneable handle to a running [`SessionActor`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Option<T> {
        let (tx, rx) = oneshot::channel();
        self.events
            .send(SessionEvent::Command(make(tx)))
            .ok()?;
        rx.await.ok()
    }

    pub async fn start(&self) -> Result<(), PreconditionError> {
        self.request(SessionCommand::Start)
            .await
            .unwrap_or(Err(PreconditionError::SessionClosed))
    }

    pub async fn stop(&self) -> Option<StopOutcome> {
        self.request(SessionCommand::Stop).await.flatten()
    }

    pub async fn discard(&self) {
        let _ = self.request(SessionCommand::Discard).await;
    }

    pub async fn check_for_recovery(&self) -> bool {
        self.request(SessionCommand::CheckForRecovery)
            .await
            .unwrap_or(false)
    }

    pub async fn begin_recovery(&self) -> Result<RecoveryOffer, PreconditionError> {
        self.request(SessionCommand::BeginRecovery)
            .await
            .unwrap_or(Err(PreconditionError::SessionClosed))
    }

    pub async fn resume(&self) -> Result<(), PreconditionError> {
        self.request(SessionCommand::Resume)
            .await
            .unwrap_or(Err(PreconditionError::SessionClosed))
    }

    pub async fn status(&self) -> Option<SessionStatus> {
        self.request(SessionCommand::Status).await
    }

    /// Battery level as a fraction in `0.0..=1.0`.
    pub fn battery_level(&self, level: f32) {
        let _ = self.events.send(SessionEvent::Battery(level));
    }

    pub fn foreground_changed(&self, foreground: bool) {
        let _ = self.events.send(SessionEvent::Foreground(foreground));
    }

    /// Inject a fix directly, bypassing the location subscription.
    pub fn push_fix(&self, fix: LocationFix) {
        let _ = self.events.send(SessionEvent::Fix(fix));
    }

    pub fn shutdown(&self) {
        let _ = self.events.send(SessionEvent::Command(SessionCommand::Shutdown));
    }

    /// True once the actor has exited.
    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }
}
