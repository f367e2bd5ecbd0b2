//! In-process collaborator implementations.
//!
//! `ChannelLocationProvider` fans fixes pushed by platform glue (or a replay
//! loop) out to every live subscription. `TokenLedger` hands out background
//! tokens and remembers which are outstanding.

use crate::sensors::types::{
    AccuracyHint, BackgroundExecution, BackgroundToken, LocationFix, LocationProvider,
    LocationSubscription, SensorError, SubscriptionId,
};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Location provider fed by [`ChannelLocationProvider::push`].
#[derive(Debug)]
pub struct ChannelLocationProvider {
    subscribers: Mutex<HashMap<SubscriptionId, mpsc::UnboundedSender<LocationFix>>>,
    available: Mutex<bool>,
}

impl ChannelLocationProvider {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            available: Mutex::new(true),
        }
    }

    /// Mark the underlying service as (un)available for new subscriptions.
    pub fn set_available(&self, available: bool) {
        if let Ok(mut flag) = self.available.lock() {
            *flag = available;
        }
    }

    /// Deliver a fix to every subscriber. Returns how many received it.
    pub fn push(&self, fix: LocationFix) -> usize {
        let Ok(mut subscribers) = self.subscribers.lock() else {
            return 0;
        };
        // Drop subscribers whose receiver is gone
        subscribers.retain(|_, tx| tx.send(fix.clone()).is_ok());
        subscribers.len()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl Default for ChannelLocationProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationProvider for ChannelLocationProvider {
    fn subscribe(&self, hint: AccuracyHint) -> Result<LocationSubscription, SensorError> {
        let available = self
            .available
            .lock()
            .map(|flag| *flag)
            .map_err(|e| SensorError::Unavailable(e.to_string()))?;
        if !available {
            return Err(SensorError::Unavailable("provider disabled".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.subscribers
            .lock()
            .map_err(|e| SensorError::Unavailable(e.to_string()))?
            .insert(id, tx);

        tracing::debug!("Location subscription {} opened ({:?})", id, hint);
        Ok(LocationSubscription { id, fixes: rx })
    }

    fn unsubscribe(&self, id: SubscriptionId) -> Result<(), SensorError> {
        let removed = self
            .subscribers
            .lock()
            .map_err(|e| SensorError::Unavailable(e.to_string()))?
            .remove(&id);

        match removed {
            Some(_) => {
                tracing::debug!("Location subscription {} closed", id);
                Ok(())
            }
            None => Err(SensorError::UnknownSubscription(id)),
        }
    }
}

/// Background execution facility that grants tokens unless told otherwise.
#[derive(Debug, Default)]
pub struct TokenLedger {
    outstanding: Mutex<Vec<BackgroundToken>>,
    deny: Mutex<Option<String>>,
}

impl TokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse future acquisitions with `reason` (or grant again with `None`).
    pub fn deny_with(&self, reason: Option<&str>) {
        if let Ok(mut deny) = self.deny.lock() {
            *deny = reason.map(str::to_string);
        }
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.lock().map(|t| t.len()).unwrap_or(0)
    }
}

impl BackgroundExecution for TokenLedger {
    fn acquire(&self, label: &str) -> Result<BackgroundToken, SensorError> {
        if let Some(reason) = self
            .deny
            .lock()
            .map_err(|e| SensorError::BackgroundDenied(e.to_string()))?
            .clone()
        {
            return Err(SensorError::BackgroundDenied(reason));
        }

        let token = BackgroundToken::new(label);
        self.outstanding
            .lock()
            .map_err(|e| SensorError::BackgroundDenied(e.to_string()))?
            .push(token.clone());
        Ok(token)
    }

    fn release(&self, token: BackgroundToken) -> Result<(), SensorError> {
        let mut outstanding = self
            .outstanding
            .lock()
            .map_err(|e| SensorError::ReleaseFailed(e.to_string()))?;
        let before = outstanding.len();
        outstanding.retain(|t| t.id != token.id);
        if outstanding.len() == before {
            return Err(SensorError::ReleaseFailed(format!(
                "token {} was not outstanding",
                token.id
            )));
        }
        Ok(())
    }
}
