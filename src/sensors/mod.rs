//! Sensor collaborators: location stream and background execution.

pub mod provider;
pub mod types;

pub use provider::{ChannelLocationProvider, TokenLedger};
pub use types::{
    AccuracyHint, BackgroundExecution, BackgroundToken, LocationFix, LocationProvider,
    LocationSubscription, SensorError, SubscriptionId,
};
