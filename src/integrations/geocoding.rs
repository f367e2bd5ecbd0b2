//! Reverse place-name lookup.
//!
//! Lookups are best effort: every failure collapses to "no name" and callers
//! bound the wait with [`lookup_with_timeout`].

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Geocoding errors
#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("Lookup request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Lookup timed out after {0:?}")]
    TimedOut(Duration),
}

/// Reverse geocoding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocodingConfig {
    /// Whether lookups are attempted at all
    pub enabled: bool,
    /// Nominatim-compatible reverse endpoint
    pub endpoint: String,
    /// Upper bound on a single lookup in seconds
    pub timeout_secs: u64,
    /// User agent sent with requests
    pub user_agent: String,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://nominatim.openstreetmap.org/reverse".to_string(),
            timeout_secs: 5,
            user_agent: format!("slopetrace/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl GeocodingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Resolves a coordinate to a human-readable place name.
pub trait PlaceLookup: Send + Sync {
    fn lookup(&self, latitude: f64, longitude: f64) -> BoxFuture<'static, Result<Option<String>, GeocodeError>>;
}

/// Reports whether the network is currently usable.
pub trait Reachability: Send + Sync {
    fn is_reachable(&self) -> bool;
}

/// Reachability flag updated by the platform's network observer.
#[derive(Debug)]
pub struct NetworkFlag {
    reachable: AtomicBool,
}

impl NetworkFlag {
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
        }
    }

    pub fn set(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::Relaxed);
    }
}

impl Reachability for NetworkFlag {
    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::Relaxed)
    }
}

/// Nominatim reverse response (only the fields we read)
#[derive(Debug, Deserialize)]
struct NominatimResponse {
    name: Option<String>,
    display_name: Option<String>,
    address: Option<NominatimAddress>,
}

#[derive(Debug, Deserialize)]
struct NominatimAddress {
    village: Option<String>,
    town: Option<String>,
    city: Option<String>,
    hamlet: Option<String>,
    municipality: Option<String>,
    county: Option<String>,
}

impl NominatimResponse {
    fn place_name(self) -> Option<String> {
        let from_address = self.address.and_then(|a| {
            [a.village, a.town, a.city, a.hamlet, a.municipality, a.county]
                .into_iter()
                .flatten()
                .find(|s| !s.trim().is_empty())
        });

        from_address
            .or(self.name.filter(|s| !s.trim().is_empty()))
            .or_else(|| {
                self.display_name
                    .and_then(|d| d.split(',').next().map(|s| s.trim().to_string()))
                    .filter(|s| !s.is_empty())
            })
    }
}

/// Lookup against an OpenStreetMap Nominatim server.
#[derive(Clone)]
pub struct NominatimLookup {
    client: reqwest::Client,
    config: GeocodingConfig,
}

impl NominatimLookup {
    pub fn new(config: GeocodingConfig) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .build()
            .map_err(|e| GeocodeError::RequestFailed(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn build_url(&self, latitude: f64, longitude: f64) -> String {
        format!(
            "{}?format=jsonv2&lat={:.6}&lon={:.6}&zoom=14",
            self.config.endpoint, latitude, longitude
        )
    }
}

impl PlaceLookup for NominatimLookup {
    fn lookup(&self, latitude: f64, longitude: f64) -> BoxFuture<'static, Result<Option<String>, GeocodeError>> {
        let client = self.client.clone();
        let url = self.build_url(latitude, longitude);

        Box::pin(async move {
            tracing::debug!("Reverse geocoding {:.4},{:.4}", latitude, longitude);

            let response = client
                .get(&url)
                .send()
                .await
                .map_err(|e| GeocodeError::RequestFailed(e.to_string()))?
                .error_for_status()
                .map_err(|e| GeocodeError::RequestFailed(e.to_string()))?;

            let body: NominatimResponse = response
                .json()
                .await
                .map_err(|e| GeocodeError::InvalidResponse(e.to_string()))?;

            Ok(body.place_name())
        })
    }
}

/// Build the lookup a session should use, `None` when lookups are disabled
/// or the HTTP client cannot be created.
pub fn place_lookup(config: &GeocodingConfig) -> Option<Arc<dyn PlaceLookup>> {
    if !config.enabled {
        tracing::info!("Place-name lookup disabled");
        return None;
    }

    match NominatimLookup::new(config.clone()) {
        Ok(lookup) => Some(Arc::new(lookup)),
        Err(e) => {
            tracing::warn!("Place-name lookup unavailable: {}", e);
            None
        }
    }
}

/// Run a lookup bounded by `timeout`. Errors and timeouts become `None`.
pub async fn lookup_with_timeout(
    lookup: Arc<dyn PlaceLookup>,
    latitude: f64,
    longitude: f64,
    timeout: Duration,
) -> Option<String> {
    match tokio::time::timeout(timeout, lookup.lookup(latitude, longitude)).await {
        Ok(Ok(name)) => name,
        Ok(Err(e)) => {
            tracing::debug!("Place lookup failed: {}", e);
            None
        }
        Err(_) => {
            tracing::debug!("{}", GeocodeError::TimedOut(timeout));
            None
        }
    }
}
