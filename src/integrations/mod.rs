//! External service integrations.

pub mod geocoding;

pub use geocoding::{
    lookup_with_timeout, GeocodeError, GeocodingConfig, NetworkFlag, NominatimLookup, PlaceLookup,
    Reachability,
};
