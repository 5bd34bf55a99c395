//! Canonical looking-glass model
//!
//! Upstream monitoring APIs answer in their own JSON dialects. The parsers in
//! [`crate::source`] map those answers onto the types in this module, which is
//! what the store, the caches and any front-end work with.
//!
//! - [`neighbour`]: BGP sessions and their route counters
//! - [`route`]: RIB entries, BGP attributes and communities
//! - [`status`]: API status headers and route server status

pub mod neighbour;
pub mod route;
pub mod status;

pub use neighbour::{
    Neighbour, NeighbourStatus, NeighboursLookupResults, NeighboursResponse,
    NeighboursStatusResponse,
};
pub use route::{
    sort_routes, BgpInfo, Community, ExtCommunity, LookupRoute, Route, RouteServer,
    RoutesLookupResponse, RoutesResponse,
};
pub use status::{ApiStatus, CacheStatus, Status, StatusResponse};

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Identifier of a configured route server
pub type SourceId = u32;

/// A response whose lifetime is bounded by the upstream declared TTL
pub trait CacheableResponse {
    /// Absolute point in time after which the response is stale
    fn expires_at(&self) -> DateTime<Utc>;

    /// Remaining time to live, zero once expired
    fn cache_ttl(&self) -> Duration {
        (self.expires_at() - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Whether the TTL has elapsed
    fn is_expired(&self) -> bool {
        self.expires_at() <= Utc::now()
    }
}

impl CacheableResponse for NeighboursResponse {
    fn expires_at(&self) -> DateTime<Utc> {
        self.api.ttl
    }
}

impl CacheableResponse for NeighboursStatusResponse {
    fn expires_at(&self) -> DateTime<Utc> {
        self.api.ttl
    }
}

impl CacheableResponse for RoutesResponse {
    fn expires_at(&self) -> DateTime<Utc> {
        self.api.ttl
    }
}

impl CacheableResponse for StatusResponse {
    fn expires_at(&self) -> DateTime<Utc> {
        self.api.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_ttl_counts_down() {
        let response = RoutesResponse {
            api: ApiStatus {
                ttl: Utc::now() + chrono::Duration::seconds(120),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(!response.is_expired());
        let ttl = response.cache_ttl();
        assert!(ttl > Duration::from_secs(100));
        assert!(ttl <= Duration::from_secs(120));
    }

    #[test]
    fn test_cache_ttl_saturates_when_expired() {
        let response = NeighboursResponse {
            api: ApiStatus {
                ttl: Utc::now() - chrono::Duration::seconds(5),
                ..Default::default()
            },
            neighbours: vec![],
        };
        assert!(response.is_expired());
        assert_eq!(response.cache_ttl(), Duration::ZERO);
    }
}
