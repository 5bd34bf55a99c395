//! Route server sources
//!
//! A [`Source`] answers looking-glass queries for one configured route
//! server. Implementations own their caches; results shared through `Arc` are
//! read-only snapshots.

pub mod birdwatcher;
pub mod error;

pub use error::{SourceError, SourceResult};

use crate::config::{CacheSettings, SourceConfig, TableLayout};
use crate::model::{
    NeighboursResponse, NeighboursStatusResponse, RoutesLookupResponse, RoutesResponse,
    SourceId, StatusResponse,
};
use birdwatcher::MultiTableBirdwatcher;
use std::sync::Arc;

pub trait Source: Send + Sync {
    fn id(&self) -> SourceId;

    fn name(&self) -> &str;

    /// Purge expired route cache entries, returning how many were purged
    fn expire_caches(&self) -> usize;

    fn status(&self) -> SourceResult<StatusResponse>;

    fn neighbours(&self) -> SourceResult<Arc<NeighboursResponse>>;

    /// Uncached session states
    fn neighbours_status(&self) -> SourceResult<NeighboursStatusResponse>;

    /// Imported, filtered and not exported routes of a neighbour
    fn routes(&self, neighbour_id: &str) -> SourceResult<RoutesResponse>;

    /// Only the imported facet
    fn routes_received(&self, neighbour_id: &str) -> SourceResult<RoutesResponse>;

    /// Only the filtered facet
    fn routes_filtered(&self, neighbour_id: &str) -> SourceResult<RoutesResponse>;

    fn routes_not_exported(&self, neighbour_id: &str) -> SourceResult<Arc<RoutesResponse>>;

    /// Every route of the master table plus all filtered routes
    fn all_routes(&self) -> SourceResult<Arc<RoutesResponse>>;

    fn lookup_prefix(&self, prefix: &str) -> SourceResult<RoutesLookupResponse>;
}

/// Build the source described by `config`
pub fn from_config(config: &SourceConfig, cache: &CacheSettings) -> SourceResult<Arc<dyn Source>> {
    match config.birdwatcher.layout {
        TableLayout::MultiTable => Ok(Arc::new(MultiTableBirdwatcher::new(config, cache)?)),
        TableLayout::SingleTable => Err(SourceError::Config(format!(
            "source {}: single_table birdwatcher sources are not supported",
            config.id
        ))),
    }
}
