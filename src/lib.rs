#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! Birdglass - a looking glass backend for BIRD route servers
//!
//! Birdglass talks to route servers through the birdwatcher JSON API and
//! turns their answers into a uniform model of neighbours and routes. It can
//! be used as both a command-line application and a library.
//!
//! # Feature Flags
//!
//! | Feature | Description | Key Dependencies |
//! |---------|-------------|------------------|
//! | `display` | Table formatting with `tabled` | `tabled` |
//! | `cli` | The `birdglass` binary | All above + `clap`, `tokio` |
//!
//! # Architecture
//!
//! - **[`model`]**: neighbours, routes and status as served to clients
//! - **[`source`]**: the [`Source`] trait and the birdwatcher multi-table source,
//!   which reconciles routes across per-peer tables, pipes and the master table
//! - **[`cache`]**: TTL bounded neighbours and routes caches and a per-key lock map
//! - **[`store`]**: the neighbours store, refreshed in the background
//! - **[`config`]**: configuration file and environment handling
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use birdglass::{GlassConfig, NeighboursStore};
//! use std::sync::Arc;
//!
//! let config = GlassConfig::new(&None)?;
//! let store = Arc::new(NeighboursStore::from_config(&config)?);
//!
//! // refresh now and then every `refresh_interval_secs`
//! let refresh = store.start_refresh()?;
//!
//! for neighbour in store.lookup_neighbours_at(1, "example") {
//!     println!("{} AS{} {}", neighbour.id, neighbour.asn, neighbour.state);
//! }
//!
//! refresh.shutdown();
//! ```

pub mod cache;
pub mod config;
pub mod model;
pub mod output;
pub mod source;
pub mod store;
pub mod time;

pub use cache::{LockMap, NeighboursCache, RoutesCache};
pub use config::{BirdwatcherConfig, CacheSettings, GlassConfig, SourceConfig, TableLayout};
pub use model::{
    ApiStatus, BgpInfo, CacheableResponse, Community, ExtCommunity, LookupRoute, Neighbour,
    NeighbourStatus, NeighboursLookupResults, NeighboursResponse, NeighboursStatusResponse,
    Route, RouteServer, RoutesLookupResponse, RoutesResponse, SourceId, Status,
    StatusResponse,
};
pub use output::{format_duration, truncate_name, OutputFormat, DEFAULT_DESCRIPTION_MAX_LEN};
pub use source::{Source, SourceError, SourceResult};
pub use store::{
    BackgroundTask, NeighboursStore, NeighboursStoreStats, RefreshOutcome, RouteServerStats,
    StoreState, StoreStatus,
};
pub use time::ServerTimeSettings;
