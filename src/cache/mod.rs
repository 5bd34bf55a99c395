//! Response caches
//!
//! Three pieces bound the load a looking glass puts on its route servers:
//!
//! - [`NeighboursCache`]: one slot per source holding the last neighbour list
//!   until its upstream TTL runs out
//! - [`RoutesCache`]: bounded, key addressed store of per-neighbour route
//!   snapshots with least-recently-used eviction and an explicit expiry sweep
//! - [`LockMap`]: a registry of named mutexes so that at most one upstream
//!   fetch sequence per key is in flight
//!
//! All three are safe to share between threads; none of them exposes its
//! internal maps.

pub mod lock_map;
pub mod neighbours;
pub mod routes;

pub use lock_map::LockMap;
pub use neighbours::NeighboursCache;
pub use routes::RoutesCache;

/// Default capacity of a routes cache
pub const DEFAULT_ROUTES_CACHE_SIZE: usize = 128;
