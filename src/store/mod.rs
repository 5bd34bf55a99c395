//! Neighbours store
//!
//! Keeps the latest neighbour snapshot of every configured source and refreshes
//! them in the background. Readers only ever see the snapshot in memory; they
//! never wait on an upstream request.
//!
//! Per source the refresh cycle moves through `INIT -> UPDATING -> READY` or
//! `UPDATING -> ERROR`. A failed refresh keeps the previous snapshot.

mod status;
mod task;

pub use status::{NeighboursStoreStats, RefreshOutcome, RouteServerStats, StoreState, StoreStatus};
pub use task::BackgroundTask;

use crate::config::GlassConfig;
use crate::model::{Neighbour, NeighboursLookupResults, SourceId};
use crate::source::{self, Source, SourceError};
use anyhow::{anyhow, Result};
use chrono::Utc;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{error, info};

#[derive(Default)]
struct Snapshot {
    neighbours: HashMap<SourceId, HashMap<String, Neighbour>>,
    status: HashMap<SourceId, StoreStatus>,
}

pub struct NeighboursStore {
    sources: BTreeMap<SourceId, Arc<dyn Source>>,
    refresh_interval: Duration,
    snapshot: RwLock<Snapshot>,
}

impl NeighboursStore {
    pub fn new(sources: Vec<Arc<dyn Source>>, refresh_interval: Duration) -> Self {
        let mut snapshot = Snapshot::default();
        let sources: BTreeMap<SourceId, Arc<dyn Source>> = sources
            .into_iter()
            .map(|s| {
                snapshot.neighbours.insert(s.id(), HashMap::new());
                snapshot.status.insert(s.id(), StoreStatus::default());
                (s.id(), s)
            })
            .collect();

        Self {
            sources,
            refresh_interval,
            snapshot: RwLock::new(snapshot),
        }
    }

    /// Build every configured source and a store over them
    pub fn from_config(config: &GlassConfig) -> Result<Self> {
        let sources = config
            .sources
            .iter()
            .map(|c| {
                source::from_config(c, &config.cache)
                    .map_err(|e| anyhow!("Failed to set up source {}: {}", c.name, e))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(sources, config.refresh_interval()))
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    pub fn source(&self, source_id: SourceId) -> Option<Arc<dyn Source>> {
        self.sources.get(&source_id).cloned()
    }

    pub fn source_ids(&self) -> Vec<SourceId> {
        self.sources.keys().copied().collect()
    }

    // =========================================================================
    // Refresh
    // =========================================================================

    /// Refresh one source, unless a refresh of it is already running
    pub fn update_source(&self, source_id: SourceId) -> RefreshOutcome {
        let Some(source) = self.source(source_id) else {
            return RefreshOutcome::Skipped;
        };

        {
            let mut snapshot = self.write();
            let status = snapshot.status.entry(source_id).or_default();
            if status.state == StoreState::Updating {
                return RefreshOutcome::Skipped;
            }
            status.state = StoreState::Updating;
        }

        let start = Instant::now();
        // a panicking source must not leave its state stuck in UPDATING
        let result = panic::catch_unwind(AssertUnwindSafe(|| source.neighbours()))
            .unwrap_or_else(|payload| Err(panic_error(payload)));

        let mut snapshot = self.write();
        match result {
            Ok(response) => {
                let index: HashMap<String, Neighbour> = response
                    .neighbours
                    .iter()
                    .map(|n| (n.id.clone(), n.clone()))
                    .collect();
                let count = index.len();
                snapshot.neighbours.insert(source_id, index);
                snapshot.status.insert(
                    source_id,
                    StoreStatus {
                        state: StoreState::Ready,
                        last_refresh: Some(Utc::now()),
                        last_error: None,
                    },
                );
                info!(
                    "Refreshed neighbours of {}: {} neighbours in {:?}",
                    source.name(),
                    count,
                    start.elapsed()
                );
                RefreshOutcome::Updated(count)
            }
            Err(e) => {
                error!("Refreshing neighbours of {} failed: {}", source.name(), e);
                snapshot.status.insert(
                    source_id,
                    StoreStatus {
                        state: StoreState::Error,
                        last_refresh: Some(Utc::now()),
                        last_error: Some(e.clone()),
                    },
                );
                RefreshOutcome::Failed(e)
            }
        }
    }

    /// Refresh every source in turn, returning how many succeeded
    pub fn refresh_all(&self) -> usize {
        self.sources
            .keys()
            .filter(|id| matches!(self.update_source(**id), RefreshOutcome::Updated(_)))
            .count()
    }

    /// Purge expired route caches of every source
    pub fn expire_caches(&self) -> usize {
        let count: usize = self.sources.values().map(|s| s.expire_caches()).sum();
        if count > 0 {
            info!("Expired {} cached route responses", count);
        }
        count
    }

    /// Start the periodic refresh: one cycle right away, then every interval
    pub fn start_refresh(self: &Arc<Self>) -> std::io::Result<BackgroundTask> {
        let store = Arc::clone(self);
        BackgroundTask::spawn("neighbours-refresh", self.refresh_interval, true, move || {
            store.refresh_all();
            store.stats().log();
        })
    }

    /// Start the periodic route cache expiry
    pub fn start_housekeeping(
        self: &Arc<Self>,
        interval: Duration,
    ) -> std::io::Result<BackgroundTask> {
        let store = Arc::clone(self);
        BackgroundTask::spawn("cache-housekeeping", interval, false, move || {
            store.expire_caches();
        })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn get_neighbour_at(&self, source_id: SourceId, id: &str) -> Option<Neighbour> {
        self.read()
            .neighbours
            .get(&source_id)
            .and_then(|index| index.get(id))
            .cloned()
    }

    /// All neighbours of a source ordered by ASN then id
    pub fn neighbours_at(&self, source_id: SourceId) -> Vec<Neighbour> {
        let mut neighbours: Vec<Neighbour> = self
            .read()
            .neighbours
            .get(&source_id)
            .map(|index| index.values().cloned().collect())
            .unwrap_or_default();
        neighbours.sort_by(|a, b| a.asn.cmp(&b.asn).then_with(|| a.id.cmp(&b.id)));
        neighbours
    }

    /// Neighbours whose description contains `query`, ignoring case
    pub fn lookup_neighbours_at(&self, source_id: SourceId, query: &str) -> Vec<Neighbour> {
        let query = query.to_lowercase();
        self.read()
            .neighbours
            .get(&source_id)
            .map(|index| {
                index
                    .values()
                    .filter(|n| n.description.to_lowercase().contains(&query))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn lookup_neighbours(&self, query: &str) -> NeighboursLookupResults {
        self.sources
            .keys()
            .map(|id| (*id, self.lookup_neighbours_at(*id, query)))
            .collect()
    }

    pub fn status_of(&self, source_id: SourceId) -> Option<StoreStatus> {
        self.read().status.get(&source_id).cloned()
    }

    pub fn stats(&self) -> NeighboursStoreStats {
        let snapshot = self.read();
        let route_servers: Vec<RouteServerStats> = self
            .sources
            .iter()
            .map(|(id, source)| {
                let status = snapshot.status.get(id).cloned().unwrap_or_default();
                RouteServerStats {
                    id: *id,
                    name: source.name().to_string(),
                    state: status.state,
                    neighbours: snapshot.neighbours.get(id).map(|n| n.len()).unwrap_or(0),
                    updated_at: status.last_refresh,
                    last_error: status.last_error.map(|e| e.to_string()),
                }
            })
            .collect();

        NeighboursStoreStats {
            total_neighbours: route_servers.iter().map(|rs| rs.neighbours).sum(),
            route_servers,
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Snapshot> {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Snapshot> {
        self.snapshot.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn panic_error(payload: Box<dyn Any + Send>) -> SourceError {
    let message = match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => message.to_string(),
            Err(_) => "panicked".to_string(),
        },
    };
    SourceError::Internal(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        ApiStatus, NeighboursResponse, NeighboursStatusResponse, RoutesLookupResponse,
        RoutesResponse, StatusResponse,
    };
    use crate::source::SourceResult;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Barrier, Mutex};

    struct FakeSource {
        id: SourceId,
        neighbours: Mutex<Vec<Neighbour>>,
        failing: AtomicBool,
        panicking: AtomicBool,
        expired: AtomicUsize,
        /// (entered, release) barriers pausing `neighbours()`
        gate: Option<(Arc<Barrier>, Arc<Barrier>)>,
    }

    impl FakeSource {
        fn new(id: SourceId, descriptions: &[(&str, &str)]) -> Self {
            let neighbours = descriptions
                .iter()
                .enumerate()
                .map(|(i, (nid, description))| Neighbour {
                    id: nid.to_string(),
                    asn: 65000 + i as u32,
                    description: description.to_string(),
                    state: "up".to_string(),
                    route_server_id: id,
                    ..Default::default()
                })
                .collect();
            Self {
                id,
                neighbours: Mutex::new(neighbours),
                failing: AtomicBool::new(false),
                panicking: AtomicBool::new(false),
                expired: AtomicUsize::new(0),
                gate: None,
            }
        }
    }

    impl Source for FakeSource {
        fn id(&self) -> SourceId {
            self.id
        }

        fn name(&self) -> &str {
            "rs-fake"
        }

        fn expire_caches(&self) -> usize {
            self.expired.fetch_add(1, Ordering::SeqCst);
            2
        }

        fn status(&self) -> SourceResult<StatusResponse> {
            Ok(StatusResponse::default())
        }

        fn neighbours(&self) -> SourceResult<Arc<NeighboursResponse>> {
            if let Some((entered, release)) = &self.gate {
                entered.wait();
                release.wait();
            }
            if self.panicking.load(Ordering::SeqCst) {
                panic!("protocols index out of bounds");
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(SourceError::transport("/protocols", "connection refused"));
            }
            Ok(Arc::new(NeighboursResponse {
                api: ApiStatus::default(),
                neighbours: self.neighbours.lock().unwrap().clone(),
            }))
        }

        fn neighbours_status(&self) -> SourceResult<NeighboursStatusResponse> {
            Ok(NeighboursStatusResponse::default())
        }

        fn routes(&self, _: &str) -> SourceResult<RoutesResponse> {
            Ok(RoutesResponse::default())
        }

        fn routes_received(&self, _: &str) -> SourceResult<RoutesResponse> {
            Ok(RoutesResponse::default())
        }

        fn routes_filtered(&self, _: &str) -> SourceResult<RoutesResponse> {
            Ok(RoutesResponse::default())
        }

        fn routes_not_exported(&self, _: &str) -> SourceResult<Arc<RoutesResponse>> {
            Ok(Arc::new(RoutesResponse::default()))
        }

        fn all_routes(&self) -> SourceResult<Arc<RoutesResponse>> {
            Ok(Arc::new(RoutesResponse::default()))
        }

        fn lookup_prefix(&self, _: &str) -> SourceResult<RoutesLookupResponse> {
            Ok(RoutesLookupResponse::default())
        }
    }

    fn peers() -> Vec<(&'static str, &'static str)> {
        vec![
            ("ID163_AS2342", "PEER AS2342 192.9.23.42 Customer Peer 1"),
            ("ID7254_AS2343", "PEER AS2343 192.9.23.43 Different Peer 1"),
            ("ID8283_AS2344", "PEER AS2344 192.9.23.44 3rd Peer from the sun"),
        ]
    }

    fn store(sources: Vec<Arc<dyn Source>>) -> NeighboursStore {
        NeighboursStore::new(sources, Duration::from_secs(300))
    }

    #[test]
    fn test_initial_state() {
        let store = store(vec![Arc::new(FakeSource::new(1, &peers()))]);
        let status = store.status_of(1).unwrap();
        assert_eq!(status.state, StoreState::Init);
        assert!(status.last_refresh.is_none());
        assert!(store.get_neighbour_at(1, "ID163_AS2342").is_none());
    }

    #[test]
    fn test_lookup_neighbours_at() {
        let store = store(vec![Arc::new(FakeSource::new(1, &peers()))]);
        assert_eq!(store.update_source(1), RefreshOutcome::Updated(3));

        let mut ids: Vec<String> = store
            .lookup_neighbours_at(1, "peer 1")
            .into_iter()
            .map(|n| n.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["ID163_AS2342", "ID7254_AS2343"]);

        assert!(store.lookup_neighbours_at(2, "peer").is_empty());
        let neighbour = store.get_neighbour_at(1, "ID8283_AS2344").unwrap();
        assert_eq!(neighbour.asn, 65002);
    }

    #[test]
    fn test_lookup_neighbours_across_sources() {
        let store = store(vec![
            Arc::new(FakeSource::new(1, &peers())),
            Arc::new(FakeSource::new(2, &[("R1", "Customer Peer 1 on rs2")])),
        ]);
        assert_eq!(store.refresh_all(), 2);

        let results = store.lookup_neighbours("CUSTOMER");
        assert_eq!(results.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(results[&1].len(), 1);
        assert_eq!(results[&2][0].id, "R1");
    }

    #[test]
    fn test_failure_keeps_snapshot() {
        let source = Arc::new(FakeSource::new(1, &peers()));
        let store = store(vec![source.clone()]);
        store.update_source(1);
        let first = store.status_of(1).unwrap();
        assert_eq!(first.state, StoreState::Ready);

        source.failing.store(true, Ordering::SeqCst);
        match store.update_source(1) {
            RefreshOutcome::Failed(e) => assert!(e.is_upstream()),
            other => panic!("unexpected outcome {:?}", other),
        }

        let status = store.status_of(1).unwrap();
        assert_eq!(status.state, StoreState::Error);
        assert!(status.last_error.is_some());
        assert!(status.last_refresh >= first.last_refresh);
        // stale but available
        assert_eq!(store.neighbours_at(1).len(), 3);

        // the next cycle recovers
        source.failing.store(false, Ordering::SeqCst);
        assert_eq!(store.update_source(1), RefreshOutcome::Updated(3));
        assert_eq!(store.status_of(1).unwrap().state, StoreState::Ready);
    }

    #[test]
    fn test_panicking_source_recorded_as_error() {
        let source = Arc::new(FakeSource::new(1, &peers()));
        let store = store(vec![source.clone()]);
        assert_eq!(store.update_source(1), RefreshOutcome::Updated(3));

        source.panicking.store(true, Ordering::SeqCst);
        match store.update_source(1) {
            RefreshOutcome::Failed(SourceError::Internal(message)) => {
                assert_eq!(message, "protocols index out of bounds")
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        let status = store.status_of(1).unwrap();
        assert_eq!(status.state, StoreState::Error);
        assert!(status.last_refresh.is_some());
        assert_eq!(store.neighbours_at(1).len(), 3);

        // not stuck in UPDATING, the next cycle runs
        source.panicking.store(false, Ordering::SeqCst);
        assert_eq!(store.update_source(1), RefreshOutcome::Updated(3));
    }

    #[test]
    fn test_refresh_skipped_while_updating() {
        let entered = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));
        let mut source = FakeSource::new(1, &peers());
        source.gate = Some((entered.clone(), release.clone()));
        let store = Arc::new(store(vec![Arc::new(source)]));

        let background = {
            let store = store.clone();
            std::thread::spawn(move || store.update_source(1))
        };

        entered.wait();
        assert_eq!(store.status_of(1).unwrap().state, StoreState::Updating);
        assert_eq!(store.update_source(1), RefreshOutcome::Skipped);
        assert!(store.neighbours_at(1).is_empty());
        release.wait();

        assert_eq!(background.join().unwrap(), RefreshOutcome::Updated(3));
        assert_eq!(store.neighbours_at(1).len(), 3);
    }

    #[test]
    fn test_stats() {
        let failing = Arc::new(FakeSource::new(2, &[]));
        failing.failing.store(true, Ordering::SeqCst);
        let store = store(vec![Arc::new(FakeSource::new(1, &peers())), failing]);
        store.refresh_all();

        let stats = store.stats();
        assert_eq!(stats.total_neighbours, 3);
        assert_eq!(stats.route_servers.len(), 2);
        assert_eq!(stats.route_servers[0].state, StoreState::Ready);
        assert_eq!(stats.route_servers[1].state, StoreState::Error);
        assert!(stats.route_servers[1].last_error.is_some());

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["route_servers"][0]["state"], "READY");
        stats.log();
    }

    #[test]
    fn test_expire_caches_fans_out() {
        let a = Arc::new(FakeSource::new(1, &[]));
        let b = Arc::new(FakeSource::new(2, &[]));
        let store = store(vec![a.clone(), b.clone()]);
        assert_eq!(store.expire_caches(), 4);
        assert_eq!(a.expired.load(Ordering::SeqCst), 1);
        assert_eq!(b.expired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_background_refresh() {
        let store = Arc::new(store(vec![Arc::new(FakeSource::new(1, &peers()))]));
        let task = store.start_refresh().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while store.status_of(1).unwrap().state != StoreState::Ready {
            assert!(Instant::now() < deadline, "initial refresh did not run");
            std::thread::sleep(Duration::from_millis(5));
        }
        task.shutdown();
        assert_eq!(store.neighbours_at(1).len(), 3);
    }
}
