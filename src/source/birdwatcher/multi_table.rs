//! Multi-table birdwatcher source
//!
//! In a multi-table BIRD setup every session imports into its own peer table
//! (`T<n>`), which a pipe protocol (`M<n>`) merges into the master table. Routes
//! can therefore be rejected twice: by the session import filter (stage 1) and
//! by the pipe (stage 2). This source reconciles the birdwatcher endpoints
//! exposing both stages into one imported/filtered/not-exported view.

use crate::cache::{LockMap, NeighboursCache, RoutesCache};
use crate::config::{CacheSettings, SourceConfig, TableLayout};
use crate::model::{
    sort_routes, ApiStatus, LookupRoute, NeighboursResponse, NeighboursStatusResponse, Route,
    RouteServer, RoutesLookupResponse, RoutesResponse, SourceId, StatusResponse,
};
use crate::source::birdwatcher::client::{display_path, Client, NEIGHBOR_SUMMARY_ENDPOINT};
use crate::source::birdwatcher::parsers::{
    parse_api_status, parse_neighbours, parse_neighbours_short, parse_routes, parse_status,
};
use crate::source::birdwatcher::types::{Api, Protocol, ProtocolsResponse};
use crate::source::error::{SourceError, SourceResult};
use crate::source::Source;
use crate::time::ServerTimeSettings;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Routes cache key of the whole master table
pub const ALL_ROUTES_KEY: &str = "*";

pub struct MultiTableBirdwatcher {
    id: SourceId,
    name: String,
    peer_table_prefix: String,
    pipe_protocol_prefix: String,
    show_last_reboot: bool,
    /// Whether `/neighbors/summary` exists, learnt on the first neighbours fetch
    neighbor_summary: OnceLock<bool>,

    settings: ServerTimeSettings,
    client: Client,

    neighbours_cache: NeighboursCache,
    routes_required_cache: RoutesCache,
    routes_not_exported_cache: RoutesCache,

    /// One in-flight required-routes fetch per neighbour
    routes_fetch_locks: LockMap,
}

impl MultiTableBirdwatcher {
    /// Source talking HTTP to the configured birdwatcher API
    pub fn new(config: &SourceConfig, cache: &CacheSettings) -> SourceResult<Self> {
        Self::with_client(config, cache, Client::http(&config.birdwatcher.api))
    }

    pub fn with_client(
        config: &SourceConfig,
        cache: &CacheSettings,
        client: Client,
    ) -> SourceResult<Self> {
        let bw = &config.birdwatcher;
        if bw.layout != TableLayout::MultiTable {
            return Err(SourceError::Config(format!(
                "source {} uses an unsupported table layout: {:?}",
                config.id, bw.layout
            )));
        }

        let settings = bw
            .time_settings()
            .map_err(|e| SourceError::Config(e.to_string()))?;

        let neighbor_summary = OnceLock::new();
        if bw.disable_neighbor_summary {
            info!(
                "Neighbor summary disabled for {}, using protocols listing",
                config.name
            );
            let _ = neighbor_summary.set(false);
        }

        Ok(Self {
            id: config.id,
            name: config.name.clone(),
            peer_table_prefix: bw.peer_table_prefix.clone(),
            pipe_protocol_prefix: bw.pipe_protocol_prefix.clone(),
            show_last_reboot: bw.show_last_reboot,
            neighbor_summary,
            settings,
            client,
            neighbours_cache: NeighboursCache::new(cache.neighbours_disabled),
            routes_required_cache: RoutesCache::new(cache.routes_disabled, cache.routes_max_size),
            routes_not_exported_cache: RoutesCache::new(
                cache.routes_disabled,
                cache.routes_max_size,
            ),
            routes_fetch_locks: LockMap::new(),
        })
    }

    /// `None` until the first neighbours fetch found out
    pub fn has_neighbor_summary(&self) -> Option<bool> {
        self.neighbor_summary.get().copied()
    }

    /// Name of the pipe merging `table` into master, e.g. `T42` -> `M42`
    pub fn master_pipe_name(&self, table: &str) -> Option<String> {
        table
            .strip_prefix(self.peer_table_prefix.as_str())
            .map(|rest| format!("{}{}", self.pipe_protocol_prefix, rest))
    }

    fn api_status(&self, path: &str, api: &Api, ttl: Option<&str>) -> SourceResult<ApiStatus> {
        parse_api_status(path, api, ttl, &self.settings)
    }

    fn fetch_protocols(&self) -> SourceResult<ProtocolsResponse> {
        self.client.get_protocols()
    }

    fn neighbour_protocol<'a>(
        protocols: &'a ProtocolsResponse,
        neighbour_id: &str,
    ) -> SourceResult<&'a Protocol> {
        protocols
            .protocols
            .get(neighbour_id)
            .ok_or_else(|| SourceError::UnknownNeighbour(neighbour_id.to_string()))
    }

    // =========================================================================
    // Neighbours and pipe accounting
    // =========================================================================

    /// Neighbour listing from the summary when available, `/protocols` otherwise
    fn fetch_neighbours_payload(&self) -> SourceResult<(&'static str, bool, ProtocolsResponse)> {
        match self.neighbor_summary.get() {
            Some(true) => {
                let payload = self.client.get_neighbor_summary()?;
                return Ok((NEIGHBOR_SUMMARY_ENDPOINT, true, payload));
            }
            Some(false) => return Ok(("/protocols", false, self.fetch_protocols()?)),
            None => {}
        }

        match self.client.get_neighbor_summary() {
            Ok(payload) => {
                info!("Using neighbor summary capabilities on {}", self.name);
                let _ = self.neighbor_summary.set(true);
                return Ok((NEIGHBOR_SUMMARY_ENDPOINT, true, payload));
            }
            // only a definite answer settles it, an unreachable upstream is asked again
            Err(e) if e.upstream_answered() => {
                info!("No neighbor summary on {}: {}", self.name, e);
                let _ = self.neighbor_summary.set(false);
            }
            Err(e) => debug!("Neighbor summary check on {} failed: {}", self.name, e),
        }
        Ok(("/protocols", false, self.fetch_protocols()?))
    }

    fn fetch_neighbours(&self) -> SourceResult<NeighboursResponse> {
        let (path, from_summary, payload) = self.fetch_neighbours_payload()?;

        let api = self.api_status(path, &payload.api, payload.ttl.as_deref())?;

        // the summary only lists sessions and may omit the protocol type
        let sessions = payload
            .protocols
            .iter()
            .filter(|(_, p)| from_summary || p.bird_protocol == "BGP");
        let mut neighbours = parse_neighbours(sessions, self.id, &self.settings);

        let pipe_filtered = self.pipe_filtered_counts(&payload.protocols);
        for neighbour in neighbours.iter_mut() {
            if let Some(count) = pipe_filtered.get(&neighbour.id) {
                neighbour.reclassify_as_filtered(*count);
            }
        }

        Ok(NeighboursResponse { api, neighbours })
    }

    /// Number of routes each session lost in the pipe to the master table
    fn pipe_filtered_counts(&self, protocols: &BTreeMap<String, Protocol>) -> HashMap<String, u64> {
        let mut tables: BTreeMap<&str, Vec<(&String, &Protocol)>> = BTreeMap::new();
        let mut pipes: HashMap<&str, &Protocol> = HashMap::new();
        for (id, protocol) in protocols {
            match protocol.bird_protocol.as_str() {
                "BGP" => tables
                    .entry(protocol.table.as_str())
                    .or_default()
                    .push((id, protocol)),
                "Pipe" => {
                    pipes.insert(id.as_str(), protocol);
                }
                _ => {}
            }
        }

        let mut filtered = HashMap::new();
        for (table, sessions) in tables {
            let Some(pipe_name) = self.master_pipe_name(table) else {
                continue;
            };
            let Some(pipe) = pipes.get(pipe_name.as_str()) else {
                continue;
            };

            let up: Vec<(&String, &Protocol)> = sessions
                .iter()
                .copied()
                .filter(|(_, p)| is_protocol_up(p))
                .collect();
            let all_imported: u64 = up.iter().map(|(_, p)| p.routes.imported).sum();
            let pipe_imported = pipe.routes.imported;

            if all_imported == 0 || pipe_imported == all_imported {
                continue;
            }

            if sessions.len() == 1 {
                for (id, _) in &up {
                    filtered.insert((*id).clone(), all_imported.saturating_sub(pipe_imported));
                }
            } else if pipe_imported == 0 {
                // the pipe rejected everything, counts are already known
                for (id, protocol) in &up {
                    filtered.insert((*id).clone(), protocol.routes.imported);
                }
            } else {
                for (id, protocol) in &up {
                    let address = protocol.neighbor_address.as_deref().unwrap_or_default();
                    let query = [
                        ("table", table),
                        ("pipe", pipe_name.as_str()),
                        ("address", address),
                    ];
                    match self
                        .client
                        .get_count("/routes/pipe/filtered/count", &query)
                    {
                        Ok(count) => {
                            if let Some(routes) = count.routes {
                                filtered.insert((*id).clone(), routes);
                            }
                        }
                        Err(e) => {
                            warn!(
                                "Could not retrieve filtered routes count for {}: {}. Is the 'pipe_filtered_count' module active in birdwatcher?",
                                id, e
                            );
                        }
                    }
                }
            }
        }

        filtered
    }

    // =========================================================================
    // Route reconciliation
    // =========================================================================

    /// Received and filtered routes of a neighbour, reconciled and cached
    fn fetch_required_routes(&self, neighbour_id: &str) -> SourceResult<Arc<RoutesResponse>> {
        if let Some(cached) = self.routes_required_cache.get(neighbour_id) {
            return Ok(cached);
        }

        self.routes_fetch_locks.with_lock(neighbour_id, || {
            // a concurrent caller may have filled the cache meanwhile
            if let Some(cached) = self.routes_required_cache.get(neighbour_id) {
                return Ok(cached);
            }

            let start = Instant::now();
            let protocols = self.fetch_protocols()?;
            let protocol = Self::neighbour_protocol(&protocols, neighbour_id)?;
            let address = protocol.neighbor_address.clone().unwrap_or_default();

            let (api, received) = self.fetch_received_routes(&address)?;

            // already logged, an absent module means no filtered facet
            let filtered = self
                .fetch_filtered_routes(neighbour_id, &protocol.table)
                .unwrap_or_default();

            let peer = received
                .first()
                .map(|r| r.gateway.clone())
                .unwrap_or(address);
            let learnt_from = received
                .first()
                .and_then(|r| r.learnt_from.clone())
                .unwrap_or_else(|| peer.clone());

            let filtered = filter_routes_by_peer_or_learnt_from(filtered, &peer, &learnt_from);
            let imported = filter_routes_by_duplicates(received, &filtered);

            debug!(
                "Fetched routes of {} on {} in {:?}: {} imported, {} filtered",
                neighbour_id,
                self.name,
                start.elapsed(),
                imported.len(),
                filtered.len()
            );

            let response = Arc::new(RoutesResponse {
                api,
                imported,
                filtered,
                not_exported: vec![],
            });
            self.routes_required_cache
                .set(neighbour_id, Arc::clone(&response));
            Ok(response)
        })
    }

    fn fetch_received_routes(&self, peer: &str) -> SourceResult<(ApiStatus, Vec<Route>)> {
        let path = format!("/routes/peer/{}", peer);
        let bird = self.client.get_routes(&path, &[])?;
        let api = self.api_status(&path, &bird.api, bird.ttl.as_deref())?;
        Ok((api, parse_routes(&bird.routes, &self.settings)))
    }

    /// Stage 1 filtered routes of the session plus stage 2 routes rejected by
    /// the pipe of its table
    fn fetch_filtered_routes(&self, neighbour_id: &str, table: &str) -> SourceResult<Vec<Route>> {
        let path = format!("/routes/filtered/{}", neighbour_id);
        let mut filtered = match self.client.get_routes(&path, &[]) {
            Ok(bird) => parse_routes(&bird.routes, &self.settings),
            Err(e) => {
                warn!(
                    "Could not retrieve filtered routes of {}: {}. Is the 'routes_filtered' module active in birdwatcher?",
                    neighbour_id, e
                );
                return Err(SourceError::module_unavailable("routes_filtered", &e));
            }
        };

        let Some(pipe_name) = self.master_pipe_name(table) else {
            return Ok(filtered);
        };

        let query = [("table", table), ("pipe", pipe_name.as_str())];
        match self.client.get_routes("/routes/pipe/filtered/", &query) {
            Ok(bird) => {
                filtered.extend(parse_routes(&bird.routes, &self.settings));
                sort_routes(&mut filtered);
            }
            Err(e) => {
                warn!(
                    "Could not retrieve pipe filtered routes of {}: {}. Is the 'pipe_filtered' module active in birdwatcher?",
                    table, e
                );
            }
        }

        Ok(filtered)
    }

    fn fetch_not_exported_routes(&self, neighbour_id: &str) -> SourceResult<RoutesResponse> {
        let protocols = self.fetch_protocols()?;
        let protocol = Self::neighbour_protocol(&protocols, neighbour_id)?;
        let address = protocol.neighbor_address.clone().unwrap_or_default();
        let fallback_api =
            self.api_status("/protocols", &protocols.api, protocols.ttl.as_deref())?;

        let Some(pipe_name) = self.master_pipe_name(&protocol.table) else {
            warn!(
                "No pipe to the master table for {} (table {})",
                neighbour_id, protocol.table
            );
            return Ok(RoutesResponse {
                api: fallback_api,
                ..Default::default()
            });
        };

        let path = format!("/routes/noexport/{}", pipe_name);
        let bird = match self.client.get_routes(&path, &[]) {
            Ok(bird) => bird,
            Err(e) => {
                warn!(
                    "Could not retrieve routes not exported of {}: {}. Is the 'routes_noexport' module active in birdwatcher?",
                    neighbour_id, e
                );
                return Ok(RoutesResponse {
                    api: fallback_api,
                    ..Default::default()
                });
            }
        };

        let api = self.api_status(&path, &bird.api, bird.ttl.as_deref())?;
        let routes = parse_routes(&bird.routes, &self.settings);
        Ok(RoutesResponse {
            api,
            not_exported: filter_routes_by_peer_or_learnt_from(routes, &address, &address),
            ..Default::default()
        })
    }

    fn fetch_all_routes(&self) -> SourceResult<RoutesResponse> {
        let protocols = self.fetch_protocols()?;

        let mut filtered = vec![];
        for (id, protocol) in protocols
            .protocols
            .iter()
            .filter(|(_, p)| p.bird_protocol == "BGP")
        {
            let peer = protocol.neighbor_address.clone().unwrap_or_default();
            let Ok(routes) = self.fetch_filtered_routes(id, &protocol.table) else {
                continue;
            };
            filtered.extend(filter_routes_by_peer_or_learnt_from(routes, &peer, &peer));
        }
        sort_routes(&mut filtered);

        let path = "/routes/table/master";
        let bird = self.client.get_routes(path, &[])?;
        let api = self.api_status(path, &bird.api, bird.ttl.as_deref())?;

        let rejected: HashSet<(&str, &str)> = filtered
            .iter()
            .map(|r| (r.neighbour_id.as_str(), r.id.as_str()))
            .collect();
        let imported: Vec<Route> = parse_routes(&bird.routes, &self.settings)
            .into_iter()
            .filter(|r| !rejected.contains(&(r.neighbour_id.as_str(), r.id.as_str())))
            .collect();

        Ok(RoutesResponse {
            api,
            imported,
            filtered,
            not_exported: vec![],
        })
    }
}

fn is_protocol_up(protocol: &Protocol) -> bool {
    protocol
        .state
        .as_deref()
        .is_some_and(|s| s.eq_ignore_ascii_case("up"))
}

/// Keep routes learnt from this neighbour; other sessions may share the table
fn filter_routes_by_peer_or_learnt_from(
    routes: Vec<Route>,
    peer: &str,
    learnt_from: &str,
) -> Vec<Route> {
    let mut routes: Vec<Route> = routes
        .into_iter()
        .filter(|r| {
            r.gateway == peer
                || r.gateway == learnt_from
                || r.learnt_from.as_deref() == Some(peer)
        })
        .collect();
    sort_routes(&mut routes);
    routes
}

/// Drop every route whose id also appears in `filtered`
fn filter_routes_by_duplicates(routes: Vec<Route>, filtered: &[Route]) -> Vec<Route> {
    let rejected: HashSet<&str> = filtered.iter().map(|r| r.id.as_str()).collect();
    let mut routes: Vec<Route> = routes
        .into_iter()
        .filter(|r| !rejected.contains(r.id.as_str()))
        .collect();
    sort_routes(&mut routes);
    routes
}

impl Source for MultiTableBirdwatcher {
    fn id(&self) -> SourceId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn expire_caches(&self) -> usize {
        let count = self.routes_required_cache.expire() + self.routes_not_exported_cache.expire();
        self.routes_fetch_locks.sweep();
        count
    }

    fn status(&self) -> SourceResult<StatusResponse> {
        let bird = self.client.get_status()?;
        let api = self.api_status("/status", &bird.api, bird.ttl.as_deref())?;
        Ok(StatusResponse {
            api,
            status: parse_status(&bird.status, &self.settings, self.show_last_reboot),
        })
    }

    fn neighbours(&self) -> SourceResult<Arc<NeighboursResponse>> {
        if let Some(cached) = self.neighbours_cache.get() {
            return Ok(cached);
        }

        let response = Arc::new(self.fetch_neighbours()?);
        self.neighbours_cache.set(Arc::clone(&response));
        Ok(response)
    }

    fn neighbours_status(&self) -> SourceResult<NeighboursStatusResponse> {
        let path = "/protocols/short?uncached=true";
        let bird = self.client.get_protocols_short()?;
        let api = self.api_status(path, &bird.api, bird.ttl.as_deref())?;

        let sessions = bird
            .protocols
            .iter()
            .filter(|(_, p)| p.proto.is_empty() || p.proto == "BGP");
        Ok(NeighboursStatusResponse {
            api,
            neighbours: parse_neighbours_short(sessions, &self.settings),
        })
    }

    fn routes(&self, neighbour_id: &str) -> SourceResult<RoutesResponse> {
        let required = self.fetch_required_routes(neighbour_id)?;
        let not_exported = self.routes_not_exported(neighbour_id)?;

        Ok(RoutesResponse {
            api: required.api.clone(),
            imported: required.imported.clone(),
            filtered: required.filtered.clone(),
            not_exported: not_exported.not_exported.clone(),
        })
    }

    fn routes_received(&self, neighbour_id: &str) -> SourceResult<RoutesResponse> {
        let required = self.fetch_required_routes(neighbour_id)?;
        Ok(RoutesResponse {
            api: required.api.clone(),
            imported: required.imported.clone(),
            ..Default::default()
        })
    }

    fn routes_filtered(&self, neighbour_id: &str) -> SourceResult<RoutesResponse> {
        let required = self.fetch_required_routes(neighbour_id)?;
        Ok(RoutesResponse {
            api: required.api.clone(),
            filtered: required.filtered.clone(),
            ..Default::default()
        })
    }

    fn routes_not_exported(&self, neighbour_id: &str) -> SourceResult<Arc<RoutesResponse>> {
        if let Some(cached) = self.routes_not_exported_cache.get(neighbour_id) {
            return Ok(cached);
        }

        let response = Arc::new(self.fetch_not_exported_routes(neighbour_id)?);
        self.routes_not_exported_cache
            .set(neighbour_id, Arc::clone(&response));
        Ok(response)
    }

    fn all_routes(&self) -> SourceResult<Arc<RoutesResponse>> {
        if let Some(cached) = self.routes_required_cache.get(ALL_ROUTES_KEY) {
            return Ok(cached);
        }

        self.routes_fetch_locks.with_lock(ALL_ROUTES_KEY, || {
            if let Some(cached) = self.routes_required_cache.get(ALL_ROUTES_KEY) {
                return Ok(cached);
            }
            let response = Arc::new(self.fetch_all_routes()?);
            self.routes_required_cache
                .set(ALL_ROUTES_KEY, Arc::clone(&response));
            Ok(response)
        })
    }

    fn lookup_prefix(&self, prefix: &str) -> SourceResult<RoutesLookupResponse> {
        let query = [("prefix", prefix.trim())];
        let bird = self.client.get_routes("/routes/prefix", &query)?;
        let path = display_path("/routes/prefix", &query);
        let api = self.api_status(&path, &bird.api, bird.ttl.as_deref())?;

        let route_server = RouteServer {
            id: self.id,
            name: self.name.clone(),
        };
        // annotate with neighbours we already know, never fetch for a lookup
        let known = self.neighbours_cache.get();

        let routes = parse_routes(&bird.routes, &self.settings)
            .into_iter()
            .map(|route| {
                let neighbour = known.as_ref().and_then(|n| {
                    n.neighbours
                        .iter()
                        .find(|n| n.id == route.neighbour_id)
                        .cloned()
                });
                let mut lookup = LookupRoute::from_route(route, "imported", route_server.clone());
                lookup.neighbour = neighbour;
                lookup
            })
            .collect();

        Ok(RoutesLookupResponse { api, routes })
    }
}
