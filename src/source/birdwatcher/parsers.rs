//! Mapping of birdwatcher payloads onto the canonical model
//!
//! Everything here is pure apart from logging: malformed optional fields are
//! dropped with a warning, only an unparseable TTL is an error.

use crate::model::{
    sort_routes, ApiStatus, BgpInfo, CacheStatus, Community, ExtCommunity, Neighbour,
    NeighbourStatus, Route, SourceId, Status,
};
use crate::source::birdwatcher::types;
use crate::source::error::{SourceError, SourceResult};
use crate::time::ServerTimeSettings;
use serde_json::Value;
use tracing::warn;

/// Build the API status header of a response fetched from `path`
pub fn parse_api_status(
    path: &str,
    api: &types::Api,
    ttl: Option<&str>,
    settings: &ServerTimeSettings,
) -> SourceResult<ApiStatus> {
    let ttl = settings
        .parse_ttl(ttl)
        .map_err(|e| SourceError::decode(path, e))?;

    Ok(ApiStatus {
        version: api.version.clone(),
        cache_status: parse_cache_status(&api.cache_status, settings),
        result_from_cache: api.result_from_cache,
        ttl,
    })
}

fn parse_cache_status(status: &types::CacheStatus, settings: &ServerTimeSettings) -> CacheStatus {
    let cached_at = status.cached_at.date.as_deref().and_then(|date| {
        chrono::DateTime::parse_from_rfc3339(date)
            .map(|t| t.with_timezone(&chrono::Utc))
            .or_else(|_| settings.parse(date))
            .ok()
    });

    CacheStatus {
        cached_at,
        orig_ttl: status.orig_ttl,
    }
}

pub fn parse_status(
    bird: &types::BirdStatus,
    settings: &ServerTimeSettings,
    show_last_reboot: bool,
) -> Status {
    let short = |value: &Option<String>| value.as_deref().and_then(|v| settings.parse_short(v).ok());

    Status {
        server_time: short(&bird.current_server),
        last_reboot: if show_last_reboot {
            short(&bird.last_reboot)
        } else {
            None
        },
        last_reconfig: bird
            .last_reconfig
            .as_deref()
            .and_then(|v| settings.parse_ext(v).ok()),
        message: or_unknown(&bird.message),
        router_id: or_unknown(&bird.router_id),
        version: or_unknown(&bird.version),
        backend: "bird".to_string(),
    }
}

fn or_unknown(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| "unknown".to_string())
}

/// Map BGP protocols onto neighbours, ordered by ASN then id
pub fn parse_neighbours<'a>(
    protocols: impl IntoIterator<Item = (&'a String, &'a types::Protocol)>,
    source_id: SourceId,
    settings: &ServerTimeSettings,
) -> Vec<Neighbour> {
    let mut neighbours: Vec<Neighbour> = protocols
        .into_iter()
        .map(|(id, proto)| parse_neighbour(id, proto, source_id, settings))
        .collect();

    neighbours.sort_by(|a, b| a.asn.cmp(&b.asn).then_with(|| a.id.cmp(&b.id)));
    neighbours
}

fn parse_neighbour(
    id: &str,
    proto: &types::Protocol,
    source_id: SourceId,
    settings: &ServerTimeSettings,
) -> Neighbour {
    let routes = proto.routes;

    Neighbour {
        id: id.to_string(),
        address: proto
            .neighbor_address
            .clone()
            .unwrap_or_else(|| "error".to_string()),
        asn: proto.neighbor_as,
        state: proto
            .state
            .as_deref()
            .unwrap_or("unknown")
            .to_lowercase(),
        description: proto
            .description
            .clone()
            .unwrap_or_else(|| "no description".to_string()),
        routes_received: routes.imported + routes.filtered,
        routes_filtered: routes.filtered,
        routes_exported: routes.exported,
        routes_preferred: routes.preferred,
        routes_accepted: routes.imported,
        routes_pipe_filtered: 0,
        uptime: settings.parse_relative(proto.state_changed.as_deref()),
        last_error: proto.last_error.clone().unwrap_or_default(),
        route_server_id: source_id,
        details: Default::default(),
    }
}

/// Short session states, ordered by id
pub fn parse_neighbours_short<'a>(
    protocols: impl IntoIterator<Item = (&'a String, &'a types::ProtocolShort)>,
    settings: &ServerTimeSettings,
) -> Vec<NeighbourStatus> {
    let mut neighbours: Vec<NeighbourStatus> = protocols
        .into_iter()
        .map(|(id, proto)| NeighbourStatus {
            id: id.clone(),
            state: proto.state.clone(),
            since: settings.parse_relative(proto.since.as_deref()),
        })
        .collect();

    neighbours.sort_by(|a, b| a.id.cmp(&b.id));
    neighbours
}

/// Map routes without touching their order
pub fn parse_routes_data(routes: &[types::Route], settings: &ServerTimeSettings) -> Vec<Route> {
    routes.iter().map(|r| parse_route(r, settings)).collect()
}

/// Map routes and sort them by network
pub fn parse_routes(routes: &[types::Route], settings: &ServerTimeSettings) -> Vec<Route> {
    let mut routes = parse_routes_data(routes, settings);
    sort_routes(&mut routes);
    routes
}

fn parse_route(data: &types::Route, settings: &ServerTimeSettings) -> Route {
    let network = data.network.clone().unwrap_or_else(|| "unknown".to_string());

    Route {
        id: network.clone(),
        neighbour_id: data
            .from_protocol
            .clone()
            .unwrap_or_else(|| "unknown neighbour".to_string()),
        network,
        interface: data
            .interface
            .clone()
            .unwrap_or_else(|| "unknown interface".to_string()),
        gateway: data
            .gateway
            .clone()
            .unwrap_or_else(|| "unknown gateway".to_string()),
        metric: data.metric,
        learnt_from: data.learnt_from.clone().filter(|l| !l.is_empty()),
        bgp: parse_bgp_info(&data.bgp),
        age: settings.parse_relative(data.age.as_deref()),
        route_type: data.route_type.clone(),
        primary: data.primary,
        details: data.extra.clone(),
    }
}

pub fn parse_bgp_info(data: &types::Bgp) -> BgpInfo {
    BgpInfo {
        origin: data.origin.clone().unwrap_or_else(|| "unknown".to_string()),
        as_path: data.as_path.iter().filter_map(value_to_u32).collect(),
        next_hop: data.next_hop.clone().unwrap_or_else(|| "unknown".to_string()),
        communities: parse_communities(&data.communities, 2, "community"),
        large_communities: parse_communities(&data.large_communities, 3, "large community"),
        ext_communities: parse_ext_communities(&data.ext_communities),
        local_pref: value_to_u32(&data.local_pref).unwrap_or(0),
        med: value_to_u32(&data.med).unwrap_or(0),
    }
}

/// Integer from a JSON number or numeric string
fn value_to_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_communities(data: &[Vec<Value>], arity: usize, kind: &str) -> Vec<Community> {
    data.iter()
        .filter_map(|raw| {
            let parts: Option<Vec<u32>> = raw.iter().map(value_to_u32).collect();
            match parts {
                Some(parts) if parts.len() == arity => Some(Community(parts)),
                _ => {
                    warn!("Ignoring malformed {}: {:?}", kind, raw);
                    None
                }
            }
        })
        .collect()
}

fn parse_ext_communities(data: &[Vec<Value>]) -> Vec<ExtCommunity> {
    data.iter()
        .filter_map(|raw| {
            if raw.len() != 3 {
                warn!("Ignoring malformed ext community: {:?}", raw);
                return None;
            }
            let parts = raw
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            Some(ExtCommunity(parts))
        })
        .collect()
}
