use crate::model::{ApiStatus, Neighbour, SourceId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// Standard (2 elements) or large (3 elements) BGP community
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Community(pub Vec<u32>);

impl fmt::Display for Community {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|v| v.to_string()).collect();
        write!(f, "{}", parts.join(":"))
    }
}

/// Extended BGP community, e.g. `("rt", "65000", "1")`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtCommunity(pub Vec<String>);

impl fmt::Display for ExtCommunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(":"))
    }
}

/// BGP attributes of a route
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BgpInfo {
    pub origin: String,
    pub as_path: Vec<u32>,
    pub next_hop: String,
    pub communities: Vec<Community>,
    pub large_communities: Vec<Community>,
    pub ext_communities: Vec<ExtCommunity>,
    pub local_pref: u32,
    pub med: u32,
}

impl BgpInfo {
    /// AS path as space separated ASNs, e.g. `64500 64501`
    pub fn as_path_string(&self) -> String {
        self.as_path
            .iter()
            .map(|asn| asn.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Exact match against a standard community
    pub fn has_community(&self, community: &Community) -> bool {
        community.0.len() == 2 && self.communities.iter().any(|c| c == community)
    }

    /// Exact match against a large community
    pub fn has_large_community(&self, community: &Community) -> bool {
        community.0.len() == 3 && self.large_communities.iter().any(|c| c == community)
    }

    /// Exact match against an extended community
    pub fn has_ext_community(&self, community: &ExtCommunity) -> bool {
        community.0.len() == 3 && self.ext_communities.iter().any(|c| c == community)
    }
}

/// One RIB entry
///
/// The identity of a route is its `id` (derived from the network) together
/// with the `neighbour_id` it was learnt from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    pub neighbour_id: String,

    pub network: String,
    pub interface: String,
    pub gateway: String,
    pub metric: i64,
    pub learnt_from: Option<String>,
    pub bgp: BgpInfo,
    #[serde(with = "crate::time::duration_secs")]
    pub age: Duration,
    /// Route type tags, e.g. `["BGP", "unicast", "univ"]`
    #[serde(rename = "type")]
    pub route_type: Vec<String>,
    pub primary: bool,

    #[serde(default)]
    pub details: Map<String, Value>,
}

/// Sort routes by network for reproducible output
pub fn sort_routes(routes: &mut [Route]) {
    routes.sort_by(|a, b| a.network.cmp(&b.network));
}

/// Routes of a neighbour, partitioned by final disposition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutesResponse {
    pub api: ApiStatus,
    pub imported: Vec<Route>,
    pub filtered: Vec<Route>,
    pub not_exported: Vec<Route>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteServer {
    pub id: SourceId,
    pub name: String,
}

/// A route found by a prefix lookup, annotated with where it was found
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LookupRoute {
    pub id: String,
    pub neighbour_id: String,
    pub neighbour: Option<Neighbour>,
    /// `imported`, `filtered`, ...
    pub state: String,
    pub route_server: RouteServer,

    pub network: String,
    pub interface: String,
    pub gateway: String,
    pub metric: i64,
    pub bgp: BgpInfo,
    #[serde(with = "crate::time::duration_secs")]
    pub age: Duration,
    #[serde(rename = "type")]
    pub route_type: Vec<String>,
    pub primary: bool,

    #[serde(default)]
    pub details: Map<String, Value>,
}

impl LookupRoute {
    pub fn from_route(route: Route, state: &str, route_server: RouteServer) -> Self {
        Self {
            id: route.id,
            neighbour_id: route.neighbour_id,
            neighbour: None,
            state: state.to_string(),
            route_server,
            network: route.network,
            interface: route.interface,
            gateway: route.gateway,
            metric: route.metric,
            bgp: route.bgp,
            age: route.age,
            route_type: route.route_type,
            primary: route.primary,
            details: route.details,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutesLookupResponse {
    pub api: ApiStatus,
    pub routes: Vec<LookupRoute>,
}
