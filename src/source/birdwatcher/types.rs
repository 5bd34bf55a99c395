//! Birdwatcher JSON payloads
//!
//! Fields are lenient: birdwatcher omits or nulls whatever BIRD did not report,
//! and several numeric attributes arrive as strings depending on its version.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Treat an explicit `null` like an absent key
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Api {
    #[serde(rename = "Version", alias = "version", deserialize_with = "null_as_default")]
    pub version: String,
    #[serde(deserialize_with = "null_as_default")]
    pub result_from_cache: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub cache_status: CacheStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheStatus {
    #[serde(deserialize_with = "null_as_default")]
    pub cached_at: CachedAt,
    #[serde(deserialize_with = "null_as_default")]
    pub orig_ttl: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CachedAt {
    pub date: Option<String>,
    pub timezone_type: Option<Value>,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StatusResponse {
    #[serde(deserialize_with = "null_as_default")]
    pub api: Api,
    #[serde(deserialize_with = "null_as_default")]
    pub status: BirdStatus,
    pub ttl: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BirdStatus {
    pub current_server: Option<String>,
    pub last_reboot: Option<String>,
    pub last_reconfig: Option<String>,
    pub message: Option<String>,
    pub router_id: Option<String>,
    pub version: Option<String>,
}

/// `/protocols` listing; the neighbour summary uses the same shape under `neighbors`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProtocolsResponse {
    #[serde(deserialize_with = "null_as_default")]
    pub api: Api,
    #[serde(alias = "neighbors", deserialize_with = "null_as_default")]
    pub protocols: BTreeMap<String, Protocol>,
    pub ttl: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Protocol {
    /// `BGP`, `Pipe`, `Kernel`, ...
    #[serde(deserialize_with = "null_as_default")]
    pub bird_protocol: String,
    pub description: Option<String>,
    pub neighbor_address: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub neighbor_as: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub protocol: String,
    #[serde(deserialize_with = "null_as_default")]
    pub routes: ProtocolRoutes,
    pub state: Option<String>,
    pub state_changed: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub table: String,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct ProtocolRoutes {
    #[serde(deserialize_with = "null_as_default")]
    pub imported: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub filtered: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub exported: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub preferred: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProtocolsShortResponse {
    #[serde(deserialize_with = "null_as_default")]
    pub api: Api,
    #[serde(deserialize_with = "null_as_default")]
    pub protocols: BTreeMap<String, ProtocolShort>,
    pub ttl: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProtocolShort {
    #[serde(deserialize_with = "null_as_default")]
    pub info: String,
    #[serde(deserialize_with = "null_as_default")]
    pub proto: String,
    pub since: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub state: String,
    #[serde(deserialize_with = "null_as_default")]
    pub table: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RoutesResponse {
    #[serde(deserialize_with = "null_as_default")]
    pub api: Api,
    #[serde(deserialize_with = "null_as_default")]
    pub routes: Vec<Route>,
    pub ttl: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Route {
    pub age: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub bgp: Bgp,
    pub from_protocol: Option<String>,
    pub gateway: Option<String>,
    pub interface: Option<String>,
    pub learnt_from: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub metric: i64,
    pub network: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub primary: bool,
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub route_type: Vec<String>,

    /// Anything else birdwatcher reported for this route
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Bgp {
    #[serde(deserialize_with = "null_as_default")]
    pub as_path: Vec<Value>,
    #[serde(deserialize_with = "null_as_default")]
    pub communities: Vec<Vec<Value>>,
    #[serde(deserialize_with = "null_as_default")]
    pub large_communities: Vec<Vec<Value>>,
    #[serde(deserialize_with = "null_as_default")]
    pub ext_communities: Vec<Vec<Value>>,
    pub local_pref: Value,
    pub med: Value,
    pub next_hop: Option<String>,
    pub origin: Option<String>,
}

/// `/routes/pipe/filtered/count` answer
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CountResponse {
    #[serde(deserialize_with = "null_as_default")]
    pub api: Api,
    pub routes: Option<u64>,
    pub ttl: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lenient_route() {
        let route: Route = serde_json::from_value(json!({
            "network": "10.0.0.0/24",
            "gateway": "192.0.2.10",
            "from_protocol": "R192_10",
            "metric": 100,
            "type": ["BGP", "unicast", "univ"],
            "bgp": {
                "as_path": ["65010", 65020],
                "local_pref": "100",
                "med": null,
                "communities": [[65000, 1]]
            },
            "primary": true,
            "otc": "65010"
        }))
        .unwrap();

        assert_eq!(route.network.as_deref(), Some("10.0.0.0/24"));
        assert_eq!(route.bgp.as_path.len(), 2);
        assert_eq!(route.extra.get("otc"), Some(&json!("65010")));
        assert!(route.age.is_none());
    }

    #[test]
    fn test_null_fields_read_as_defaults() {
        let protocols: ProtocolsResponse = serde_json::from_value(json!({
            "api": {"Version": "2.0.0", "result_from_cache": null},
            "protocols": {
                "R1": {
                    "bird_protocol": "BGP",
                    "neighbor_as": 65010,
                    "table": "T1",
                    "routes": {"imported": 10, "filtered": null}
                },
                "K1": {"bird_protocol": "Kernel", "neighbor_as": null, "routes": null, "table": null}
            }
        }))
        .unwrap();

        assert_eq!(protocols.protocols["K1"].neighbor_as, 0);
        assert_eq!(protocols.protocols["K1"].routes.imported, 0);
        assert_eq!(protocols.protocols["K1"].table, "");
        assert_eq!(protocols.protocols["R1"].routes.imported, 10);
        assert_eq!(protocols.protocols["R1"].routes.filtered, 0);
        assert!(!protocols.api.result_from_cache);

        let route: Route = serde_json::from_value(json!({
            "network": "10.0.0.0/24",
            "metric": null,
            "primary": null,
            "type": null,
            "bgp": {"as_path": null, "communities": null}
        }))
        .unwrap();
        assert_eq!(route.metric, 0);
        assert!(route.route_type.is_empty());
        assert!(route.bgp.as_path.is_empty());
    }

    #[test]
    fn test_summary_uses_neighbors_key() {
        let summary: ProtocolsResponse = serde_json::from_value(json!({
            "api": {"Version": "2.0.0"},
            "ttl": "2030-01-01T00:00:00Z",
            "neighbors": {
                "R192_10": {"bird_protocol": "BGP", "neighbor_as": 65010, "state": "Established"}
            }
        }))
        .unwrap();
        assert_eq!(summary.protocols.len(), 1);
        assert_eq!(summary.protocols["R192_10"].neighbor_as, 65010);
    }
}
