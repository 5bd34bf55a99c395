use crate::model::{ApiStatus, SourceId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// One BGP session on a route server
///
/// Neighbours are rebuilt wholesale on every refresh of their source and are
/// never patched field by field afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Neighbour {
    /// Protocol / session identifier, unique per source
    pub id: String,

    pub address: String,
    pub asn: u32,
    /// Lower-cased session state (`up`, `down`, `start`, ...)
    pub state: String,
    pub description: String,

    pub routes_received: u64,
    pub routes_filtered: u64,
    pub routes_exported: u64,
    pub routes_preferred: u64,
    pub routes_accepted: u64,
    /// Part of `routes_filtered` rejected by the pipe into the master table
    pub routes_pipe_filtered: u64,

    /// Time since the last state change
    #[serde(with = "crate::time::duration_secs")]
    pub uptime: Duration,
    pub last_error: String,

    pub route_server_id: SourceId,

    /// Backend specific extras
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl Neighbour {
    pub fn is_up(&self) -> bool {
        self.state == "up"
    }

    /// Move `count` routes from accepted to filtered, keeping
    /// `routes_received == routes_accepted + routes_filtered`.
    pub fn reclassify_as_filtered(&mut self, count: u64) {
        let count = count.min(self.routes_accepted);
        self.routes_accepted -= count;
        self.routes_filtered += count;
        self.routes_pipe_filtered += count;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NeighboursResponse {
    pub api: ApiStatus,
    pub neighbours: Vec<Neighbour>,
}

/// Short session state, as returned by the uncached status endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NeighbourStatus {
    pub id: String,
    pub state: String,
    #[serde(with = "crate::time::duration_secs")]
    pub since: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NeighboursStatusResponse {
    pub api: ApiStatus,
    pub neighbours: Vec<NeighbourStatus>,
}

/// Neighbour search results keyed by source
pub type NeighboursLookupResults = BTreeMap<SourceId, Vec<Neighbour>>;
