use crate::model::SourceId;
use crate::source::SourceError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::info;

/// Refresh lifecycle of one source in the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StoreState {
    #[default]
    Init,
    Updating,
    Ready,
    Error,
}

impl fmt::Display for StoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StoreState::Init => "INIT",
            StoreState::Updating => "UPDATING",
            StoreState::Ready => "READY",
            StoreState::Error => "ERROR",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStatus {
    pub state: StoreState,
    /// End of the last refresh attempt, successful or not
    pub last_refresh: Option<DateTime<Utc>>,
    pub last_error: Option<SourceError>,
}

/// What a single source refresh did
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// Snapshot replaced with this many neighbours
    Updated(usize),
    /// Previous refresh still running, nothing touched
    Skipped,
    /// Snapshot kept, source marked as failed
    Failed(SourceError),
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteServerStats {
    pub id: SourceId,
    pub name: String,
    pub state: StoreState,
    pub neighbours: usize,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NeighboursStoreStats {
    pub total_neighbours: usize,
    pub route_servers: Vec<RouteServerStats>,
}

impl NeighboursStoreStats {
    pub fn log(&self) {
        info!("Neighbours store: {} neighbours", self.total_neighbours);
        for rs in &self.route_servers {
            let updated = rs
                .updated_at
                .map(crate::time::humanize)
                .unwrap_or_else(|| "never".to_string());
            match &rs.last_error {
                Some(e) => info!(
                    "  {} ({}): {} neighbours, {}, updated {}, last error: {}",
                    rs.name, rs.id, rs.neighbours, rs.state, updated, e
                ),
                None => info!(
                    "  {} ({}): {} neighbours, {}, updated {}",
                    rs.name, rs.id, rs.neighbours, rs.state, updated
                ),
            }
        }
    }
}
