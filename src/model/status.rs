use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata attached to every upstream answer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiStatus {
    /// Upstream software version
    pub version: String,
    pub cache_status: CacheStatus,
    /// Whether the upstream served this answer from its own cache
    pub result_from_cache: bool,
    /// Upstream declared validity; sizes our own cache entries
    pub ttl: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStatus {
    pub cached_at: Option<DateTime<Utc>>,
    pub orig_ttl: i64,
}

/// Route server status as reported by the daemon
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub server_time: Option<DateTime<Utc>>,
    pub last_reboot: Option<DateTime<Utc>>,
    pub last_reconfig: Option<DateTime<Utc>>,
    pub message: String,
    pub router_id: String,
    pub version: String,
    pub backend: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub api: ApiStatus,
    pub status: Status,
}
