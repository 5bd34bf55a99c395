use crate::model::{CacheableResponse, NeighboursResponse};
use std::sync::{Arc, PoisonError, RwLock};

/// Single-slot TTL cache for a source's neighbour list
pub struct NeighboursCache {
    disabled: bool,
    response: RwLock<Option<Arc<NeighboursResponse>>>,
}

impl NeighboursCache {
    pub fn new(disabled: bool) -> Self {
        Self {
            disabled,
            response: RwLock::new(None),
        }
    }

    /// The cached response, unless the cache is disabled or the TTL elapsed
    pub fn get(&self) -> Option<Arc<NeighboursResponse>> {
        if self.disabled {
            return None;
        }

        let slot = self.response.read().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(response) if !response.is_expired() => Some(Arc::clone(response)),
            _ => None,
        }
    }

    pub fn set(&self, response: Arc<NeighboursResponse>) {
        if self.disabled {
            return;
        }

        let mut slot = self
            .response
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(response);
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }
}

impl Default for NeighboursCache {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ApiStatus, Neighbour};
    use chrono::{Duration, Utc};

    fn response(ttl_secs: i64) -> Arc<NeighboursResponse> {
        Arc::new(NeighboursResponse {
            api: ApiStatus {
                ttl: Utc::now() + Duration::seconds(ttl_secs),
                ..Default::default()
            },
            neighbours: vec![Neighbour {
                id: "R192_175".to_string(),
                ..Default::default()
            }],
        })
    }

    #[test]
    fn test_get_within_ttl() {
        let cache = NeighboursCache::new(false);
        assert!(cache.get().is_none());

        let stored = response(300);
        cache.set(Arc::clone(&stored));

        let cached = cache.get().unwrap();
        assert!(Arc::ptr_eq(&cached, &stored));
        assert_eq!(cached.neighbours[0].id, "R192_175");
    }

    #[test]
    fn test_expired_is_a_miss() {
        let cache = NeighboursCache::new(false);
        cache.set(response(-1));
        assert!(cache.get().is_none());

        // a fresh set replaces the stale slot
        cache.set(response(60));
        assert!(cache.get().is_some());
    }

    #[test]
    fn test_disabled_never_stores() {
        let cache = NeighboursCache::new(true);
        cache.set(response(300));
        assert!(cache.is_disabled());
        assert!(cache.get().is_none());
    }
}
