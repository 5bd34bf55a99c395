use crate::model::{CacheableResponse, RoutesResponse};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct RoutesCacheEntry {
    response: Arc<RoutesResponse>,
    /// Access stamp taken from the cache's counter
    last_access: AtomicU64,
}

/// Bounded LRU cache of route snapshots keyed by neighbour id
///
/// Entries are dropped when their upstream TTL elapses (lazily on `get`, or in
/// bulk through [`RoutesCache::expire`]) and, once more than `max_size` keys
/// are stored, the least recently accessed entry is evicted.
pub struct RoutesCache {
    disabled: bool,
    max_size: usize,
    entries: DashMap<String, RoutesCacheEntry>,
    counter: AtomicU64,
}

impl RoutesCache {
    pub fn new(disabled: bool, max_size: usize) -> Self {
        Self {
            disabled,
            max_size: max_size.max(1),
            entries: DashMap::new(),
            counter: AtomicU64::new(0),
        }
    }

    fn next_stamp(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Look up a live entry and mark it as most recently used
    pub fn get(&self, key: &str) -> Option<Arc<RoutesResponse>> {
        if self.disabled {
            return None;
        }

        let entry = self.entries.get(key)?;
        if entry.response.is_expired() {
            return None;
        }
        entry.last_access.store(self.next_stamp(), Ordering::Relaxed);
        Some(Arc::clone(&entry.response))
    }

    pub fn set(&self, key: &str, response: Arc<RoutesResponse>) {
        if self.disabled {
            return;
        }

        let entry = RoutesCacheEntry {
            response,
            last_access: AtomicU64::new(self.next_stamp()),
        };
        self.entries.insert(key.to_string(), entry);

        while self.entries.len() > self.max_size {
            if !self.evict_lru() {
                break;
            }
        }
    }

    fn evict_lru(&self) -> bool {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.value().last_access.load(Ordering::Relaxed))
            .map(|e| e.key().clone());

        match oldest {
            Some(key) => self.entries.remove(&key).is_some(),
            None => false,
        }
    }

    /// Purge every entry whose TTL has elapsed, returning how many were purged
    pub fn expire(&self) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().response.is_expired())
            .map(|e| e.key().clone())
            .collect();

        expired
            .iter()
            .filter(|key| {
                self.entries
                    .remove_if(key.as_str(), |_, e| e.response.is_expired())
                    .is_some()
            })
            .count()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

impl Default for RoutesCache {
    fn default() -> Self {
        Self::new(false, super::DEFAULT_ROUTES_CACHE_SIZE)
    }
}
