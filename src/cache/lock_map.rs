use dashmap::DashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Registry of named mutexes
///
/// A lock is created the first time its key is used. Callers holding the lock
/// for a key run exclusively with respect to every other caller of the same
/// key, while different keys never contend.
#[derive(Default)]
pub struct LockMap {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl LockMap {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    fn handle(&self, key: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.get(key) {
            return Arc::clone(lock.value());
        }
        Arc::clone(
            self.locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// Run `f` while holding the lock named `key`
    pub fn with_lock<R>(&self, key: &str, f: impl FnOnce() -> R) -> R {
        let lock = self.handle(key);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    /// Drop locks nobody currently holds or waits for, returning how many
    pub fn sweep(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before.saturating_sub(self.locks.len())
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_same_key_is_exclusive() {
        let locks = LockMap::new();
        let inside = AtomicUsize::new(0);
        let max_inside = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    locks.with_lock("R192_175", || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(5));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    });
                });
            }
        });

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn test_different_keys_do_not_block() {
        let locks = LockMap::new();
        // nested acquisition of a different key must not deadlock
        let value = locks.with_lock("a", || locks.with_lock("b", || 42));
        assert_eq!(value, 42);
        assert_eq!(locks.len(), 2);
    }

    #[test]
    fn test_sweep_drops_idle_locks() {
        let locks = LockMap::new();
        locks.with_lock("a", || ());
        locks.with_lock("b", || ());
        assert_eq!(locks.sweep(), 2);
        assert!(locks.is_empty());
    }
}
