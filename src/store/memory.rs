// =============================================================================
// In-process stores — expiring maps behind the counter/cache protocols
// =============================================================================
//
// Every operation takes the map lock exactly once, so `incr` is a single
// atomic read-modify-write per key.  Expiry is lazy (an expired entry reads
// as absent) plus an explicit `sweep_expired` pass that a background task
// runs periodically to release memory.
// =============================================================================

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::{CacheStore, CounterStore, StoreError};

struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

struct ExpiringMap<V> {
    entries: Mutex<HashMap<String, Entry<V>>>,
}

impl<V: Clone> ExpiringMap<V> {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let entries = self.entries.lock();
        entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone())
    }

    fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        before - entries.len()
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

// ---------------------------------------------------------------------------
// Counter store
// ---------------------------------------------------------------------------

pub struct MemoryCounterStore {
    map: ExpiringMap<i64>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self {
            map: ExpiringMap::new(),
        }
    }

    /// Drop expired counters; returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let removed = self.map.sweep();
        if removed > 0 {
            debug!(removed, "expired counters swept");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let now = Instant::now();
        let mut entries = self.map.entries.lock();
        let entry = entries.entry(key.to_string()).or_insert(Entry {
            value: 0,
            expires_at: None,
        });
        if !entry.is_live(now) {
            entry.value = 0;
            entry.expires_at = None;
        }
        entry.value += 1;
        Ok(entry.value)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entries = self.map.entries.lock();
        if let Some(entry) = entries.get_mut(key).filter(|e| e.is_live(now)) {
            entry.expires_at = Some(now + ttl);
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        Ok(self.map.get(key))
    }
}

// ---------------------------------------------------------------------------
// Cache store
// ---------------------------------------------------------------------------

pub struct MemoryCacheStore {
    map: ExpiringMap<Vec<u8>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self {
            map: ExpiringMap::new(),
        }
    }

    pub fn sweep_expired(&self) -> usize {
        self.map.sweep()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.map.get(key))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = Some(Instant::now() + ttl);
        self.map
            .entries
            .lock()
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn incr_starts_at_one_and_counts_up() {
        let store = MemoryCounterStore::new();
        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.incr("a").await.unwrap(), 1);
        assert_eq!(store.incr("a").await.unwrap(), 2);
        assert_eq!(store.incr("b").await.unwrap(), 1);
        assert_eq!(store.get("a").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn expired_counter_restarts() {
        let store = MemoryCounterStore::new();
        store.incr("a").await.unwrap();
        store.expire("a", Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.incr("a").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_keys() {
        let store = MemoryCounterStore::new();
        store.incr("old").await.unwrap();
        store.incr("new").await.unwrap();
        store.expire("old", Duration::from_millis(5)).await.unwrap();
        store.expire("new", Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.sweep_expired(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("new").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn incr_with_expiry_refreshes_the_deadline() {
        let store = MemoryCounterStore::new();
        assert_eq!(store.incr_with_expiry("a", Duration::from_millis(10)).await.unwrap(), 1);
        assert_eq!(store.incr_with_expiry("a", Duration::from_secs(60)).await.unwrap(), 2);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("a").await.unwrap(), Some(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_increments_are_not_lost() {
        let store = Arc::new(MemoryCounterStore::new());
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..64 {
            let store = store.clone();
            tasks.spawn(async move { store.incr("hot").await.unwrap() });
        }
        let mut seen = Vec::new();
        while let Some(v) = tasks.join_next().await {
            seen.push(v.unwrap());
        }
        seen.sort_unstable();
        assert_eq!(seen, (1..=64).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn cache_entries_expire() {
        let store = MemoryCacheStore::new();
        store
            .set("k", b"payload".to_vec(), Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some(&b"payload"[..]));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.sweep_expired(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn cache_set_overwrites() {
        let store = MemoryCacheStore::new();
        let ttl = Duration::from_secs(60);
        store.set("k", b"one".to_vec(), ttl).await.unwrap();
        store.set("k", b"two".to_vec(), ttl).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"two".to_vec()));
    }
}
