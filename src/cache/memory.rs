//! Bounded in-memory map with strict LRU recency ordering — the fast tier of the two-tier
//! cache. Built on the `lru` crate rather than hand-rolled, since `LruCache` already gives
//! get-promotes-to-MRU and capacity-evicts-LRU-on-insert for free; wrapped in a `tokio::sync::Mutex`
//! because every worker (one per request) touches it.

use std::num::NonZeroUsize;

use lru::LruCache;
use tokio::sync::Mutex;

use super::entry::CacheEntry;

pub struct MemoryCache {
    inner: Mutex<LruCache<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self { inner: Mutex::new(LruCache::new(capacity)) }
    }

    /// Marks `key` most-recently-used on hit, per the LRU contract.
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        let mut guard = self.inner.lock().await;
        guard.get(key).cloned()
    }

    /// Increments the stored entry's `read_count` in place, for callers that already cloned the
    /// entry via [`get`](Self::get) and want the persisted counter to reflect the hit.
    pub async fn record_read(&self, key: &str) {
        let mut guard = self.inner.lock().await;
        if let Some(entry) = guard.peek_mut(key) {
            entry.read_count += 1;
        }
    }

    /// Inserts or replaces `key`, evicting the least-recently-used entry first if the cache is
    /// at capacity and `key` is new.
    pub async fn put(&self, key: String, entry: CacheEntry) {
        let mut guard = self.inner.lock().await;
        guard.put(key, entry);
    }

    pub async fn has(&self, key: &str) -> bool {
        let guard = self.inner.lock().await;
        guard.contains(key)
    }

    pub async fn delete(&self, key: &str) {
        let mut guard = self.inner.lock().await;
        guard.pop(key);
    }

    pub async fn size(&self) -> usize {
        let guard = self.inner.lock().await;
        guard.len()
    }

    pub async fn clear(&self) {
        let mut guard = self.inner.lock().await;
        guard.clear();
    }

    /// Oldest-first snapshot of `(key, age at insertion)`, used by the TTL sweeper.
    /// `LruCache::iter()` walks MRU→LRU, so this reverses it.
    pub async fn iterate_oldest_first(&self) -> Vec<(String, CacheEntry)> {
        let guard = self.inner.lock().await;
        let mut items: Vec<(String, CacheEntry)> =
            guard.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        items.reverse();
        items
    }
}
