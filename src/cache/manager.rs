//! Two-tier cache orchestration: memory LRU in front of a persistent KV, with promotion,
//! write-through, TTL evaluation, and a periodic sweep.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;

use crate::clock::Clock;
use crate::jsonrpc::JsonRpcResponse;

use super::entry::{CacheEntry, Payload};
use super::memory::MemoryCache;
use super::store::{log_store_error, PersistentKv, StoreStats};

pub struct CacheManager {
    memory: MemoryCache,
    persistent: Option<Arc<dyn PersistentKv>>,
    clock: Arc<dyn Clock>,
}

impl CacheManager {
    pub fn new(memory_capacity: usize, persistent: Option<Arc<dyn PersistentKv>>, clock: Arc<dyn Clock>) -> Self {
        Self { memory: MemoryCache::new(memory_capacity), persistent, clock }
    }

    /// Checks memory, then the persistent tier on miss, promoting persistent hits back into
    /// memory. Expired entries discovered on either tier are deleted before reporting a miss.
    /// `max_age = None` means "never expires".
    pub async fn lookup(
        &self,
        key: &str,
        max_age: Option<Duration>,
        request_id: serde_json::Value,
    ) -> Option<JsonRpcResponse> {
        if let Some(entry) = self.memory.get(key).await {
            let now = self.clock.now_ms();
            if is_expired(&entry, max_age, now) {
                self.memory.delete(key).await;
                if let Some(store) = &self.persistent {
                    if let Err(e) = store.delete(key).await {
                        log_store_error("delete (expired memory entry)", e);
                    }
                }
                counter!("cache_misses_total").increment(1);
                return None;
            }
            self.memory.record_read(key).await;
            counter!("cache_hits_total", "tier" => "memory").increment(1);
            return Some(entry.payload.into_response(request_id));
        }

        let Some(store) = &self.persistent else {
            counter!("cache_misses_total").increment(1);
            return None;
        };

        match store.get(key).await {
            Ok(Some((payload_bytes, inserted_at_ms))) => {
                let Ok(payload) = serde_json::from_slice::<Payload>(&payload_bytes) else {
                    counter!("cache_misses_total").increment(1);
                    return None;
                };
                let mut entry = CacheEntry::new(payload, inserted_at_ms);
                let now = self.clock.now_ms();
                if is_expired(&entry, max_age, now) {
                    if let Err(e) = store.delete(key).await {
                        log_store_error("delete (expired persistent entry)", e);
                    }
                    counter!("cache_misses_total").increment(1);
                    return None;
                }
                entry.read_count += 1;
                self.memory.put(key.to_string(), entry.clone()).await;
                counter!("cache_hits_total", "tier" => "persistent").increment(1);
                Some(entry.payload.into_response(request_id))
            }
            Ok(None) => {
                counter!("cache_misses_total").increment(1);
                None
            }
            Err(e) => {
                log_store_error("get", e);
                counter!("cache_misses_total").increment(1);
                None
            }
        }
    }

    /// Write-through: persistent tier first (best-effort), then memory, per the invariant that a
    /// cache-worthy response reaches both tiers before the in-flight entry is released.
    ///
    /// Looks up `key`'s current `write_count` first (memory, then persistent) and carries it
    /// forward incremented by one, rather than resetting to 1 on every overwrite — per spec.md
    /// §3 invariant 3 ("writeCount is monotonic").
    pub async fn store(&self, key: &str, response: JsonRpcResponse) {
        let write_count = self.existing_write_count(key).await + 1;
        let entry = CacheEntry::with_write_count(Payload::Envelope(response), self.clock.now_ms(), write_count);

        if let Some(store) = &self.persistent {
            match serde_json::to_vec(&entry.payload) {
                Ok(bytes) => {
                    if let Err(e) = store.put(key, &bytes, entry.inserted_at_ms).await {
                        log_store_error("put", e);
                    }
                }
                Err(e) => log_store_error("serialize", e.into()),
            }
        }

        self.memory.put(key.to_string(), entry).await;
        counter!("cache_writes_total").increment(1);
    }

    /// `write_count` of the entry currently stored under `key`, or `0` if none exists. Checks
    /// memory first, then the persistent tier. The persistent tier's schema (spec.md §4.3) only
    /// carries `payload`/`insertedAt`, not the counters, so a persistent-only hit can't recover a
    /// prior count — that case is indistinguishable from "no entry" here, which only affects a
    /// key that was written, evicted from memory, and never re-read before being overwritten
    /// again.
    async fn existing_write_count(&self, key: &str) -> u64 {
        if let Some(entry) = self.memory.get(key).await {
            return entry.write_count;
        }
        let Some(store) = &self.persistent else { return 0 };
        match store.get(key).await {
            Ok(Some(_)) => 0,
            Ok(None) => 0,
            Err(e) => {
                log_store_error("get (write_count lookup)", e);
                0
            }
        }
    }

    pub async fn invalidate(&self, key: &str) {
        self.memory.delete(key).await;
        if let Some(store) = &self.persistent {
            if let Err(e) = store.delete(key).await {
                log_store_error("delete (invalidate)", e);
            }
        }
    }

    pub async fn clear(&self) {
        self.memory.clear().await;
    }

    /// Invalidates both tiers entirely, for the operator-facing cache-clear endpoint.
    pub async fn clear_all(&self) {
        self.memory.clear().await;
        if let Some(store) = &self.persistent {
            if let Err(e) = store.delete_older_than(u64::MAX).await {
                log_store_error("delete_older_than (clear_all)", e);
            }
        }
    }

    pub async fn memory_size(&self) -> usize {
        self.memory.size().await
    }

    pub async fn persistent_stats(&self) -> Option<StoreStats> {
        let store = self.persistent.as_ref()?;
        match store.stats().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                log_store_error("stats", e);
                None
            }
        }
    }

    /// Deletes entries older than `max_age` from both tiers. Skipped entirely by the caller when
    /// `max_age` is `None` ("infinite retention" — see the sweep-vs-opportunistic-deletion note
    /// on [`sweep`]).
    pub async fn sweep(&self, max_age: Duration) -> u64 {
        let now = self.clock.now_ms();
        let cutoff = now.saturating_sub(max_age.as_millis() as u64);

        let stale_keys: Vec<String> = self
            .memory
            .iterate_oldest_first()
            .await
            .into_iter()
            .take_while(|(_, entry)| entry.inserted_at_ms < cutoff)
            .map(|(k, _)| k)
            .collect();
        for key in &stale_keys {
            self.memory.delete(key).await;
        }

        let persistent_deleted = if let Some(store) = &self.persistent {
            match store.delete_older_than(cutoff).await {
                Ok(n) => n,
                Err(e) => {
                    log_store_error("delete_older_than", e);
                    0
                }
            }
        } else {
            0
        };

        stale_keys.len() as u64 + persistent_deleted
    }
}

/// `max_age = None` ⇒ the entry never expires.
fn is_expired(entry: &CacheEntry, max_age: Option<Duration>, now_ms: u64) -> bool {
    match max_age {
        None => false,
        Some(ttl) => entry.age_ms(now_ms) > ttl.as_millis() as u64,
    }
}
