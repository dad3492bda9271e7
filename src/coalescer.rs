//! Single-flight request coalescing: concurrent identical requests (same fingerprint) share one
//! upstream attempt. The leader runs the producer; joiners just await its result.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};

use crate::jsonrpc::JsonRpcResponse;

const BROADCAST_CAPACITY: usize = 32;

pub struct Coalescer {
    inflight: RwLock<HashMap<String, broadcast::Sender<Arc<JsonRpcResponse>>>>,
}

impl Coalescer {
    pub fn new() -> Self {
        Self { inflight: RwLock::new(HashMap::new()) }
    }

    /// Runs `producer` if no attempt for `key` is already in flight; otherwise awaits the
    /// existing attempt's broadcast result. Either way, the returned envelope's `id` is rewritten
    /// to `request_id` before this call returns.
    ///
    /// The leader/joiner decision and the map insert happen under a single write-lock
    /// acquisition, so two truly concurrent callers can never both conclude "no leader exists"
    /// and both run the producer — that would be a single-write lock TOCTOU race and would break
    /// the single-flight guarantee this type exists to provide.
    pub async fn join<F, Fut>(
        &self,
        key: &str,
        request_id: serde_json::Value,
        producer: F,
    ) -> Arc<JsonRpcResponse>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = JsonRpcResponse>,
    {
        let existing = {
            let mut guard = self.inflight.write().await;
            match guard.get(key) {
                Some(tx) => Some(tx.subscribe()),
                None => {
                    let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
                    guard.insert(key.to_string(), tx);
                    None
                }
            }
        };

        let response = if let Some(mut rx) = existing {
            match rx.recv().await {
                Ok(resp) => resp,
                // Sender dropped without sending (leader panicked) — extremely unlikely but not
                // unwind-worthy; fall back to running the producer ourselves as a new leader.
                Err(_) => Arc::new(self.lead(key, producer).await),
            }
        } else {
            Arc::new(self.lead(key, producer).await)
        };

        Arc::new(with_id(&response, request_id))
    }

    /// Runs `producer` for `key` and broadcasts its result. Assumes a sender for `key` is already
    /// registered in the map (either by `join`'s leader branch, or re-registered here on the rare
    /// panicked-sender fallback).
    async fn lead<F, Fut>(&self, key: &str, producer: F) -> JsonRpcResponse
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = JsonRpcResponse>,
    {
        let tx = {
            let mut guard = self.inflight.write().await;
            guard
                .entry(key.to_string())
                .or_insert_with(|| broadcast::channel(BROADCAST_CAPACITY).0)
                .clone()
        };

        let response = producer().await;

        {
            let mut guard = self.inflight.write().await;
            guard.remove(key);
        }
        let _ = tx.send(Arc::new(response.clone()));
        response
    }

    pub async fn inflight_count(&self) -> usize {
        self.inflight.read().await.len()
    }
}

impl Default for Coalescer {
    fn default() -> Self {
        Self::new()
    }
}

fn with_id(response: &JsonRpcResponse, request_id: serde_json::Value) -> JsonRpcResponse {
    let mut rewritten = response.clone();
    rewritten.id = request_id;
    rewritten
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn single_caller_runs_producer_and_gets_result() {
        let coalescer = Coalescer::new();
        let resp = coalescer
            .join("k1", serde_json::json!(1), || async {
                JsonRpcResponse::success(serde_json::json!(0), serde_json::json!("0xabc"))
            })
            .await;
        assert_eq!(resp.id, serde_json::json!(1));
        assert_eq!(resp.result, Some(serde_json::json!("0xabc")));
    }

    #[tokio::test]
    async fn concurrent_identical_requests_share_one_producer_invocation() {
        let coalescer = Arc::new(Coalescer::new());
        let call_count = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..20 {
            let coalescer = coalescer.clone();
            let call_count = call_count.clone();
            handles.push(tokio::spawn(async move {
                coalescer
                    .join("shared-key", serde_json::json!(i), || {
                        let call_count = call_count.clone();
                        async move {
                            call_count.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            JsonRpcResponse::success(serde_json::json!(0), serde_json::json!("0xshared"))
                        }
                    })
                    .await
            }));
        }

        let mut results = Vec::new();
        for h in handles {
            results.push(h.await.unwrap());
        }

        assert_eq!(call_count.load(Ordering::SeqCst), 1, "exactly one upstream attempt expected");
        for (i, resp) in results.iter().enumerate() {
            assert_eq!(resp.id, serde_json::json!(i));
            assert_eq!(resp.result, Some(serde_json::json!("0xshared")));
        }
    }

    #[tokio::test]
    async fn inflight_entry_is_removed_after_completion() {
        let coalescer = Coalescer::new();
        coalescer
            .join("k1", serde_json::json!(1), || async {
                JsonRpcResponse::success(serde_json::json!(0), serde_json::json!("x"))
            })
            .await;
        assert_eq!(coalescer.inflight_count().await, 0);
    }

    #[tokio::test]
    async fn different_keys_run_independent_producers() {
        let coalescer = Coalescer::new();
        let call_count = Arc::new(AtomicUsize::new(0));

        for key in ["a", "b"] {
            let call_count = call_count.clone();
            coalescer
                .join(key, serde_json::json!(1), move || {
                    let call_count = call_count.clone();
                    async move {
                        call_count.fetch_add(1, Ordering::SeqCst);
                        JsonRpcResponse::success(serde_json::json!(0), serde_json::json!("x"))
                    }
                })
                .await;
        }

        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }
}
