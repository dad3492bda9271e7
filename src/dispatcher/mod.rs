//! Orchestrates a single classified request end to end: cache lookup → coalescing →
//! duplicate-window throttle → primary attempt → quality check → retrying fallback →
//! write-through.
//!
//! State machine of one dispatch attempt:
//! `Start → LookupCache → {Hit | Miss → JoinInflight → {Joiner → Await
//!  | Leader → Throttle → Primary → {Final | FallbackDecision → Fallback (with retries) → Final}}
//!  → Finalize}`

mod quality;
mod signatures;

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::cache::{classify, validate, CacheManager, DuplicateWindow, PolicyConfig};
use crate::clock::Clock;
use crate::coalescer::Coalescer;
use crate::error::RpcProxyError;
use crate::fingerprint::fingerprint_for_request;
use crate::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use crate::network::{NetworkRouter, NetworkSpec};
use crate::upstream::{UpstreamError, UpstreamManager};

use quality::is_fallback_worthy_success;
use signatures::is_historical_data_error;

pub struct Dispatcher {
    router: NetworkRouter,
    cache: CacheManager,
    coalescer: Coalescer,
    duplicate_window: DuplicateWindow,
    upstream: Arc<UpstreamManager>,
    policy_config: PolicyConfig,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    pub fn new(
        router: NetworkRouter,
        cache: CacheManager,
        upstream: UpstreamManager,
        policy_config: PolicyConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            router,
            cache,
            coalescer: Coalescer::new(),
            duplicate_window: DuplicateWindow::new(),
            upstream: Arc::new(upstream),
            policy_config,
            clock,
        }
    }

    pub fn router(&self) -> &NetworkRouter {
        &self.router
    }

    pub fn upstream(&self) -> &UpstreamManager {
        &self.upstream
    }

    /// A cloned handle to the shared upstream manager, for the background health checker task
    /// which runs independently of any single dispatch.
    pub fn upstream_handle(&self) -> Arc<UpstreamManager> {
        self.upstream.clone()
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Dispatches one classified request. Returns `Err(RpcProxyError::UnknownNetwork)` when
    /// `network_segment` doesn't resolve — distinct from every other outcome, which is always a
    /// normal (possibly error-carrying) JSON-RPC envelope, so the HTTP layer can map it to a 404
    /// per spec.md §6/§7 instead of a `200` with an embedded error.
    pub async fn serve(
        &self,
        network_segment: &str,
        request: JsonRpcRequest,
    ) -> Result<JsonRpcResponse, RpcProxyError> {
        let Some(network) = self.router.resolve(network_segment) else {
            return Err(RpcProxyError::UnknownNetwork(network_segment.to_string()));
        };

        let key = fingerprint_for_request(&network.key, &request);
        let policy = classify(&request, &self.policy_config);

        if policy.cacheable {
            if let Some(hit) = self.cache.lookup(&key, policy.max_age, request.id.clone()).await {
                return Ok(hit);
            }
        }

        let network = network.clone();
        let request_for_leader = request.clone();
        let key_for_leader = key.clone();
        let response = self
            .coalescer
            .join(&key, request.id.clone(), move || async move {
                self.duplicate_window.throttle(&key_for_leader, self.clock.as_ref()).await;
                let (final_response, should_cache) =
                    self.dispatch_upstream(&network, &request_for_leader, policy).await;
                if policy.cacheable && should_cache {
                    self.cache.store(&key_for_leader, final_response.clone()).await;
                }
                final_response
            })
            .await;

        Ok((*response).clone())
    }

    /// Steps 5–7 of the dispatch algorithm: primary attempt, quality/error inspection, retrying
    /// fallback. Returns the final response and whether it's eligible for write-through.
    async fn dispatch_upstream(
        &self,
        network: &NetworkSpec,
        request: &JsonRpcRequest,
        policy: crate::cache::CachePolicy,
    ) -> (JsonRpcResponse, bool) {
        let permit = match self.upstream.acquire_permit(&network.key).await {
            Ok(permit) => permit,
            Err(e) => return (error_response(request.id.clone(), &e), false),
        };

        let Some(client) = self.upstream.client_for(&network.key) else {
            return (error_response(request.id.clone(), &RpcProxyError::UnknownNetwork(network.key.clone())), false);
        };

        let primary_result = client.post(&network.primary, request, network.request_timeout).await;
        drop(permit);

        match primary_result {
            Ok(envelope) => {
                self.upstream.record_primary_success(&network.key, 0.0).await;
                let result = envelope.result.clone().unwrap_or(serde_json::Value::Null);

                if network.fallback.is_some() && is_fallback_worthy_success(request, &result) {
                    return self.attempt_fallback(network, request, policy, Some(envelope)).await;
                }

                let should_cache = policy.cacheable && validate(request, &result);
                (envelope, should_cache)
            }
            Err(UpstreamError::RpcError(rpc_error)) => {
                self.upstream.record_primary_error(&network.key).await;
                if network.fallback.is_some() && is_historical_data_error(&rpc_error) {
                    return self.attempt_fallback(network, request, policy, None).await;
                }
                let response = JsonRpcResponse {
                    jsonrpc: "2.0".to_string(),
                    result: None,
                    error: Some(rpc_error),
                    id: request.id.clone(),
                };
                (response, false)
            }
            Err(transport_err) => {
                self.upstream.record_primary_error(&network.key).await;
                warn!(network = %network.key, error = %transport_err, "primary attempt failed");
                if network.fallback.is_some() {
                    self.attempt_fallback(network, request, policy, None).await
                } else {
                    (
                        JsonRpcResponse::upstream_error(request.id.clone(), transport_err.to_string()),
                        false,
                    )
                }
            }
        }
    }

    /// Step 6: fallback with exponential backoff + jitter. `tentative` is the primary's
    /// quality-suspicious success, returned if every fallback attempt fails.
    async fn attempt_fallback(
        &self,
        network: &NetworkSpec,
        request: &JsonRpcRequest,
        policy: crate::cache::CachePolicy,
        tentative: Option<JsonRpcResponse>,
    ) -> (JsonRpcResponse, bool) {
        let Some(fallback_spec) = &network.fallback else {
            return self.finish_without_fallback(request, policy, tentative);
        };
        let Some(client) = self.upstream.client_for(&network.key) else {
            return self.finish_without_fallback(request, policy, tentative);
        };

        let mut backoff = network.initial_backoff;
        let mut last_error_display = String::new();

        for attempt in 0..=network.max_fallback_retries {
            if attempt > 0 {
                tokio::time::sleep(jittered(backoff)).await;
                backoff *= 2;
            }

            match client.post(fallback_spec, request, network.request_timeout).await {
                Ok(envelope) => {
                    self.upstream.record_fallback_success(&network.key, 0.0).await;
                    let result = envelope.result.clone().unwrap_or(serde_json::Value::Null);
                    let should_cache = policy.cacheable && validate(request, &result);
                    return (envelope, should_cache);
                }
                Err(e) => {
                    self.upstream.record_fallback_error(&network.key).await;
                    last_error_display = e.to_string();
                }
            }
        }

        if let Some(tentative) = tentative {
            let result = tentative.result.clone().unwrap_or(serde_json::Value::Null);
            let should_cache = policy.cacheable && validate(request, &result);
            return (tentative, should_cache);
        }

        (JsonRpcResponse::upstream_error(request.id.clone(), last_error_display), false)
    }

    fn finish_without_fallback(
        &self,
        request: &JsonRpcRequest,
        policy: crate::cache::CachePolicy,
        tentative: Option<JsonRpcResponse>,
    ) -> (JsonRpcResponse, bool) {
        match tentative {
            Some(envelope) => {
                let result = envelope.result.clone().unwrap_or(serde_json::Value::Null);
                let should_cache = policy.cacheable && validate(request, &result);
                (envelope, should_cache)
            }
            None => (JsonRpcResponse::upstream_error(request.id.clone(), "no fallback configured"), false),
        }
    }
}

fn jittered(duration: Duration) -> Duration {
    let jitter_fraction = rand::thread_rng().gen_range(-0.1..=0.1);
    let millis = duration.as_millis() as f64 * (1.0 + jitter_fraction);
    Duration::from_millis(millis.max(0.0) as u64)
}

fn error_response(id: serde_json::Value, error: &RpcProxyError) -> JsonRpcResponse {
    JsonRpcResponse::upstream_error(id, error.to_string())
}
