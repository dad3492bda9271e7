//! Per-network backend bookkeeping and bounded concurrency. One [`UpstreamClient`] (and
//! connection pool) per network, shared between primary and fallback requests on that network.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Notify, OwnedSemaphorePermit, RwLock, Semaphore};
use tracing::{debug, warn};

use crate::error::RpcProxyError;
use crate::network::NetworkRouter;

use super::backend::{BackendHealthInfo, BackendState, BackendStatus};
use super::client::UpstreamClient;

const DEFAULT_CONCURRENCY: usize = 20;
/// Requests allowed to queue for a permit once the semaphore itself is saturated, before the
/// manager starts rejecting with a transient error instead of queuing unboundedly.
const MAX_QUEUE_DEPTH: usize = DEFAULT_CONCURRENCY * 2;

struct NetworkBackends {
    primary: RwLock<BackendStatus>,
    fallback: Option<RwLock<BackendStatus>>,
    client: UpstreamClient,
    semaphore: Arc<Semaphore>,
    queued: std::sync::atomic::AtomicUsize,
}

pub struct UpstreamManager {
    networks: HashMap<String, NetworkBackends>,
    /// Notified whenever a backend transitions into [`BackendState::Down`], so the health
    /// checker can react immediately instead of waiting for its next scheduled tick.
    health_notify: Arc<Notify>,
}

impl UpstreamManager {
    pub fn new(router: &NetworkRouter, pool_max_idle_per_host: usize) -> Self {
        let mut networks = HashMap::new();
        for key in router.keys() {
            let Some(spec) = router.resolve(key) else { continue };
            networks.insert(
                key.to_string(),
                NetworkBackends {
                    primary: RwLock::new(BackendStatus::new(spec.primary.url.clone())),
                    fallback: spec
                        .fallback
                        .as_ref()
                        .map(|f| RwLock::new(BackendStatus::new(f.url.clone()))),
                    client: UpstreamClient::new(pool_max_idle_per_host),
                    semaphore: Arc::new(Semaphore::new(DEFAULT_CONCURRENCY)),
                    queued: std::sync::atomic::AtomicUsize::new(0),
                },
            );
        }
        Self { networks, health_notify: Arc::new(Notify::new()) }
    }

    pub fn client_for(&self, network_key: &str) -> Option<&UpstreamClient> {
        self.networks.get(network_key).map(|n| &n.client)
    }

    /// Handle the reactive health checker awaits on; notified on every Down transition.
    pub fn health_notify(&self) -> Arc<Notify> {
        self.health_notify.clone()
    }

    /// Acquires a concurrency permit for `network_key`, queuing if the semaphore is saturated but
    /// within [`MAX_QUEUE_DEPTH`], otherwise rejecting immediately so a burst against one network
    /// can't starve others or grow an unbounded queue.
    pub async fn acquire_permit(&self, network_key: &str) -> Result<OwnedSemaphorePermit, RpcProxyError> {
        let network = self
            .networks
            .get(network_key)
            .ok_or_else(|| RpcProxyError::UnknownNetwork(network_key.to_string()))?;

        if network.semaphore.available_permits() == 0 {
            let queued = network.queued.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            if queued > MAX_QUEUE_DEPTH {
                network.queued.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
                return Err(RpcProxyError::UpstreamUnavailable);
            }
            let permit = network.semaphore.clone().acquire_owned().await;
            network.queued.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
            return permit.map_err(|_| RpcProxyError::UpstreamUnavailable);
        }

        network
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| RpcProxyError::UpstreamUnavailable)
    }

    pub async fn record_primary_success(&self, network_key: &str, latency_ms: f64) {
        if let Some(network) = self.networks.get(network_key) {
            network.primary.write().await.record_success(latency_ms);
        }
    }

    pub async fn record_primary_error(&self, network_key: &str) {
        if let Some(network) = self.networks.get(network_key) {
            let mut status = network.primary.write().await;
            status.record_error();
            if status.state == BackendState::Down {
                self.health_notify.notify_waiters();
            }
        }
    }

    pub async fn record_fallback_success(&self, network_key: &str, latency_ms: f64) {
        if let Some(network) = self.networks.get(network_key) {
            if let Some(fallback) = &network.fallback {
                fallback.write().await.record_success(latency_ms);
            }
        }
    }

    pub async fn record_fallback_error(&self, network_key: &str) {
        if let Some(network) = self.networks.get(network_key) {
            if let Some(fallback) = &network.fallback {
                let mut status = fallback.write().await;
                status.record_error();
                if status.state == BackendState::Down {
                    self.health_notify.notify_waiters();
                }
            }
        }
    }

    pub async fn backend_statuses(&self, network_key: &str) -> Vec<BackendHealthInfo> {
        let Some(network) = self.networks.get(network_key) else { return Vec::new() };
        let mut statuses = Vec::new();
        statuses.push(to_health_info(network_key, "primary", &*network.primary.read().await));
        if let Some(fallback) = &network.fallback {
            statuses.push(to_health_info(network_key, "fallback", &*fallback.read().await));
        }
        statuses
    }

    pub async fn all_backend_statuses(&self) -> Vec<BackendHealthInfo> {
        let mut all = Vec::new();
        for key in self.networks.keys() {
            all.extend(self.backend_statuses(key).await);
        }
        all
    }

    pub async fn has_healthy_backend_with_block(&self, network_key: &str) -> bool {
        let Some(network) = self.networks.get(network_key) else { return false };
        let primary = network.primary.read().await;
        if primary.state == BackendState::Healthy && primary.latest_block.is_some() {
            return true;
        }
        if let Some(fallback) = &network.fallback {
            let fallback = fallback.read().await;
            if fallback.state == BackendState::Healthy && fallback.latest_block.is_some() {
                return true;
            }
        }
        false
    }

    pub async fn any_network_healthy(&self) -> bool {
        for key in self.networks.keys() {
            if self.has_healthy_backend_with_block(key).await {
                return true;
            }
        }
        self.networks.is_empty()
    }

    /// Runs `probe` against every configured backend (primary and fallback) on every network and
    /// updates their recorded state. `probe` takes the backend's URL and returns the block number
    /// on success.
    pub async fn check_all_backends<F, Fut>(&self, probe: F)
    where
        F: Fn(String) -> Fut,
        Fut: std::future::Future<Output = Result<u64, RpcProxyError>>,
    {
        for (network_key, network) in &self.networks {
            probe_one(network_key, "primary", &network.primary, &probe).await;
            if let Some(fallback) = &network.fallback {
                probe_one(network_key, "fallback", fallback, &probe).await;
            }
        }
    }
}

async fn probe_one<F, Fut>(network_key: &str, role: &str, backend: &RwLock<BackendStatus>, probe: &F)
where
    F: Fn(String) -> Fut,
    Fut: std::future::Future<Output = Result<u64, RpcProxyError>>,
{
    let url = backend.read().await.url.clone();
    let start = Instant::now();
    match probe(url.clone()).await {
        Ok(block_number) => {
            let latency = start.elapsed().as_secs_f64() * 1000.0;
            let mut status = backend.write().await;
            status.latest_block = Some(block_number);
            status.record_success(latency);
            debug!(network = network_key, role, backend = %url, block = block_number, "health check passed");
        }
        Err(e) => {
            let mut status = backend.write().await;
            status.record_error();
            warn!(network = network_key, role, backend = %url, error = %e, state = ?status.state, "health check failed");
        }
    }
}

fn to_health_info(network_key: &str, role: &str, status: &BackendStatus) -> BackendHealthInfo {
    BackendHealthInfo {
        network: network_key.to_string(),
        role: role.to_string(),
        url: status.url.clone(),
        state: format!("{:?}", status.state),
        latency_ms: status.avg_latency_ms,
        latest_block: status.latest_block,
        total_requests: status.total_requests,
        total_errors: status.total_errors,
        uptime_secs: status.started_at.elapsed().as_secs(),
    }
}
