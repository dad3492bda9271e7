//! Resolves a path segment to a [`NetworkSpec`] — primary/fallback upstream URLs, timeouts,
//! and retry policy for one logical chain.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamSpec {
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl UpstreamSpec {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), headers: HashMap::new() }
    }
}

#[derive(Debug, Clone)]
pub struct NetworkSpec {
    pub key: String,
    pub primary: UpstreamSpec,
    pub fallback: Option<UpstreamSpec>,
    pub request_timeout: Duration,
    pub max_fallback_retries: u32,
    pub initial_backoff: Duration,
}

impl NetworkSpec {
    pub fn new(key: impl Into<String>, primary: UpstreamSpec) -> Self {
        Self {
            key: key.into(),
            primary,
            fallback: None,
            request_timeout: Duration::from_secs(10),
            max_fallback_retries: 2,
            initial_backoff: Duration::from_millis(200),
        }
    }

    pub fn with_fallback(mut self, fallback: UpstreamSpec) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_fallback_retries(mut self, retries: u32) -> Self {
        self.max_fallback_retries = retries;
        self
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }
}

/// Routes an HTTP path segment to the matching [`NetworkSpec`]. `POST /` (no segment) resolves
/// to whichever network was registered as the default — the first one, unless the caller
/// designates another.
pub struct NetworkRouter {
    networks: HashMap<String, NetworkSpec>,
    default_key: Option<String>,
}

impl NetworkRouter {
    pub fn new(networks: Vec<NetworkSpec>) -> Self {
        let default_key = networks.first().map(|n| n.key.clone());
        let networks = networks.into_iter().map(|n| (n.key.clone(), n)).collect();
        Self { networks, default_key }
    }

    pub fn resolve(&self, segment: &str) -> Option<&NetworkSpec> {
        if segment.is_empty() {
            return self.default_key.as_deref().and_then(|k| self.networks.get(k));
        }
        self.networks.get(segment)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.networks.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}
