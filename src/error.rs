use std::fmt;

use crate::jsonrpc::JsonRpcError;

#[derive(Debug)]
pub enum RpcProxyError {
    /// Caller-level JSON-RPC error (bad envelope) — never reaches upstream.
    InvalidRequest(String),
    /// Path routed to a network that isn't configured.
    UnknownNetwork(String),
    /// Primary and fallback (or primary alone) were both exhausted.
    UpstreamUnavailable,
    /// Upstream returned a well-formed JSON-RPC error that should be forwarded verbatim.
    UpstreamRpcError(JsonRpcError),
    /// A single upstream HTTP request failed before a response could be parsed.
    UpstreamRequest(String),
    /// Non-2xx HTTP status from upstream.
    UpstreamHttp(u16),
    /// Failed to serialize/deserialize JSON.
    Json(serde_json::Error),
    /// Failed to read response body.
    BodyRead(String),
    /// Health probe failed.
    HealthProbe(String),
    /// Persistent cache I/O failed. Logged, never surfaced to the caller.
    PersistentCacheIo(String),
}

impl fmt::Display for RpcProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRequest(e) => write!(f, "invalid request: {e}"),
            Self::UnknownNetwork(n) => write!(f, "unknown network: {n}"),
            Self::UpstreamUnavailable => write!(f, "all upstream backends failed"),
            Self::UpstreamRpcError(e) => write!(f, "upstream rpc error {}: {}", e.code, e.message),
            Self::UpstreamRequest(e) => write!(f, "upstream request failed: {e}"),
            Self::UpstreamHttp(status) => write!(f, "upstream HTTP {status}"),
            Self::Json(e) => write!(f, "JSON error: {e}"),
            Self::BodyRead(e) => write!(f, "body read error: {e}"),
            Self::HealthProbe(e) => write!(f, "health probe failed: {e}"),
            Self::PersistentCacheIo(e) => write!(f, "persistent cache I/O error: {e}"),
        }
    }
}

impl std::error::Error for RpcProxyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for RpcProxyError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}
