//! HTTP POST to a single upstream with error classification. One `reqwest::Client` is built per
//! network (see [`super::manager::UpstreamManager`]) and reused across requests — reqwest pools
//! keep-alive connections internally, bounded by `pool_max_idle_per_host`.

use std::time::Duration;

use reqwest::Client;

use crate::jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::network::UpstreamSpec;

/// The four-way error taxonomy higher layers (the dispatcher) reason about.
#[derive(Debug)]
pub enum UpstreamError {
    /// DNS failure, connection refused, TLS handshake failure. Not retryable; forces fallback
    /// consideration.
    TransportFatal(String),
    /// Timeout, 5xx, 429. Retryable.
    TransportTransient(String),
    /// 400/401/403/other non-429 4xx. Not retryable, but fallback may still be tried.
    ClientError(u16),
    /// HTTP 200 with a JSON-RPC `error` field — passed up intact so the dispatcher can inspect it
    /// for fallback-worthiness rather than treating it as a hard failure here.
    RpcError(JsonRpcError),
}

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TransportFatal(e) => write!(f, "transport fatal: {e}"),
            Self::TransportTransient(e) => write!(f, "transport transient: {e}"),
            Self::ClientError(status) => write!(f, "client error: HTTP {status}"),
            Self::RpcError(e) => write!(f, "rpc error {}: {}", e.code, e.message),
        }
    }
}

pub struct UpstreamClient {
    client: Client,
}

impl UpstreamClient {
    pub fn new(pool_max_idle_per_host: usize) -> Self {
        let client = Client::builder()
            .pool_max_idle_per_host(pool_max_idle_per_host)
            .build()
            .expect("failed to build HTTP client");
        Self { client }
    }

    pub async fn post(
        &self,
        upstream: &UpstreamSpec,
        request: &JsonRpcRequest,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, UpstreamError> {
        let body = serde_json::to_vec(request)
            .map_err(|e| UpstreamError::TransportFatal(format!("failed to encode request: {e}")))?;

        let mut builder = self
            .client
            .post(&upstream.url)
            .timeout(timeout)
            .header("content-type", "application/json")
            .body(body);
        for (name, value) in &upstream.headers {
            builder = builder.header(name, value);
        }

        let resp = builder.send().await.map_err(classify_transport_error)?;
        let status = resp.status();

        if status.as_u16() == 429 || status.is_server_error() {
            return Err(UpstreamError::TransportTransient(format!("HTTP {status}")));
        }
        if status.is_client_error() {
            return Err(UpstreamError::ClientError(status.as_u16()));
        }
        if !status.is_success() {
            return Err(UpstreamError::TransportTransient(format!("HTTP {status}")));
        }

        let text = resp
            .text()
            .await
            .map_err(|e| UpstreamError::TransportTransient(format!("body read failed: {e}")))?;

        let envelope: JsonRpcResponse = serde_json::from_str(&text)
            .map_err(|e| UpstreamError::TransportTransient(format!("malformed upstream body: {e}")))?;

        if let Some(error) = &envelope.error {
            return Err(UpstreamError::RpcError(error.clone()));
        }
        Ok(envelope)
    }
}

fn classify_transport_error(e: reqwest::Error) -> UpstreamError {
    if e.is_timeout() {
        return UpstreamError::TransportTransient(e.to_string());
    }
    if e.is_connect() {
        return UpstreamError::TransportFatal(e.to_string());
    }
    UpstreamError::TransportFatal(e.to_string())
}
