//! Background liveness probing: an `eth_blockNumber` call against every configured backend
//! (primary and fallback, every network) on a schedule, plus a reactive re-probe the moment any
//! backend goes [`BackendState::Down`](crate::upstream::BackendState).

use std::io::Write;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tracing::info;

use crate::error::RpcProxyError;
use crate::upstream::UpstreamManager;

pub async fn start_health_checker(upstream: Arc<UpstreamManager>, interval_secs: u64) {
    let interval = Duration::from_secs(interval_secs.max(1));
    let notify = upstream.health_notify();

    info!(interval_secs = %interval_secs, "starting health checker");

    upstream.check_all_backends(probe_backend_url).await;

    let mut ticker = time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {},
            _ = notify.notified() => {
                info!("reactive health check triggered (backend went down)");
                ticker.reset();
            },
        }
        upstream.check_all_backends(probe_backend_url).await;
    }
}

pub async fn probe_backend_url(url: String) -> Result<u64, RpcProxyError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| RpcProxyError::HealthProbe(format!("client build: {e}")))?;

    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "method": "eth_blockNumber",
        "params": [],
        "id": 1
    });

    let resp = client
        .post(&url)
        .header("content-type", "application/json")
        .json(&body)
        .send()
        .await
        .map_err(|e| RpcProxyError::UpstreamRequest(e.to_string()))?;

    if !resp.status().is_success() {
        return Err(RpcProxyError::UpstreamHttp(resp.status().as_u16()));
    }

    let json: serde_json::Value = resp
        .json()
        .await
        .map_err(|e| RpcProxyError::BodyRead(e.to_string()))?;

    let result = json
        .get("result")
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcProxyError::HealthProbe("missing result field".into()))?;

    let block = u64::from_str_radix(result.trim_start_matches("0x"), 16)
        .map_err(|e| RpcProxyError::HealthProbe(format!("invalid block number: {e}")))?;

    Ok(block)
}

/// A short-timeout `net_version` probe against a single upstream, used directly by the public
/// `GET /health` endpoint (spec §6: "a static health envelope plus an upstream liveness probe —
/// a `net_version` call with a short timeout"), independent of the periodic background checker.
pub async fn probe_net_version(url: &str, timeout: Duration) -> Result<String, RpcProxyError> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| RpcProxyError::HealthProbe(format!("client build: {e}")))?;

    let body = serde_json::json!({ "jsonrpc": "2.0", "method": "net_version", "params": [], "id": 1 });

    let resp = client
        .post(url)
        .header("content-type", "application/json")
        .json(&body)
        .send()
        .await
        .map_err(|e| RpcProxyError::UpstreamRequest(e.to_string()))?;

    if !resp.status().is_success() {
        return Err(RpcProxyError::UpstreamHttp(resp.status().as_u16()));
    }

    let json: serde_json::Value =
        resp.json().await.map_err(|e| RpcProxyError::BodyRead(e.to_string()))?;

    json.get("result")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| RpcProxyError::HealthProbe("missing result field".into()))
}

/// Performs an HTTP health check against the running instance using only std, for
/// `rpcproxy --health-check` (Docker `HEALTHCHECK` without pulling in curl). Returns `0` if the
/// server responds with HTTP 200, `1` otherwise.
pub fn run_health_check(port: u16) -> i32 {
    let addr = format!("127.0.0.1:{port}");
    let timeout = Duration::from_secs(5);

    let Ok(socket_addr) = addr.parse() else { return 1 };
    let mut stream = match TcpStream::connect_timeout(&socket_addr, timeout) {
        Ok(s) => s,
        Err(_) => return 1,
    };

    let _ = stream.set_read_timeout(Some(timeout));
    let _ = stream.set_write_timeout(Some(timeout));

    let request = format!("GET /health HTTP/1.1\r\nHost: localhost:{port}\r\nConnection: close\r\n\r\n");
    if stream.write_all(request.as_bytes()).is_err() {
        return 1;
    }

    let mut buf = [0u8; 32];
    let n = match std::io::Read::read(&mut stream, &mut buf) {
        Ok(n) if n > 0 => n,
        _ => return 1,
    };

    let response = String::from_utf8_lossy(&buf[..n]);
    if response.contains("200") { 0 } else { 1 }
}
