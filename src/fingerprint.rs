//! Pure function from `(network, method, params)` to a stable cache key.
//!
//! Two logically equivalent requests — same network, method, and structurally equal params —
//! must always produce the same string, or coalescing and cache hits break silently. The fast
//! paths below cover the request shapes this proxy sees on the hot path; everything else falls
//! through to a truncated SHA-256 of the method plus canonical JSON, which is still stable but
//! costs more to compute.

use sha2::{Digest, Sha256};

use crate::jsonrpc::JsonRpcRequest;

/// Derive the cache/coalescing key for a request on a given network.
///
/// `params` is expected to be a JSON array (per the JSON-RPC spec); a non-array value is treated
/// as "no recognised shape" and falls to the generic hash path.
pub fn fingerprint(network: &str, method: &str, params: &serde_json::Value) -> String {
    let args = match params {
        serde_json::Value::Array(a) => a.as_slice(),
        _ => return hashed(network, method, params),
    };

    if args.is_empty() {
        return format!("{network}:{method}");
    }

    if args.len() == 1 && is_primitive(&args[0]) {
        return format!("{network}:{method}:{}", primitive_str(&args[0]));
    }

    match method {
        "eth_getLogs" => {
            if let Some(filter) = args.first().filter(|v| v.is_object()) {
                return fingerprint_get_logs(network, filter);
            }
        }
        "eth_getBlockReceipts" if args.len() == 1 => {
            return format!("{network}:eth_getBlockReceipts:{}", primitive_str(&args[0]));
        }
        "eth_call" if args.len() >= 2 => {
            if let Some(fp) = fingerprint_eth_call(network, &args[0], &args[1]) {
                return fp;
            }
        }
        _ => {}
    }

    hashed(network, method, params)
}

/// Convenience wrapper over [`fingerprint`] for a parsed request.
pub fn fingerprint_for_request(network: &str, request: &JsonRpcRequest) -> String {
    fingerprint(network, &request.method, &request.params)
}

fn fingerprint_get_logs(network: &str, filter: &serde_json::Value) -> String {
    let address = filter.get("address").and_then(|v| v.as_str()).unwrap_or("");
    let from_block = filter.get("fromBlock").and_then(|v| v.as_str()).unwrap_or("0x0");
    let to_block = filter.get("toBlock").and_then(|v| v.as_str()).unwrap_or("latest");
    let topics = filter
        .get("topics")
        .map(canonical_json)
        .unwrap_or_else(|| "[]".to_string());
    format!("{network}:eth_getLogs:{address}:{from_block}:{to_block}:{topics}")
}

fn fingerprint_eth_call(
    network: &str,
    call_obj: &serde_json::Value,
    block_tag: &serde_json::Value,
) -> Option<String> {
    let to = call_obj.get("to")?.as_str()?;
    let data = call_obj.get("data")?.as_str()?;
    let block_tag_str = match block_tag.as_str() {
        Some(s) => s.to_string(),
        None => canonical_json(block_tag),
    };
    Some(format!("{network}:eth_call:{to}:{data}:{block_tag_str}"))
}

fn is_primitive(v: &serde_json::Value) -> bool {
    matches!(
        v,
        serde_json::Value::Null
            | serde_json::Value::Bool(_)
            | serde_json::Value::Number(_)
            | serde_json::Value::String(_)
    )
}

fn primitive_str(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => canonical_json(other),
    }
}

/// `serde_json` is built without the `preserve_order` feature in this crate, so
/// `Value::Object` is backed by a `BTreeMap` and already serialises with keys in sorted order —
/// `to_string` is therefore already canonical, no extra sort pass is needed.
fn canonical_json(v: &serde_json::Value) -> String {
    serde_json::to_string(v).unwrap_or_default()
}

fn hashed(network: &str, method: &str, params: &serde_json::Value) -> String {
    let payload = format!("{method}:{}", canonical_json(params));
    let digest = Sha256::digest(payload.as_bytes());
    let hex = hex_encode(&digest);
    format!("{network}:h:{}", &hex[..16])
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}
