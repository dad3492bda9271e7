use serde::{Deserialize, Serialize};

use crate::jsonrpc::JsonRpcResponse;

/// A stored cache value, in either the preferred envelope form or the legacy bare-result form.
/// Both forms round-trip through the persistent tier; `Envelope` is always written by this
/// version of the proxy, `Bare` only ever originates from the `Envelope` branch's precursor and
/// is kept readable for entries a prior version may have written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Envelope(JsonRpcResponse),
    Bare(serde_json::Value),
}

impl Payload {
    /// Render this payload as a response envelope addressed to `request_id`, rewriting the
    /// stored envelope's own id or wrapping a bare result — the cache manager's "serving-form
    /// rule".
    pub fn into_response(self, request_id: serde_json::Value) -> JsonRpcResponse {
        match self {
            Payload::Envelope(mut resp) => {
                resp.id = request_id;
                resp
            }
            Payload::Bare(result) => JsonRpcResponse::success(request_id, result),
        }
    }

    pub fn approx_size_bytes(&self) -> u64 {
        match self {
            Payload::Envelope(resp) => serde_json::to_vec(resp).map(|v| v.len() as u64).unwrap_or(0),
            Payload::Bare(v) => serde_json::to_vec(v).map(|v| v.len() as u64).unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub payload: Payload,
    /// Monotonic milliseconds (from the proxy's [`crate::clock::Clock`]) at insertion time.
    pub inserted_at_ms: u64,
    pub read_count: u64,
    pub write_count: u64,
    /// Always `false` in this implementation — no compression codec is wired in (see
    /// Non-goals); the field exists so the data model can grow compression later without a
    /// schema change.
    pub compressed: bool,
    pub original_size: u64,
    pub compressed_size: u64,
}

impl CacheEntry {
    /// A brand-new entry — `write_count` starts at 1. For an overwrite of an existing key, use
    /// [`with_write_count`](Self::with_write_count) so the counter carries forward instead of
    /// resetting (spec.md §3 invariant 3: "writeCount is monotonic").
    pub fn new(payload: Payload, inserted_at_ms: u64) -> Self {
        Self::with_write_count(payload, inserted_at_ms, 1)
    }

    pub fn with_write_count(payload: Payload, inserted_at_ms: u64, write_count: u64) -> Self {
        let size = payload.approx_size_bytes();
        Self {
            payload,
            inserted_at_ms,
            read_count: 0,
            write_count,
            compressed: false,
            original_size: size,
            compressed_size: size,
        }
    }

    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.inserted_at_ms)
    }
}
