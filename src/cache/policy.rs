//! Per-method cacheability classifier. Returns `{cacheable, maxAge}` for a request without
//! touching any cache tier — the dispatcher consults this before ever calling the cache manager.

use std::time::Duration;

use crate::jsonrpc::JsonRpcRequest;

/// Methods that must never be cached regardless of shape — writes, signing, node administration.
const NEVER_CACHE_METHODS: &[&str] = &[
    "eth_sendRawTransaction",
    "eth_sendTransaction",
    "personal_sign",
    "personal_unlockAccount",
    "personal_sendTransaction",
    "admin_addPeer",
    "admin_removePeer",
    "miner_start",
    "miner_stop",
    "debug_traceTransaction",
    "eth_sign",
    "eth_signTransaction",
];

/// Always cacheable with no expiry, independent of params.
const IMMUTABLE_METHODS: &[&str] = &[
    "eth_chainId",
    "net_version",
    "eth_getTransactionReceipt",
    "eth_getTransactionByHash",
    "eth_getBlockByHash",
    "eth_getTransactionByBlockHashAndIndex",
    "eth_getTransactionByBlockNumberAndIndex",
    "eth_getUncleByBlockHashAndIndex",
    "eth_getBlockTransactionCountByHash",
    "eth_getUncleCountByBlockHash",
    "web3_clientVersion",
];

/// Ticks on every new block; cacheable for a short, config-driven window.
const LATEST_TICK_METHODS: &[&str] = &["eth_blockNumber"];

/// Cacheable only when the request pins a fixed historical point; otherwise bounded by a
/// config TTL (`eth_call`/`eth_getLogs`) or not cacheable at all (the rest).
const HISTORICAL_CONDITIONAL_METHODS: &[&str] = &[
    "eth_call",
    "eth_getBlockByNumber",
    "eth_getLogs",
    "eth_getStorageAt",
    "eth_getBalance",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub cacheable: bool,
    /// `None` means "never expires".
    pub max_age: Option<Duration>,
}

impl CachePolicy {
    pub const fn uncacheable() -> Self {
        Self { cacheable: false, max_age: None }
    }

    pub const fn forever() -> Self {
        Self { cacheable: true, max_age: None }
    }

    pub const fn ttl(duration: Duration) -> Self {
        Self { cacheable: true, max_age: Some(duration) }
    }
}

/// Config knobs the classifier needs for the two TTL-bearing classes.
#[derive(Debug, Clone, Copy)]
pub struct PolicyConfig {
    pub latest_tick_ttl: Duration,
    pub historical_conditional_ttl: Duration,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            latest_tick_ttl: Duration::from_secs(10),
            historical_conditional_ttl: Duration::from_secs(10),
        }
    }
}

pub fn classify(request: &JsonRpcRequest, config: &PolicyConfig) -> CachePolicy {
    let method = request.method.as_str();

    if NEVER_CACHE_METHODS.contains(&method) {
        return CachePolicy::uncacheable();
    }
    if IMMUTABLE_METHODS.contains(&method) {
        return CachePolicy::forever();
    }
    if LATEST_TICK_METHODS.contains(&method) {
        return CachePolicy::ttl(config.latest_tick_ttl);
    }
    if HISTORICAL_CONDITIONAL_METHODS.contains(&method) {
        if is_historical_fixed(request) {
            return CachePolicy::forever();
        }
        return match method {
            "eth_call" | "eth_getLogs" => CachePolicy::ttl(config.historical_conditional_ttl),
            _ => CachePolicy::uncacheable(),
        };
    }
    CachePolicy::uncacheable()
}

/// Whether `request` pins a specific past block, making its result immutable once produced.
/// `"earliest"`/`"safe"`/`"finalized"` are deliberately treated as *not* fixed — ambiguous
/// relative to the chain's reorg/finality window even though they look like fixed tags.
fn is_historical_fixed(request: &JsonRpcRequest) -> bool {
    let params = request.params_as_slice();
    match request.method.as_str() {
        "eth_call" => {
            let call_obj = params.first();
            let has_block_hash = call_obj.and_then(|v| v.get("blockHash")).is_some();
            has_block_hash || params.get(1).is_some_and(is_fixed_block_tag)
        }
        "eth_getBlockByNumber" => params.first().is_some_and(is_fixed_block_tag),
        "eth_getLogs" => params
            .first()
            .and_then(|filter| filter.get("toBlock"))
            .is_none_or(is_fixed_block_tag),
        "eth_getStorageAt" | "eth_getBalance" => params.iter().any(is_fixed_block_tag),
        _ => false,
    }
}

fn is_fixed_block_tag(v: &serde_json::Value) -> bool {
    match v.as_str() {
        Some(s) => s.starts_with("0x"),
        None => false,
    }
}
