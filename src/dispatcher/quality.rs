//! Post-success inspection of a primary response: does it look suspicious enough to warrant a
//! fallback attempt even though it parsed as a JSON-RPC success?

use crate::cache::{classify, PolicyConfig};
use crate::jsonrpc::JsonRpcRequest;

/// Methods where an empty-looking success is worth double-checking against a fallback.
const CRITICAL_METHODS: &[&str] = &[
    "eth_call",
    "eth_getLogs",
    "eth_getBlockByNumber",
    "eth_getBlockByHash",
    "eth_getBlockReceipts",
    "eth_getTransactionReceipt",
    "eth_getStorageAt",
    "eth_getBalance",
    "eth_getCode",
    "eth_getTransactionByHash",
    "eth_getTransactionByBlockHashAndIndex",
    "eth_getTransactionByBlockNumberAndIndex",
];

/// Whether a JSON-RPC *success* result on a critical method still warrants trying the fallback,
/// because its shape suggests the primary may be missing data (out of sync, pruned, etc.).
pub fn is_fallback_worthy_success(request: &JsonRpcRequest, result: &serde_json::Value) -> bool {
    let method = request.method.as_str();
    if !CRITICAL_METHODS.contains(&method) {
        return false;
    }

    if is_empty_result(result) {
        return true;
    }
    if method != "eth_getLogs" && is_empty_array(result) {
        return true;
    }
    if result.as_str() == Some("0x") && !matches!(method, "eth_call" | "eth_getCode") {
        return true;
    }

    let historical_fixed = is_historical_fixed(request);
    if historical_fixed {
        let empty_logs = method == "eth_getLogs" && is_empty_array(result);
        if is_empty_result(result) || empty_logs {
            return true;
        }
    }

    if !historical_fixed && matches!(method, "eth_call" | "eth_getBlockByNumber" | "eth_getBlockReceipts") {
        if is_empty_result(result) || is_empty_array(result) {
            return true;
        }
    }

    false
}

fn is_empty_result(result: &serde_json::Value) -> bool {
    result.is_null() || result.as_str() == Some("")
}

fn is_empty_array(result: &serde_json::Value) -> bool {
    result.as_array().is_some_and(|a| a.is_empty())
}

fn is_historical_fixed(request: &JsonRpcRequest) -> bool {
    // Reuses the cacheability classifier's historical-fixed determination indirectly: a
    // `forever` policy on a historical-conditional method means the request is historical-fixed.
    let config = PolicyConfig::default();
    let policy = classify(request, &config);
    policy.cacheable && policy.max_age.is_none() && is_historical_conditional(&request.method)
}

fn is_historical_conditional(method: &str) -> bool {
    matches!(
        method,
        "eth_call" | "eth_getBlockByNumber" | "eth_getLogs" | "eth_getStorageAt" | "eth_getBalance"
    )
}
