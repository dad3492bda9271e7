//! Structural/semantic checks a result must pass before it's allowed into the cache. A veto
//! here doesn't fail the request — the caller still gets the result, it just isn't stored.

use crate::jsonrpc::JsonRpcRequest;

pub fn validate(request: &JsonRpcRequest, result: &serde_json::Value) -> bool {
    if request.method == "eth_getLogs" {
        return validate_get_logs(request, result);
    }
    !result.is_null()
}

fn validate_get_logs(request: &JsonRpcRequest, result: &serde_json::Value) -> bool {
    let Some(logs) = result.as_array() else { return false };
    if logs.is_empty() {
        return true;
    }

    let filter = request.params_as_slice().first();
    let filter_address = filter
        .and_then(|f| f.get("address"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_lowercase());
    let filter_topic0 = filter
        .and_then(|f| f.get("topics"))
        .and_then(|t| t.as_array())
        .and_then(|arr| arr.first())
        .and_then(|v| v.as_str())
        .map(|s| s.to_lowercase());
    let from_block = filter.and_then(|f| f.get("fromBlock")).and_then(|v| v.as_str());
    let to_block = filter.and_then(|f| f.get("toBlock")).and_then(|v| v.as_str());
    let block_range = match (from_block, to_block) {
        (Some(from), Some(to)) if from.starts_with("0x") && to.starts_with("0x") => {
            let from = u64::from_str_radix(from.trim_start_matches("0x"), 16).ok();
            let to = u64::from_str_radix(to.trim_start_matches("0x"), 16).ok();
            from.zip(to)
        }
        _ => None,
    };

    for log in sample_indices(logs.len()).map(|i| &logs[i]) {
        if !log_matches(log, filter_address.as_deref(), filter_topic0.as_deref(), block_range) {
            return false;
        }
    }
    true
}

fn log_matches(
    log: &serde_json::Value,
    filter_address: Option<&str>,
    filter_topic0: Option<&str>,
    block_range: Option<(u64, u64)>,
) -> bool {
    if let Some(expected) = filter_address {
        let Some(actual) = log.get("address").and_then(|v| v.as_str()) else { return false };
        if actual.to_lowercase() != expected {
            return false;
        }
    }
    if let Some(expected) = filter_topic0 {
        let Some(actual) = log
            .get("topics")
            .and_then(|t| t.as_array())
            .and_then(|arr| arr.first())
            .and_then(|v| v.as_str())
        else {
            return false;
        };
        if actual.to_lowercase() != expected {
            return false;
        }
    }
    if let Some((from, to)) = block_range {
        let Some(block_hex) = log.get("blockNumber").and_then(|v| v.as_str()) else { return false };
        let Ok(block) = u64::from_str_radix(block_hex.trim_start_matches("0x"), 16) else {
            return false;
        };
        if block < from || block > to {
            return false;
        }
    }
    true
}

/// First, middle, last for large arrays; first and last for small ones — keeps validation cost
/// sub-linear in result size.
fn sample_indices(len: usize) -> impl Iterator<Item = usize> {
    let indices: Vec<usize> = if len <= 2 {
        (0..len).collect()
    } else if len <= 10 {
        vec![0, len - 1]
    } else {
        vec![0, len / 2, len - 1]
    };
    indices.into_iter()
}
