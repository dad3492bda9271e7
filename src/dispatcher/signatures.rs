//! Recognizes RPC errors that indicate the node lacks requested archival state rather than a
//! real failure — a signal that a fallback with different pruning/archive depth might succeed.

use crate::jsonrpc::JsonRpcError;

const MESSAGE_SIGNATURES: &[&str] = &[
    "missing trie node",
    "header not found",
    "unknown block",
    "state not available",
    "historical state",
    "is not available",
];

pub fn is_historical_data_error(error: &JsonRpcError) -> bool {
    let message = error.message.to_lowercase();
    if MESSAGE_SIGNATURES.iter().any(|sig| message.contains(sig)) {
        return true;
    }
    if error.code == -32000 && message.contains("network error") {
        return true;
    }
    error.code == -32801
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(code: i64, message: &str) -> JsonRpcError {
        JsonRpcError { code, message: message.to_string(), data: None }
    }

    #[test]
    fn recognises_each_message_signature_case_insensitively() {
        for sig in MESSAGE_SIGNATURES {
            let upper = sig.to_uppercase();
            assert!(is_historical_data_error(&err(-32000, &upper)), "failed for {sig}");
        }
    }

    #[test]
    fn recognises_network_error_code() {
        assert!(is_historical_data_error(&err(-32000, "Network error: timeout")));
    }

    #[test]
    fn recognises_dash_32801() {
        assert!(is_historical_data_error(&err(-32801, "anything")));
    }

    #[test]
    fn ordinary_errors_are_not_historical() {
        assert!(!is_historical_data_error(&err(-32602, "invalid params")));
        assert!(!is_historical_data_error(&err(-32000, "insufficient funds")));
    }
}
