use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcResponse {
    pub fn error(id: serde_json::Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError { code, message: message.into(), data: None }),
            id,
        }
    }

    pub fn error_with_data(
        id: serde_json::Value,
        code: i64,
        message: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError { code, message: message.into(), data: Some(data) }),
            id,
        }
    }

    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self { jsonrpc: "2.0".to_string(), result: Some(result), error: None, id }
    }

    pub fn parse_error() -> Self {
        Self::error(serde_json::Value::Null, -32700, "Parse error")
    }

    pub fn invalid_request(id: serde_json::Value) -> Self {
        Self::error(id, -32600, "Invalid request")
    }

    pub fn method_not_found(id: serde_json::Value) -> Self {
        Self::error(id, -32601, "Method not found")
    }

    pub fn invalid_params(id: serde_json::Value) -> Self {
        Self::error(id, -32602, "Invalid params")
    }

    pub fn internal_error(id: serde_json::Value) -> Self {
        Self::error(id, -32603, "Internal error")
    }

    /// The one error code the core itself emits for upstream failure, carrying the underlying
    /// message in `data` so the caller retains some diagnostic signal.
    pub fn upstream_error(id: serde_json::Value, underlying: impl Into<String>) -> Self {
        Self::error_with_data(
            id,
            -32000,
            "Upstream error",
            serde_json::Value::String(underlying.into()),
        )
    }

    /// Whether this looks like a full JSON-RPC 2.0 envelope (has `jsonrpc` plus a
    /// `result`/`error`), as opposed to a bare result value stored under the legacy cache
    /// payload form. Used by the cache manager's serving-form rule.
    pub fn is_envelope_shaped(value: &serde_json::Value) -> bool {
        value.get("jsonrpc").and_then(|v| v.as_str()) == Some("2.0")
            && (value.get("result").is_some() || value.get("error").is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_serialization() {
        let resp = JsonRpcResponse::parse_error();
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("-32700"));
        assert!(json.contains("Parse error"));
    }

    #[test]
    fn test_upstream_error_carries_underlying_message() {
        let resp = JsonRpcResponse::upstream_error(serde_json::json!(1), "connection refused");
        let err = resp.error.unwrap();
        assert_eq!(err.code, -32000);
        assert_eq!(err.data, Some(serde_json::json!("connection refused")));
    }

    #[test]
    fn test_is_envelope_shaped() {
        let envelope = serde_json::json!({"jsonrpc": "2.0", "result": "0x1", "id": 1});
        assert!(JsonRpcResponse::is_envelope_shaped(&envelope));

        let bare = serde_json::json!("0x1");
        assert!(!JsonRpcResponse::is_envelope_shaped(&bare));

        let error_envelope = serde_json::json!({"jsonrpc": "2.0", "error": {"code": -32000, "message": "x"}});
        assert!(JsonRpcResponse::is_envelope_shaped(&error_envelope));
    }
}
