use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    pub id: serde_json::Value,
}

impl JsonRpcRequest {
    /// Structural validity of the JSON-RPC 2.0 envelope — not a cacheability or routing
    /// decision, just "is this a request we can dispatch at all".
    pub fn is_valid(&self) -> bool {
        self.jsonrpc == "2.0" && !self.method.is_empty()
    }

    pub fn params_as_slice(&self) -> &[serde_json::Value] {
        match &self.params {
            serde_json::Value::Array(a) => a.as_slice(),
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcBody {
    Single(JsonRpcRequest),
    Batch(Vec<JsonRpcRequest>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_request() {
        let json = r#"{"jsonrpc":"2.0","method":"eth_blockNumber","params":[],"id":1}"#;
        let req: JsonRpcRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.method, "eth_blockNumber");
        assert_eq!(req.jsonrpc, "2.0");
        assert!(req.is_valid());
    }

    #[test]
    fn test_parse_batch_request() {
        let json = r#"[
            {"jsonrpc":"2.0","method":"eth_blockNumber","params":[],"id":1},
            {"jsonrpc":"2.0","method":"eth_chainId","params":[],"id":2}
        ]"#;
        let body: JsonRpcBody = serde_json::from_str(json).unwrap();
        match body {
            JsonRpcBody::Batch(reqs) => assert_eq!(reqs.len(), 2),
            _ => panic!("expected batch"),
        }
    }

    #[test]
    fn test_invalid_json_returns_parse_error() {
        let result = serde_json::from_str::<JsonRpcBody>("not json");
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_request_missing_method() {
        let json = r#"{"jsonrpc":"2.0","method":"","params":[],"id":1}"#;
        let req: JsonRpcRequest = serde_json::from_str(json).unwrap();
        assert!(!req.is_valid());
    }

    #[test]
    fn test_params_as_slice_defaults_empty() {
        let json = r#"{"jsonrpc":"2.0","method":"eth_blockNumber","id":1}"#;
        let req: JsonRpcRequest = serde_json::from_str(json).unwrap();
        assert!(req.params_as_slice().is_empty());
    }
}
