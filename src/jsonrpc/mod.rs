mod request;
mod response;

pub use request::{JsonRpcBody, JsonRpcRequest};
pub use response::{JsonRpcError, JsonRpcResponse};
