use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use tracing::warn;

use crate::error::RpcProxyError;
use crate::jsonrpc::{JsonRpcBody, JsonRpcRequest, JsonRpcResponse};

use super::AppState;

/// POST / — dispatches against the default network. Only reachable when no token is configured.
pub async fn default_network_handler(State(state): State<AppState>, body: String) -> impl IntoResponse {
    dispatch_rpc(&state, "", body).await
}

/// POST /:network — dispatches against a named network. Only reachable when no token is configured.
pub async fn network_handler(
    State(state): State<AppState>,
    Path(network): Path<String>,
    body: String,
) -> impl IntoResponse {
    dispatch_rpc(&state, &network, body).await
}

/// POST /:token — token-gated, default network. The path segment IS the token, not a network.
pub async fn token_default_network_handler(
    State(state): State<AppState>,
    Path(token): Path<String>,
    body: String,
) -> impl IntoResponse {
    if !token_matches(&state, &token) {
        return unauthorized();
    }
    dispatch_rpc(&state, "", body).await
}

/// POST /:token/:network — token-gated, explicit network. The token is checked before the
/// network segment is resolved, per the path's documented precedence.
pub async fn token_network_handler(
    State(state): State<AppState>,
    Path((token, network)): Path<(String, String)>,
    body: String,
) -> impl IntoResponse {
    if !token_matches(&state, &token) {
        return unauthorized();
    }
    dispatch_rpc(&state, &network, body).await
}

fn token_matches(state: &AppState, candidate: &str) -> bool {
    match &state.token {
        Some(expected) => candidate == expected.as_str(),
        None => true,
    }
}

fn unauthorized() -> (StatusCode, Json<serde_json::Value>) {
    warn!("unauthorized RPC request (bad token)");
    (
        StatusCode::UNAUTHORIZED,
        Json(
            serde_json::to_value(JsonRpcResponse::error(serde_json::Value::Null, -32000, "Unauthorized"))
                .unwrap(),
        ),
    )
}

async fn dispatch_rpc(state: &AppState, network: &str, body: String) -> (StatusCode, Json<serde_json::Value>) {
    if state.dispatcher.router().resolve(network).is_none() {
        return unknown_network(network);
    }

    let parsed = match serde_json::from_str::<JsonRpcBody>(&body) {
        Ok(parsed) => parsed,
        Err(_) => {
            let resp = JsonRpcResponse::parse_error();
            return (StatusCode::OK, Json(serde_json::to_value(resp).unwrap()));
        }
    };

    match parsed {
        JsonRpcBody::Single(request) => {
            let resp = serve_one(state, network, request).await;
            (StatusCode::OK, Json(serde_json::to_value(resp).unwrap()))
        }
        JsonRpcBody::Batch(requests) => {
            let mut responses = Vec::with_capacity(requests.len());
            for request in requests {
                responses.push(serve_one(state, network, request).await);
            }
            (StatusCode::OK, Json(serde_json::to_value(responses).unwrap()))
        }
    }
}

/// The network segment is resolved once, up front, since it's shared by every request in a
/// batch — a miss here short-circuits the whole call with a 404 instead of dispatching anything.
fn unknown_network(network: &str) -> (StatusCode, Json<serde_json::Value>) {
    warn!(network, "unknown network requested");
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": RpcProxyError::UnknownNetwork(network.to_string()).to_string() })),
    )
}

async fn serve_one(state: &AppState, network: &str, request: JsonRpcRequest) -> JsonRpcResponse {
    if !request.is_valid() {
        return JsonRpcResponse::invalid_request(request.id);
    }
    let id = request.id.clone();
    match state.dispatcher.serve(network, request).await {
        Ok(resp) => resp,
        // Unreachable in practice: dispatch_rpc already verified the network resolves before
        // any request in this call was dispatched.
        Err(e) => JsonRpcResponse::error(id, -32000, &e.to_string()),
    }
}
