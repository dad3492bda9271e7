use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceExt;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use rpcproxy::cache::{CacheManager, PolicyConfig};
use rpcproxy::clock::SystemClock;
use rpcproxy::dispatcher::Dispatcher;
use rpcproxy::handler::{rpc, status, AppState};
use rpcproxy::network::{NetworkRouter, NetworkSpec, UpstreamSpec};
use rpcproxy::upstream::UpstreamManager;

fn ok_response(result: &str) -> serde_json::Value {
    serde_json::json!({ "jsonrpc": "2.0", "result": result, "id": 1 })
}

fn app(networks: Vec<NetworkSpec>, token: Option<&str>) -> Router {
    let router = NetworkRouter::new(networks);
    let upstream = UpstreamManager::new(&router, 10);
    let clock = Arc::new(SystemClock::new());
    let cache = CacheManager::new(1000, None, clock.clone());
    let dispatcher = Arc::new(Dispatcher::new(router, cache, upstream, PolicyConfig::default(), clock));
    let prometheus_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .build_recorder()
        .handle();

    let state = AppState { dispatcher, token: token.map(String::from), metrics_handle: prometheus_handle };

    let mut router = Router::new()
        .route("/health", get(status::health_handler))
        .route("/readiness", get(status::readiness_handler))
        .route("/status", get(status::status_handler))
        .route("/cache/stats", get(status::cache_stats_handler))
        .route("/cache/clear", post(status::cache_clear_handler));

    router = if token.is_some() {
        router
            .route("/{token}", post(rpc::token_default_network_handler))
            .route("/{token}/{network}", post(rpc::token_network_handler))
    } else {
        router
            .route("/", post(rpc::default_network_handler))
            .route("/{network}", post(rpc::network_handler))
    };

    router.with_state(state)
}

async fn post_body(app: &Router, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[tokio::test]
async fn auth_rejects_wrong_token_path() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_response("0x1")))
        .mount(&server)
        .await;

    let app = app(vec![NetworkSpec::new("mainnet", UpstreamSpec::new(server.uri()))], Some("secret"));

    let (status, _) =
        post_body(&app, "/wrong-token", r#"{"jsonrpc":"2.0","method":"eth_blockNumber","params":[],"id":1}"#).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn auth_accepts_correct_token_path() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_response("0x123")))
        .mount(&server)
        .await;

    let app = app(vec![NetworkSpec::new("mainnet", UpstreamSpec::new(server.uri()))], Some("secret"));

    let (status, body) =
        post_body(&app, "/secret", r#"{"jsonrpc":"2.0","method":"eth_blockNumber","params":[],"id":1}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "0x123");
}

#[tokio::test]
async fn token_path_selects_named_network() {
    let mainnet = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_response("0xmainnet")))
        .mount(&mainnet)
        .await;
    let sepolia = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_response("0xsepolia")))
        .mount(&sepolia)
        .await;

    let app = app(
        vec![
            NetworkSpec::new("mainnet", UpstreamSpec::new(mainnet.uri())),
            NetworkSpec::new("sepolia", UpstreamSpec::new(sepolia.uri())),
        ],
        Some("secret"),
    );

    let (status, body) = post_body(
        &app,
        "/secret/sepolia",
        r#"{"jsonrpc":"2.0","method":"eth_chainId","params":[],"id":1}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "0xsepolia");
}

#[tokio::test]
async fn open_proxy_accepts_requests_on_root() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_response("0xabc")))
        .mount(&server)
        .await;

    let app = app(vec![NetworkSpec::new("mainnet", UpstreamSpec::new(server.uri()))], None);

    let (status, body) =
        post_body(&app, "/", r#"{"jsonrpc":"2.0","method":"eth_blockNumber","params":[],"id":1}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "0xabc");
}

// ---------------------------------------------------------------------------
// RPC dispatch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_json_returns_parse_error() {
    let server = MockServer::start().await;
    let app = app(vec![NetworkSpec::new("mainnet", UpstreamSpec::new(server.uri()))], None);

    let (status, body) = post_body(&app, "/", "not valid json").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"]["code"], -32700);
}

#[tokio::test]
async fn batch_request_returns_array() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_response("0x1")))
        .mount(&server)
        .await;

    let app = app(vec![NetworkSpec::new("mainnet", UpstreamSpec::new(server.uri()))], None);

    let (status, body) = post_body(
        &app,
        "/",
        r#"[
            {"jsonrpc":"2.0","method":"eth_blockNumber","params":[],"id":1},
            {"jsonrpc":"2.0","method":"eth_chainId","params":[],"id":2}
        ]"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().expect("batch should return array").len(), 2);
}

#[tokio::test]
async fn invalid_request_returns_error() {
    let server = MockServer::start().await;
    let app = app(vec![NetworkSpec::new("mainnet", UpstreamSpec::new(server.uri()))], None);

    let (status, body) = post_body(&app, "/", r#"{"jsonrpc":"2.0","method":"","params":[],"id":1}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"]["code"], -32600);
}

#[tokio::test]
async fn unknown_network_segment_returns_404() {
    let server = MockServer::start().await;
    let app = app(vec![NetworkSpec::new("mainnet", UpstreamSpec::new(server.uri()))], None);

    let (status, body) =
        post_body(&app, "/polygon", r#"{"jsonrpc":"2.0","method":"eth_blockNumber","params":[],"id":1}"#).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("polygon"));
}

// ---------------------------------------------------------------------------
// Status endpoints
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_503_before_first_probe() {
    let server = MockServer::start().await;
    let app = app(vec![NetworkSpec::new("mainnet", UpstreamSpec::new(server.uri()))], None);

    let resp = app
        .oneshot(Request::builder().method("GET").uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn status_rejects_without_auth() {
    let server = MockServer::start().await;
    let app = app(vec![NetworkSpec::new("mainnet", UpstreamSpec::new(server.uri()))], Some("tok"));

    let resp = app
        .oneshot(Request::builder().method("GET").uri("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn status_returns_backend_and_cache_detail_with_auth() {
    let server = MockServer::start().await;
    let app = app(vec![NetworkSpec::new("mainnet", UpstreamSpec::new(server.uri()))], Some("tok"));

    let resp = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/status")
                .header("authorization", "Bearer tok")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["backends"].is_array());
    assert_eq!(body["total_backends"], 1); // primary only, no fallback configured
}

#[tokio::test]
async fn cache_clear_requires_auth() {
    let server = MockServer::start().await;
    let app = app(vec![NetworkSpec::new("mainnet", UpstreamSpec::new(server.uri()))], Some("tok"));

    let resp = app
        .oneshot(Request::builder().method("POST").uri("/cache/clear").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}
