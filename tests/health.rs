use std::time::Duration;

use axum::routing::get;
use axum::Router;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use rpcproxy::health;
use rpcproxy::network::{NetworkRouter, NetworkSpec, UpstreamSpec};
use rpcproxy::upstream::UpstreamManager;

fn block_number_response(hex_block: &str) -> serde_json::Value {
    serde_json::json!({ "jsonrpc": "2.0", "result": hex_block, "id": 1 })
}

fn single_network_manager(url: &str) -> UpstreamManager {
    let router = NetworkRouter::new(vec![NetworkSpec::new("mainnet", UpstreamSpec::new(url))]);
    UpstreamManager::new(&router, 10)
}

#[tokio::test]
async fn notify_fires_when_primary_goes_down() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).respond_with(ResponseTemplate::new(500)).mount(&server).await;

    let manager = single_network_manager(&server.uri());
    let notify = manager.health_notify();

    for _ in 0..3 {
        manager.record_primary_error("mainnet").await;
    }

    let fired = tokio::time::timeout(Duration::from_millis(100), notify.notified()).await;
    assert!(fired.is_ok(), "health_notify should fire on the Down transition");
}

#[tokio::test]
async fn reactive_check_recovers_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(block_number_response("0x100")))
        .mount(&server)
        .await;

    let manager = single_network_manager(&server.uri());
    manager.check_all_backends(|url| async move { health::probe_backend_url(url).await }).await;
    assert!(manager.has_healthy_backend_with_block("mainnet").await);

    server.reset().await;
    Mock::given(method("POST")).respond_with(ResponseTemplate::new(500)).mount(&server).await;
    for _ in 0..3 {
        manager.record_primary_error("mainnet").await;
    }
    assert!(!manager.has_healthy_backend_with_block("mainnet").await);

    server.reset().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(block_number_response("0x200")))
        .mount(&server)
        .await;
    manager.check_all_backends(|url| async move { health::probe_backend_url(url).await }).await;
    assert!(manager.has_healthy_backend_with_block("mainnet").await);
}

#[tokio::test]
async fn checker_reacts_to_notify_signal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(block_number_response("0x100")))
        .mount(&server)
        .await;

    let manager = std::sync::Arc::new(single_network_manager(&server.uri()));
    let checker_manager = manager.clone();
    tokio::spawn(async move {
        health::start_health_checker(checker_manager, 3600).await;
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(manager.has_healthy_backend_with_block("mainnet").await, "healthy after startup probe");

    server.reset().await;
    Mock::given(method("POST")).respond_with(ResponseTemplate::new(500)).mount(&server).await;
    for _ in 0..3 {
        manager.record_primary_error("mainnet").await;
    }
    assert!(!manager.has_healthy_backend_with_block("mainnet").await, "unhealthy after 3 failures");

    server.reset().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(block_number_response("0x300")))
        .mount(&server)
        .await;

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(
        manager.has_healthy_backend_with_block("mainnet").await,
        "health checker should have reactively re-probed and recovered the backend"
    );
}

#[test]
fn health_check_fails_when_no_server() {
    assert_eq!(health::run_health_check(19091), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn health_check_succeeds_against_healthy_server() {
    async fn ok_handler() -> &'static str {
        "ok"
    }

    let app = Router::new().route("/health", get(ok_handler));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let result = tokio::task::spawn_blocking(move || health::run_health_check(port)).await.unwrap();
    assert_eq!(result, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn health_check_fails_against_unhealthy_server() {
    use axum::http::StatusCode;

    async fn unavailable_handler() -> (StatusCode, &'static str) {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    }

    let app = Router::new().route("/health", get(unavailable_handler));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let result = tokio::task::spawn_blocking(move || health::run_health_check(port)).await.unwrap();
    assert_eq!(result, 1);
}
