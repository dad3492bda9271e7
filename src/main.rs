use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use rpcproxy::cache::{CacheManager, PersistentKv, PolicyConfig, SqliteKv};
use rpcproxy::clock::SystemClock;
use rpcproxy::config::Config;
use rpcproxy::dispatcher::Dispatcher;
use rpcproxy::handler::{metrics::metrics_handler, rpc, status, AppState};
use rpcproxy::health;
use rpcproxy::network::NetworkRouter;
use rpcproxy::upstream::UpstreamManager;

const UPSTREAM_CONCURRENCY_POOL: usize = 50;

#[tokio::main]
async fn main() {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("startup failed: {e}");
            std::process::exit(1);
        }
    };

    if config.health_check {
        std::process::exit(health::run_health_check(config.port));
    }

    let log_level = if config.verbose { "debug,hyper=info,reqwest=info" } else { "warn,rpcproxy=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    info!(
        port = %config.port,
        networks = ?config.networks.iter().map(|n| n.key.as_str()).collect::<Vec<_>>(),
        cache_max_size = %config.cache_max_size,
        cache_enable_db = %config.cache_enable_db,
        health_interval = %config.health_interval,
        auth = config.token.is_some(),
        verbose = config.verbose,
        "starting rpcproxy"
    );

    if let Some(ref t) = config.token {
        info!(path = %format!("/{t}"), "token auth enabled via URL path");
    }

    let router = NetworkRouter::new(config.networks.clone());
    let upstream = UpstreamManager::new(&router, UPSTREAM_CONCURRENCY_POOL);
    let clock = Arc::new(SystemClock::new());

    let persistent: Option<Arc<dyn PersistentKv>> = if config.cache_enable_db {
        match SqliteKv::open(&config.cache_db_file) {
            Ok(kv) => Some(Arc::new(kv)),
            Err(e) => {
                eprintln!("failed to open persistent cache at {}: {e}", config.cache_db_file.display());
                std::process::exit(1);
            }
        }
    } else {
        None
    };
    let cache = CacheManager::new(config.cache_max_size, persistent, clock.clone());

    let dispatcher = Arc::new(Dispatcher::new(
        router,
        cache,
        upstream,
        PolicyConfig::default(),
        clock,
    ));

    if let Some(max_age) = config.cache_max_age {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(3600));
            loop {
                ticker.tick().await;
                let deleted = dispatcher.cache().sweep(max_age).await;
                if deleted > 0 {
                    info!(deleted, "cache sweep removed stale entries");
                }
            }
        });
    }

    tokio::spawn(health::start_health_checker(
        dispatcher.upstream_handle(),
        config.health_interval,
    ));

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let state = AppState { dispatcher, token: config.token.clone(), metrics_handle: prometheus_handle };

    let mut app = Router::new()
        .route("/health", get(status::health_handler))
        .route("/readiness", get(status::readiness_handler))
        .route("/status", get(status::status_handler))
        .route("/stats", get(status::status_handler))
        .route("/cache/stats", get(status::cache_stats_handler))
        .route("/cache/clear", post(status::cache_clear_handler))
        .route("/metrics", get(metrics_handler));

    app = if config.token.is_some() {
        app.route("/{token}", post(rpc::token_default_network_handler))
            .route("/{token}/{network}", post(rpc::token_network_handler))
    } else {
        app.route("/", post(rpc::default_network_handler))
            .route("/{network}", post(rpc::network_handler))
    };

    let app = app
        .layer(CorsLayer::new().allow_methods([Method::GET, Method::POST]).allow_headers(Any).allow_origin(Any))
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.expect("failed to bind");

    info!(addr = %addr, "rpcproxy listening");
    axum::serve(listener, app).await.expect("server error");
}
