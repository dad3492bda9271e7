use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use tracing::warn;

use crate::health;
use std::time::Duration;

use super::auth::check_bearer_token;
use super::AppState;

/// Public health check: a static envelope plus a short-timeout `net_version` probe against the
/// default network's primary upstream. Used for Docker `HEALTHCHECK`.
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let router = state.dispatcher.router();
    let Some(network) = router.resolve("") else {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({ "status": "unavailable" })));
    };

    match health::probe_net_version(&network.primary.url, Duration::from_secs(2)).await {
        Ok(net_version) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "ok", "network": network.key, "net_version": net_version })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "unavailable", "network": network.key, "error": e.to_string() })),
        ),
    }
}

/// Readiness probe — bearer-protected, reports every configured network's backend states.
pub async fn readiness_handler(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if !check_bearer_token(&state, &headers) {
        warn!("unauthorized readiness request (missing or bad token)");
        return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({ "error": "Unauthorized" })));
    }

    let ok = state.dispatcher.upstream().any_network_healthy().await;
    let statuses = state.dispatcher.upstream().all_backend_statuses().await;

    let body = serde_json::json!({
        "status": if ok { "ok" } else { "unavailable" },
        "backends": statuses,
    });

    if ok {
        (StatusCode::OK, Json(body))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(body))
    }
}

/// Detailed status endpoint showing every network's backends plus cache tier sizes.
pub async fn status_handler(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if !check_bearer_token(&state, &headers) {
        warn!("unauthorized status request (missing or bad token)");
        return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({ "error": "Unauthorized" })));
    }

    let statuses = state.dispatcher.upstream().all_backend_statuses().await;
    let healthy_count = statuses.iter().filter(|s| s.state == "Healthy").count();
    let total = statuses.len();
    let memory_size = state.dispatcher.cache().memory_size().await;
    let persistent = state.dispatcher.cache().persistent_stats().await;

    let body = serde_json::json!({
        "healthy_backends": healthy_count,
        "total_backends": total,
        "cache": {
            "memory_entries": memory_size,
            "persistent": persistent.map(|s| serde_json::json!({
                "count": s.count,
                "min_ts": s.min_ts,
                "max_ts": s.max_ts,
            })),
        },
        "backends": statuses,
        "networks": state.dispatcher.router().keys().collect::<Vec<_>>(),
    });

    (StatusCode::OK, Json(body))
}

/// `GET /cache/stats` — cache tier sizes only, without the backend detail `status_handler` carries.
pub async fn cache_stats_handler(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if !check_bearer_token(&state, &headers) {
        warn!("unauthorized cache stats request (missing or bad token)");
        return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({ "error": "Unauthorized" })));
    }

    let memory_size = state.dispatcher.cache().memory_size().await;
    let persistent = state.dispatcher.cache().persistent_stats().await;

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "memory_entries": memory_size,
            "persistent": persistent.map(|s| serde_json::json!({
                "count": s.count,
                "min_ts": s.min_ts,
                "max_ts": s.max_ts,
            })),
        })),
    )
}

/// `POST /cache/clear` — invalidates both cache tiers entirely.
pub async fn cache_clear_handler(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if !check_bearer_token(&state, &headers) {
        warn!("unauthorized cache clear request (missing or bad token)");
        return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({ "error": "Unauthorized" })));
    }

    state.dispatcher.cache().clear_all().await;
    (StatusCode::OK, Json(serde_json::json!({ "status": "cleared" })))
}
