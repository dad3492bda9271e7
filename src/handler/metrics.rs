use axum::extract::State;
use axum::response::IntoResponse;

use super::AppState;

/// `GET /metrics` — Prometheus text exposition. Open, unauthenticated, matching the teacher's
/// treatment of `/health` as a collaborator-facing probe endpoint.
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics_handle.render()
}
