//! `GET /health` and `GET /metrics` (§2 supplement): uptime + catalog/engine
//! reachability, and plain-text request/scan-task counters.

use crate::state::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub database_reachable: bool,
    pub lexical_reachable: bool,
    pub vector_reachable: bool,
}

/// Never fails itself; unreachable dependencies are surfaced in the body
/// with `status: "degraded"` rather than a 5xx (spec §7: "both unavailable
/// → empty result set with status surfaced in `/health`").
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database_reachable = sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&state.db).await.is_ok();
    let (lexical_reachable, vector_reachable) = tokio::join!(state.lexical.health(), state.vector.health());

    let status = if database_reachable && lexical_reachable && vector_reachable { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        uptime_secs: state.started_at.elapsed().as_secs(),
        database_reachable,
        lexical_reachable,
        vector_reachable,
    })
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.render()
}
