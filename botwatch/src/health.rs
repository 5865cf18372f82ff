use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::redis::probe;
use crate::router;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub environment: String,
    pub debug_mode: bool,
    pub redis_status: &'static str,
}

/// Basic health check. The process itself always reports ok; only the cache
/// field degrades when the dependency is unreachable.
pub async fn health_check(State(state): State<router::State>) -> Json<HealthResponse> {
    let redis_status = if probe(state.redis.as_ref()).await {
        "ok"
    } else {
        "unavailable"
    };

    Json(HealthResponse {
        status: "ok",
        environment: state.environment.clone(),
        debug_mode: state.debug,
        redis_status,
    })
}
