//! Health check handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness probe).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub fingerprint: String,
    pub runs_in_flight: usize,
    pub max_runs: usize,
}

/// Readiness probe; fails once shutdown has begun.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let supervisor = state.pipeline.supervisor();
    let draining = supervisor.is_shutting_down();

    let response = ReadinessResponse {
        status: if draining { "draining" } else { "ready" }.to_string(),
        fingerprint: state.pipeline.fingerprint().to_string(),
        runs_in_flight: supervisor.in_flight(),
        max_runs: supervisor.max_tasks(),
    };
    let code = if draining { StatusCode::SERVICE_UNAVAILABLE } else { StatusCode::OK };

    (code, Json(response))
}
