//! Health check endpoints for liveness and readiness probes.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::errors::ApiResponse;
use crate::AppState;

/// Readiness probe detail.
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub catalogs: usize,
}

/// Liveness probe: always returns OK if the process is running.
pub async fn live() -> &'static str {
    "OK"
}

/// Readiness probe: ready once at least one catalog is loaded.
pub async fn ready(State(state): State<AppState>) -> Json<ApiResponse<HealthStatus>> {
    let catalogs = state.catalogs.len();
    let status = if catalogs == 0 {
        tracing::warn!("Readiness check: no catalogs loaded");
        "degraded"
    } else {
        "ok"
    };

    ApiResponse::success(HealthStatus {
        status: status.to_string(),
        catalogs,
    })
}
