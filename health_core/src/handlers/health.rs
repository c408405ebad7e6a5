//! Health, readiness and liveness handlers

use crate::{
    error::{HealthError, Result},
    health::{exporter::status_code, StatusResponse},
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::{debug, warn};

pub async fn handle_health(State(state): State<AppState>) -> StatusResponse {
    debug!("GET /health - Serving aggregated check results");

    let response = state.engine.exporter().get_status().await;
    if response.status_code != StatusCode::OK {
        warn!("Health endpoint answering {}", response.status_code);
    }
    response
}

pub async fn handle_check_health(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusResponse> {
    debug!("GET /health/{} - Serving single check result", name);

    state
        .engine
        .exporter()
        .check_status(&name)
        .ok_or_else(|| HealthError::NotFound(format!("Check '{}' is not registered", name)))
}

pub async fn handle_readiness(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.engine.status();

    (
        status_code(status.overall),
        Json(serde_json::json!({
            "status": status.overall,
            "timestamp": status.timestamp,
        })),
    )
}

pub async fn handle_liveness() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "alive",
            "timestamp": chrono::Utc::now(),
        })),
    )
}

pub async fn handle_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "checks": state.engine.stats_all(),
        "listener_faults": state.engine.listener_faults(),
    }))
}
