//! Route table for the health service

use crate::AppState;
use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};

use super::health::{
    handle_check_health, handle_health, handle_liveness, handle_readiness, handle_stats,
};

pub fn create_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/health/:name", get(handle_check_health))
        .route("/ready", get(handle_readiness))
        .route("/live", get(handle_liveness))
        .route("/api/stats", get(handle_stats))
}

async fn handle_root(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "app": state.app_name,
        "version": state.version,
        "checks": state.engine.check_names(),
        "endpoints": {
            "health": "/health",
            "check": "/health/{name}",
            "ready": "/ready",
            "live": "/live",
            "stats": "/api/stats"
        }
    }))
}
