//! Engine error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HealthError>;

#[derive(Error, Debug)]
pub enum HealthError {
    #[error("Invalid check configuration: {0}")]
    InvalidConfig(String),

    #[error("Check '{0}' is already registered")]
    DuplicateName(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Health engine is shutting down")]
    ShuttingDown,

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IntoResponse for HealthError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            HealthError::InvalidConfig(msg) => (StatusCode::BAD_REQUEST, msg),
            HealthError::DuplicateName(name) => (
                StatusCode::CONFLICT,
                format!("Check '{}' is already registered", name),
            ),
            HealthError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            HealthError::ShuttingDown => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Health engine is shutting down".to_string(),
            ),
            HealthError::Runtime(msg) => {
                tracing::error!("Runtime error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            HealthError::Serialization(err) => {
                tracing::error!("Serialization error: {:?}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            HealthError::Io(err) => {
                tracing::error!("IO error: {:?}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            HealthError::Config(err) => {
                tracing::error!("Configuration error: {:?}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            HealthError::Other(err) => {
                tracing::error!("Unexpected error: {:?}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
