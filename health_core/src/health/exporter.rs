//! Serializable health payload and HTTP status for the read path.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::task::JoinError;
use tracing::{error, warn};

use super::aggregator::{AggregateStatus, Aggregator, OverallStatus};
use super::result::{CheckResult, CheckStatus};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReport {
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub details: Option<Value>,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub contiguous_failures: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_of_first_failure: Option<DateTime<Utc>>,
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

impl From<&CheckResult> for CheckReport {
    fn from(result: &CheckResult) -> Self {
        Self {
            status: result.status,
            error: result.error.clone(),
            details: result.details.clone(),
            timestamp: result.timestamp,
            duration_ms: u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX),
            contiguous_failures: result.contiguous_failures,
            time_of_first_failure: result.time_of_first_failure,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub status: OverallStatus,
    pub timestamp: DateTime<Utc>,
    pub checks: BTreeMap<String, CheckReport>,
}

impl From<&AggregateStatus> for StatusReport {
    fn from(status: &AggregateStatus) -> Self {
        Self {
            status: status.overall,
            timestamp: status.timestamp,
            checks: status
                .checks
                .iter()
                .map(|(name, result)| (name.clone(), CheckReport::from(result)))
                .collect(),
        }
    }
}

/// A JSON payload paired with the HTTP status it should be served with.
#[derive(Debug, Clone)]
pub struct StatusResponse {
    pub status_code: StatusCode,
    pub payload: Value,
}

impl StatusResponse {
    fn internal_error(message: &str) -> Self {
        Self {
            status_code: StatusCode::INTERNAL_SERVER_ERROR,
            payload: json!({ "status": OverallStatus::Unhealthy, "error": message }),
        }
    }
}

impl IntoResponse for StatusResponse {
    fn into_response(self) -> Response {
        (self.status_code, Json(self.payload)).into_response()
    }
}

pub fn status_code(overall: OverallStatus) -> StatusCode {
    match overall {
        OverallStatus::Healthy => StatusCode::OK,
        OverallStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[derive(Clone)]
pub struct StatusExporter {
    aggregator: Arc<Aggregator>,
    timeout: Duration,
}

impl StatusExporter {
    pub fn new(aggregator: Arc<Aggregator>, timeout: Duration) -> Self {
        Self { aggregator, timeout }
    }

    /// Pure mapping from an aggregate to payload and status code.
    pub fn render(status: &AggregateStatus) -> StatusResponse {
        match serde_json::to_value(StatusReport::from(status)) {
            Ok(payload) => StatusResponse {
                status_code: status_code(status.overall),
                payload,
            },
            Err(e) => {
                error!("Failed to serialize health status: {}", e);
                StatusResponse::internal_error("failed to render health status")
            }
        }
    }

    /// Latest aggregate, bounded by the configured ceiling.
    pub async fn get_status(&self) -> StatusResponse {
        let aggregator = self.aggregator.clone();
        let rendering = tokio::task::spawn_blocking(move || Self::render(&aggregator.snapshot()));
        self.bounded(rendering).await
    }

    /// Waits for `rendering` no longer than the ceiling. Expiry answers 503 and a
    /// failed rendering task answers 500.
    pub(crate) async fn bounded<F>(&self, rendering: F) -> StatusResponse
    where
        F: Future<Output = std::result::Result<StatusResponse, JoinError>>,
    {
        match tokio::time::timeout(self.timeout, rendering).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                error!("Health status rendering failed: {}", e);
                StatusResponse::internal_error("failed to render health status")
            }
            Err(_) => {
                warn!("Health status computation exceeded {:?}", self.timeout);
                StatusResponse {
                    status_code: StatusCode::SERVICE_UNAVAILABLE,
                    payload: json!({
                        "status": OverallStatus::Unhealthy,
                        "error": "status computation timed out",
                    }),
                }
            }
        }
    }

    /// Report for a single check, or `None` if it is not registered.
    pub fn check_status(&self, name: &str) -> Option<StatusResponse> {
        let status = self.aggregator.snapshot();
        let result = status.checks.get(name)?;

        let status_code = if result.status.is_failure() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::OK
        };
        let response = match serde_json::to_value(CheckReport::from(result)) {
            Ok(payload) => StatusResponse { status_code, payload },
            Err(e) => {
                error!("Failed to serialize status of check '{}': {}", name, e);
                StatusResponse::internal_error("failed to render check status")
            }
        };
        Some(response)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
