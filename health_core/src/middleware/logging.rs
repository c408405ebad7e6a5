//! Request tracing for the health endpoints

use axum::body::Body;
use http::Request;
use std::time::Duration;
use tower_http::classify::{ServerErrorsAsFailures, ServerErrorsFailureClass, SharedClassifier};
use tower_http::trace::{
    DefaultOnBodyChunk, DefaultOnEos, MakeSpan, OnFailure, OnRequest, OnResponse, TraceLayer,
};
use tracing::info_span;

pub type HealthTraceLayer<M, Req, Res, F> = TraceLayer<
    SharedClassifier<ServerErrorsAsFailures>,
    M,
    Req,
    Res,
    DefaultOnBodyChunk,
    DefaultOnEos,
    F,
>;

/// Unhealthy (503) answers are logged as warnings.
pub fn logging_layer() -> HealthTraceLayer<
    impl MakeSpan<Body> + Clone,
    impl OnRequest<Body> + Clone,
    impl OnResponse<Body> + Clone,
    impl OnFailure<ServerErrorsFailureClass> + Clone,
> {
    TraceLayer::new_for_http()
        .make_span_with(|request: &Request<Body>| {
            info_span!(
                "health_request",
                method = %request.method(),
                path = %request.uri().path(),
            )
        })
        .on_request(|request: &Request<Body>, _span: &tracing::Span| {
            tracing::debug!("{} {}", request.method(), request.uri().path());
        })
        .on_response(|response: &http::Response<Body>, latency: Duration, _span: &tracing::Span| {
            let status = response.status();
            let latency_ms = latency.as_millis();

            if status.is_success() {
                tracing::debug!(status = status.as_u16(), latency_ms, "health request served");
            } else if status == http::StatusCode::SERVICE_UNAVAILABLE {
                tracing::warn!(status = status.as_u16(), latency_ms, "reported unavailable");
            } else if status.is_client_error() {
                tracing::warn!(status = status.as_u16(), latency_ms, "client error response");
            } else {
                tracing::error!(status = status.as_u16(), latency_ms, "server error response");
            }
        })
        .on_failure(
            |error: ServerErrorsFailureClass, latency: Duration, _span: &tracing::Span| {
                tracing::debug!(
                    latency_ms = latency.as_millis(),
                    error = ?error,
                    "health request classified as failure"
                );
            },
        )
}
