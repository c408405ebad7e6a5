use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use health_core::health::{check_fn, CheckConfig, CheckError, HealthEngine};
use health_core::{create_app, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tower::ServiceExt;

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

async fn wait_for_results(engine: &HealthEngine, names: &[&str]) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if names.iter().all(|name| engine.result(name).is_some()) {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("checks {:?} never completed", names);
}

async fn healthy_app() -> (Router, Arc<HealthEngine>) {
    let engine = Arc::new(HealthEngine::new().unwrap());
    engine
        .register(
            CheckConfig::new("db")
                .check(check_fn(|_| async { Ok(json!({"connections": 3})) }))
                .execution_period(Duration::from_millis(50)),
        )
        .unwrap();
    wait_for_results(&engine, &["db"]).await;

    (create_app(AppState::new(engine.clone())), engine)
}

#[tokio::test]
async fn test_health_endpoint_reports_healthy() {
    let (app, engine) = healthy_app().await;

    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Healthy");
    assert_eq!(body["checks"]["db"]["status"], "Healthy");
    assert_eq!(body["checks"]["db"]["details"]["connections"], 3);
    assert!(body["checks"]["db"].get("error").is_none());

    engine.shutdown().await;
}

#[tokio::test]
async fn test_health_endpoint_reports_failure() {
    let engine = Arc::new(HealthEngine::new().unwrap());
    engine
        .register(CheckConfig::new("cache").check(check_fn(|_| async {
            Err(CheckError::new("connection refused"))
        })))
        .unwrap();
    wait_for_results(&engine, &["cache"]).await;
    let app = create_app(AppState::new(engine.clone()));

    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "Unhealthy");
    assert_eq!(body["checks"]["cache"]["error"], "connection refused");
    assert_eq!(body["checks"]["cache"]["contiguousFailures"], 1);

    let (status, body) = get(&app, "/health/cache").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "Unhealthy");

    let (status, body) = get(&app, "/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "Unhealthy");

    // Liveness does not depend on check results.
    let (status, _) = get(&app, "/live").await;
    assert_eq!(status, StatusCode::OK);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_single_check_endpoint() {
    let (app, engine) = healthy_app().await;

    let (status, body) = get(&app, "/health/db").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Healthy");

    let (status, body) = get(&app, "/health/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
    assert!(body["error"].as_str().unwrap().contains("missing"));

    engine.shutdown().await;
}

#[tokio::test]
async fn test_liveness_and_readiness() {
    let (app, engine) = healthy_app().await;

    let (status, body) = get(&app, "/live").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "alive");

    let (status, body) = get(&app, "/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Healthy");

    engine.shutdown().await;
}

#[tokio::test]
async fn test_stats_and_root_endpoints() {
    let (app, engine) = healthy_app().await;

    let (status, body) = get(&app, "/api/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["checks"]["db"]["executions"].as_u64().unwrap() >= 1);
    assert_eq!(body["listener_faults"], 0);

    let (status, body) = get(&app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"], json!(["db"]));
    assert_eq!(body["endpoints"]["health"], "/health");

    engine.shutdown().await;
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let (app, engine) = healthy_app().await;

    let (status, _) = get(&app, "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    engine.shutdown().await;
}
