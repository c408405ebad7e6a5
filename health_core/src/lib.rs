//! Health-check orchestration engine and the HTTP surface that exposes it.

pub mod config;
pub mod error;
pub mod handlers;
pub mod health;
pub mod middleware;

pub use crate::config::AppConfig;
pub use error::{HealthError, Result};
pub use handlers::routes::create_routes;
pub use health::{
    check_fn, AggregateStatus, Check, CheckConfig, CheckError, CheckListener, CheckResult,
    CheckStatus, HealthEngine, HealthListener, LoggingListener, OverallStatus, Severity,
    StatusExporter, UnknownPolicy,
};

use axum::Router;
use std::{net::SocketAddr, sync::Arc};
use tokio::signal;
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub app_name: String,
    pub version: String,
    pub engine: Arc<HealthEngine>,
}

impl AppState {
    pub fn new(engine: Arc<HealthEngine>) -> Self {
        Self {
            app_name: "Health Server".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            engine,
        }
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }
}

pub fn create_app(state: AppState) -> Router {
    create_app_with_config(state, &AppConfig::default())
}

pub fn create_app_with_config(state: AppState, config: &AppConfig) -> Router {
    let mut router = Router::new().merge(create_routes());

    if config.logging.log_requests {
        router = router.layer(middleware::logging_layer());
    }

    router.with_state(state)
}

/// Serves until Ctrl+C or SIGTERM, then stops the engine's schedulers.
pub async fn run_server(app: Router, addr: SocketAddr, engine: Arc<HealthEngine>) -> Result<()> {
    info!("Starting health server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
