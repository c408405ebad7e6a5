//! Main entry point for the health server binary

use anyhow::Result;
use health_core::{
    check_fn, create_app_with_config, health::HealthEngineBuilder, run_server, AppConfig,
    AppState, CheckConfig, CheckError, HealthEngine, LoggingListener,
};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc, time::Duration, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::load()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    info!("Configuration loaded successfully");
    info!("Server will bind to: {}", config.bind_address());

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address: {}", e))?;

    let engine = Arc::new(
        HealthEngineBuilder::from_config(&config.engine)
            .check_listener(LoggingListener)
            .health_listener(LoggingListener)
            .build()?,
    );

    register_builtin_checks(&engine, &config, addr)?;

    let state = AppState::new(engine.clone());
    info!("App: {} v{}", state.app_name, state.version);
    info!("Registered checks: {:?}", engine.check_names());

    let app = create_app_with_config(state, &config);

    run_server(app, addr, engine).await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Checks that describe the server process itself. Schedules come from the
/// `[checks.<name>]` tables when present.
fn register_builtin_checks(engine: &HealthEngine, config: &AppConfig, addr: SocketAddr) -> Result<()> {
    let started = Instant::now();
    let process = CheckConfig::new("process")
        .check(check_fn(move |_| async move {
            Ok(json!({
                "pid": std::process::id(),
                "uptimeSecs": started.elapsed().as_secs(),
            }))
        }))
        .execution_period(Duration::from_secs(10));

    let scratch = CheckConfig::new("scratch_dir")
        .check(check_fn(|_| async {
            let path = std::env::temp_dir().join(format!("health-probe-{}", std::process::id()));
            tokio::fs::write(&path, b"probe").await?;
            tokio::fs::remove_file(&path).await?;
            Ok::<_, CheckError>(json!({ "path": std::env::temp_dir() }))
        }))
        .execution_period(Duration::from_secs(30))
        .timeout(Duration::from_secs(2))
        .advisory();

    let listener = CheckConfig::new("listener")
        .check(check_fn(move |cancel: CancellationToken| async move {
            tokio::select! {
                _ = cancel.cancelled() => Err(CheckError::new("probe cancelled")),
                connected = tokio::net::TcpStream::connect(addr) => {
                    connected.map_err(CheckError::from)?;
                    Ok::<_, CheckError>(json!({ "address": addr.to_string() }))
                }
            }
        }))
        .initial_delay(Duration::from_secs(1))
        .execution_period(Duration::from_secs(15))
        .timeout(Duration::from_secs(3));

    for check in [process, scratch, listener] {
        let check = match config.schedule_for(&check.name) {
            Some(settings) => check.with_settings(settings)?,
            None => check,
        };
        engine.register(check)?;
    }

    if config.checks.keys().any(|name| !engine.is_registered(name)) {
        warn!("Configuration has schedule overrides for checks that are not registered");
    }

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let default_level = if cfg!(debug_assertions) {
            "debug"
        } else {
            "info"
        };

        format!(
            "{}={},health_core={},tower_http=debug",
            env!("CARGO_CRATE_NAME").replace('-', "_"),
            default_level,
            default_level
        )
        .into()
    });

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let is_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    if is_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer.pretty())
            .init();
    }
}
