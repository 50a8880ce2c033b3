mod agent_api;
mod bootstrap;
mod health;
mod http;
mod webhook;

use std::future::IntoFuture;
use std::time::Duration;

use agroquote_core::config::{AppConfig, LoadOptions};
use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

fn init_logging(config: &AppConfig) {
    use agroquote_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let sweepers = app.start_sweeps();
    tracing::info!(
        event_name = "system.server.sweeps_started",
        correlation_id = "bootstrap",
        tasks = sweepers.len(),
        "background sweeps started"
    );

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = TcpListener::bind(&address).await.with_context(|| format!("failed to bind {address}"))?;
    let (stop, stopped) = oneshot::channel::<()>();
    let server = axum::serve(listener, http::router(&app))
        .with_graceful_shutdown(async move {
            let _ = stopped.await;
        })
        .into_future();
    let server = tokio::spawn(server);

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        address = %address,
        "agroquote-server listening"
    );
    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "agroquote-server stopping"
    );

    let _ = stop.send(());
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    match tokio::time::timeout(grace, server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(error))) => {
            tracing::warn!(event_name = "system.server.serve_failed", error = %error, "server exited with error");
        }
        Ok(Err(error)) => {
            tracing::warn!(event_name = "system.server.task_failed", error = %error, "server task panicked");
        }
        Err(_) => {
            tracing::warn!(
                event_name = "system.server.shutdown_timeout",
                grace_secs = grace.as_secs(),
                "in-flight requests did not finish in time"
            );
        }
    }

    sweepers.shutdown();
    app.db_pool.close().await;
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
