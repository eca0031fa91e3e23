// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `charla serve` command implementation.
//!
//! Validates configuration, assembles the application container, and
//! serves the router with graceful shutdown: on SIGINT/SIGTERM the
//! listener stops accepting, in-flight handlers drain up to a bound, and
//! the store handles are closed.

use std::net::SocketAddr;
use std::time::Duration;

use charla_config::model::CharlaConfig;
use charla_core::CharlaError;
use charla_gateway::AppContainer;
use tokio::sync::watch;
use tracing::{info, warn};

/// Bounded drain after the shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs the `charla serve` command.
pub async fn run_serve(config: CharlaConfig) -> Result<(), CharlaError> {
    init_tracing(&config.logging.level);

    info!(version = env!("CARGO_PKG_VERSION"), "starting charla serve");

    let app = AppContainer::build(config).await?;
    let addr = format!("{}:{}", app.config.server.host, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CharlaError::Config(format!("failed to bind {addr}: {e}")))?;

    info!(addr = %addr, "gateway listening");

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let mut serve_rx = shutdown_rx.clone();
    let router = charla_gateway::router(app.clone());
    let serve_future = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = serve_rx.changed().await;
        info!("shutdown signal received, draining in-flight requests");
    });

    tokio::select! {
        result = serve_future => {
            result.map_err(|e| CharlaError::Internal(format!("server error: {e}")))?;
        }
        _ = async {
            let _ = shutdown_rx.changed().await;
            tokio::time::sleep(DRAIN_TIMEOUT).await;
        } => {
            warn!(timeout_secs = DRAIN_TIMEOUT.as_secs(), "drain timed out, terminating");
        }
    }

    app.db.close().await?;
    info!("charla stopped");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("sigterm handler installation cannot fail");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Initializes the tracing subscriber with the configured level.
fn init_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
