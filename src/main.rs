//! Skyfight Relay - room and session relay for multiplayer aerial combat
//!
//! The server owns no simulation. It handles:
//! - WebSocket connections for the reliable event channel (rooms, combat events)
//! - A UDP socket for loss-tolerant transform updates
//! - HTTP landing page and health check

mod app;
mod config;
mod game;
mod http;
mod store;
mod udp;
mod util;
mod ws;

use std::sync::Arc;

use anyhow::Context;
use tokio::net::{TcpListener, UdpSocket};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Config;
use crate::game::TransformSync;
use crate::http::build_router;
use crate::store::NameProvider;
use crate::util::time::mark_started;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Uptime for /health
    mark_started();

    info!("Starting Skyfight Relay");
    info!("Server address: {}", config.server_addr);

    let names = NameProvider::load(&config.names_file)?;
    info!(count = names.count(), "Loaded fallback names");

    // Create application state
    let state = AppState::new(config.clone(), names);

    // Transform channel
    let udp_socket = UdpSocket::bind(config.udp_addr)
        .await
        .with_context(|| format!("Failed to bind UDP socket on {}", config.udp_addr))?;
    let udp_socket = Arc::new(udp_socket);
    let sync = Arc::new(TransformSync::new(
        state.registry().clone(),
        udp_socket.clone(),
        config.transform_queue_capacity,
    ));
    tokio::spawn(udp::run_listener(udp_socket, sync));

    // Build router
    let router = build_router(state);

    // Start server
    let addr = config.server_addr;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind TCP listener on {}", addr))?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
