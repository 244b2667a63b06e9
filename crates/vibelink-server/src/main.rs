//! # vibelink-server
//!
//! Relay server for the Vibelink network.
//!
//! This binary provides:
//! - **WebSocket relay** for the real-time session protocol: presence roster,
//!   the chat-request handshake, room-scoped chat with server-assigned
//!   message ids, the emoji-match mini-game and the shared drawing canvas
//! - **REST API** (axum) for health checks, the initial roster, global match
//!   stats and profile sync
//! - **Daily usage caps** (chat requests and availability toggles) with a
//!   premium bypass
//!
//! Rooms and messages live in memory only — the product is ephemeral by
//! design; nothing a user says is ever written to disk here.

mod api;
mod config;
mod error;
mod presence;
mod quota;
mod requests;
mod rooms;
mod state;
mod ws;

use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,vibelink_server=debug")),
        )
        .init();

    info!("Starting Vibelink relay server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    let http_addr = config.http_addr;
    let state = AppState::new(config);

    // -----------------------------------------------------------------------
    // 3. Spawn background tasks
    // -----------------------------------------------------------------------

    // Request expiry sweep (every second; the server is authoritative for
    // the acceptance window, client countdowns only mirror it).
    let sweep_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            requests::sweep_expired(&sweep_state).await;
        }
    });

    // Quota ledger cleanup (every 10 minutes, evict counters from past days).
    let quota = state.quotas.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(600));
        loop {
            interval.tick().await;
            quota.purge_stale().await;
        }
    });

    // -----------------------------------------------------------------------
    // 4. Run the HTTP/WebSocket server (blocks until shutdown)
    // -----------------------------------------------------------------------
    // tokio::select! ensures that if either the HTTP server or a shutdown
    // signal arrives, we exit cleanly.
    tokio::select! {
        result = api::serve(state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
