//! # flatchat-server
//!
//! HTTP front end for a flat-file chat room.
//!
//! This binary provides:
//! - **Login/post/poll/logout** JSON endpoints over a session token
//! - **Health and info** endpoints for probes and clients
//!
//! All chat state lives in two files under the data directory; the server
//! keeps none in memory, so several instances may share one directory.

mod api;
mod config;
mod error;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use flatchat_store::ChatService;

use crate::api::AppState;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("info,flatchat_server=debug,flatchat_store=debug")
            }),
        )
        .init();

    info!("Starting flatchat server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");
    if config.file_mode.is_none() {
        info!("FILE_MODE unset, data files keep the process umask");
    }

    // -----------------------------------------------------------------------
    // 3. Open the chat store (creates the data directory if missing)
    // -----------------------------------------------------------------------
    let chat = ChatService::open(&config.data_dir, config.chat_options())?;

    let app_state = AppState {
        chat: Arc::new(chat),
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
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
