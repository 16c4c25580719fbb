//! InkShare relay server binary.
//!
//! Configured through `INKSHARE_ADDR`, `INKSHARE_DATA_DIR` and
//! `INKSHARE_CHANNEL_CAPACITY`; logging through `RUST_LOG`.

use inkshare_server::state::AppState;
use inkshare_server::{ServerConfig, app};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inkshare_server=info,tower_http=info".into()),
        )
        .init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let log = match config.open_log() {
        Ok(log) => log,
        Err(e) => {
            error!("Failed to open stroke log: {}", e);
            return ExitCode::FAILURE;
        }
    };
    match &config.data_dir {
        Some(dir) => info!("Storing rooms in {}", dir.display()),
        None => info!("Storing rooms in memory"),
    }

    let state = Arc::new(AppState::new(log, config.channel_capacity));

    let listener = match tokio::net::TcpListener::bind(config.addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", config.addr, e);
            return ExitCode::FAILURE;
        }
    };
    info!("InkShare relay server listening on {}", config.addr);
    info!("WebSocket endpoint: ws://{}/ws", config.addr);

    if let Err(e) = axum::serve(listener, app(state)).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
