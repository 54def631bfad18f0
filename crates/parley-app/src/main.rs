//! Parley application binary - composition root.
//!
//! Ties together the Parley crates into a single executable:
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Open storage (WAL-mode SQLite) and run migrations
//! 3. Build the webhook client, chat relay, and connection registry
//! 4. Start the axum HTTP + WebSocket server

mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use parley_api::{routes, AppState};
use parley_core::config::ParleyConfig;
use parley_storage::Database;

use cli::CliArgs;

/// Expand ~ to the home directory in a path string.
fn resolve_data_dir(data_dir: &str) -> PathBuf {
    if let Some(rest) = data_dir.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(data_dir)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config first; the log level may come from it.
    let config_file = args.resolve_config_path();
    let mut config = ParleyConfig::load_or_default(&config_file);

    if let Some(data_dir) = args.resolve_data_dir() {
        config.general.data_dir = data_dir;
    }
    if let Some(level) = args.resolve_log_level() {
        config.general.log_level = level;
    }
    let port = args.resolve_port(config.general.port);

    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::info!("Starting Parley v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    // Storage.
    let data_dir = resolve_data_dir(&config.general.data_dir);
    let db_path = data_dir.join("parley.db");
    let db = Arc::new(Database::new(&db_path)?);
    tracing::info!(path = %db_path.display(), "SQLite database opened");

    tracing::info!(
        mode = ?config.webhook.mode,
        url = config.webhook.url(),
        "Webhook client configured"
    );

    // Service graph: relay + registry behind one shared state.
    let state = AppState::new(db, config)?;

    routes::start_server(state, port).await?;

    Ok(())
}
