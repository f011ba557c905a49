//! Internal Transfers server
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌────────────────┐    ┌────────────┐
//! │  Config  │───▶│ Gateway  │───▶│ TransferEngine │───▶│ PostgreSQL │
//! │  (YAML)  │    │  (axum)  │    │ (timeout, lock)│    │  (sqlx)    │
//! └──────────┘    └──────────┘    └────────────────┘    └────────────┘
//! ```

use std::sync::Arc;

use anyhow::Context;

use internal_transfers::config::AppConfig;
use internal_transfers::db::Database;
use internal_transfers::gateway::{self, AppState};
use internal_transfers::ledger::{PgLedgerStore, TransferEngine};
use internal_transfers::logging::init_logging;

fn get_arg(names: &[&str]) -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if names.contains(&args[i].as_str()) && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }
    None
}

fn get_env() -> String {
    get_arg(&["--env", "-e"]).unwrap_or_else(|| "dev".to_string())
}

fn get_port_override() -> Option<u16> {
    get_arg(&["--port"]).and_then(|p| p.parse().ok())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let mut config = AppConfig::load(&env)?;
    if let Some(port) = get_port_override() {
        config.gateway.port = port;
    }

    let _log_guard = init_logging(&config);
    tracing::info!(
        env = %env,
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("GIT_HASH"),
        "Starting internal_transfers"
    );

    let url = config.postgres_url()?;
    let db = Database::connect(url, &config.postgres)
        .await
        .context("Failed to connect to PostgreSQL")?;
    db.health_check().await.context("PostgreSQL health check failed")?;
    if config.postgres.apply_schema {
        db.apply_schema().await.context("Failed to apply schema")?;
    }

    let store = Arc::new(
        PgLedgerStore::new(db.pool().clone())
            .with_request_timeout(config.ledger.request_timeout()),
    );
    let engine = TransferEngine::new(store, config.ledger.request_timeout());
    tracing::info!(
        timeout_ms = config.ledger.request_timeout_ms,
        "Transfer engine ready"
    );

    let state = Arc::new(AppState::new(
        Arc::new(engine),
        config.ledger.history_limit,
    ));
    gateway::run_server(&config.gateway, state).await?;

    db.pool().close().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
