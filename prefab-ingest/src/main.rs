//! prefab-ingest - Component reconciliation and approval service
//!
//! Stages machine-parsed panel submissions, scores them for review, and
//! approves them into uniquely identified production components.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use prefab_common::config::{resolve_config, ConfigOverrides};
use prefab_common::db::init_database;
use prefab_ingest::db::SqliteStore;
use prefab_ingest::services::ReviewService;
use prefab_ingest::{build_router, AppState};

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "prefab-ingest", version, about)]
struct Args {
    /// TOML configuration file
    #[arg(long, env = "PREFAB_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file (overrides PREFAB_DATABASE and the config file)
    #[arg(long)]
    database: Option<PathBuf>,

    /// HTTP bind address (overrides PREFAB_BIND and the config file)
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting prefab-ingest v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let config = resolve_config(&ConfigOverrides {
        config_file: args.config,
        database_path: args.database,
        bind_address: args.bind,
    })?;
    info!("Database path: {}", config.database_path.display());

    let pool = match init_database(&config.database_path).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            return Err(e.into());
        }
    };

    let store = Arc::new(SqliteStore::new(pool));
    let state = AppState::new(ReviewService::new(store, &config));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!("prefab-ingest listening on http://{}", config.bind_address);
    info!("Health check: http://{}/health", config.bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
