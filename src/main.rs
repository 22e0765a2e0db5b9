//! Ledger Service - Main Application Entry Point
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Compose the store and services into shared state
//! 5. Start server on configured port

use std::sync::Arc;

use ledger_service::{
    config::Config,
    db,
    router,
    state::AppState,
    store::{PgLedgerStore, SharedStore},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG (defaults to "info")
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config).await?;
    tracing::info!(
        max_connections = config.database_max_connections,
        "Database pool created"
    );

    // A store that cannot be migrated is fatal
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let store: SharedStore = Arc::new(PgLedgerStore::new(pool.clone(), config.store_timeout()));
    let app = router(AppState::new(store, pool));

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
