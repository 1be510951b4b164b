use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

use crate::{
    config::LedgerConfig,
    error::LedgerResult,
    ledger::{client::LedgerClient, Ledger},
    store::{LedgerStores, PgLedgerStore},
    wallet::ExternalWalletApi,
};

/// Opens the configured backend: Postgres when a database URL is set,
/// in-memory stores otherwise
pub async fn initialize_stores(config: &LedgerConfig) -> LedgerResult<LedgerStores> {
    match &config.database_url {
        Some(database_url) => {
            let pool = initialize_database(database_url).await?;
            Ok(LedgerStores::from_backend(Arc::new(PgLedgerStore::new(pool))))
        }
        None => {
            warn!("⚠️  No database configured - ledger state is kept in memory");
            Ok(LedgerStores::in_memory())
        }
    }
}

/// Builds the ledger over the configured stores and runs its initialization
pub async fn initialize_ledger(
    config: &LedgerConfig,
    client: Arc<dyn LedgerClient>,
    wallet_api: Arc<dyn ExternalWalletApi>,
) -> LedgerResult<Ledger> {
    info!("Initializing ledger components ...");

    let stores = initialize_stores(config).await?;
    let ledger = Ledger::new(config, stores, client, wallet_api);
    ledger.initialize().await?;

    Ok(ledger)
}

async fn initialize_database(database_url: &str) -> LedgerResult<PgPool> {
    info!("📊 Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await?;

    info!("✓ Database pool configured: 10 max connections");

    info!("🔄 Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✓ Database initialized");
    Ok(pool)
}
