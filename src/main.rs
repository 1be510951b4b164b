use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rewards_ledger::{
    bootstrap,
    ledger::models::WalletType,
    state::StateMigration,
    store::{StateStore, TransferFeeStore},
    ErrorKind, LedgerConfig, LedgerError,
};

/// Exit code when persisted state needs manual intervention
const EXIT_UNKNOWN_STATE: u8 = 3;

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,rewards_ledger=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run(config: &LedgerConfig) -> anyhow::Result<()> {
    let stores = bootstrap::initialize_stores(config).await?;

    let migration = StateMigration::new(stores.clone());
    if let Err(e) = migration.migrate().await {
        if e.kind() == ErrorKind::FatalUnknownState {
            error!("🛑 Persisted ledger state is not understood by this build: {}", e);
            error!("Refusing to touch it; restore a backup or upgrade");
        }
        return Err(e.into());
    }

    let version = stores.state.version().await?;
    info!("✅ Ledger state at version {}", version);

    for wallet_type in WalletType::all() {
        let fees = stores.transfer_fees.get_transfer_fees(wallet_type).await?;
        info!("{} pending {} transfer fees", fees.len(), wallet_type);
        for fee in fees {
            info!("  {} -> {}", fee.id, fee.amount);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    info!("🚀 Starting ledger state migration");

    dotenv::dotenv().ok();
    let config = match LedgerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("❌ Invalid configuration: {}", e);
            return ExitCode::from(2);
        }
    };

    match run(&config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ Ledger migration failed: {:#}", e);
            match e.downcast_ref::<LedgerError>().map(LedgerError::kind) {
                Some(ErrorKind::FatalUnknownState) => ExitCode::from(EXIT_UNKNOWN_STATE),
                _ => ExitCode::FAILURE,
            }
        }
    }
}
