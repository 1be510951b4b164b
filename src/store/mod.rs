// Persistence seams
//
// Every durable read or write the ledger core performs goes through one of
// these traits. `memory` keeps everything in process, `postgres` is the sqlx
// backend used by the host binary.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::error::LedgerResult;
use crate::ledger::models::{
    ContributionPublisher, EventLog, ExternalWallet, TransferFee, WalletType,
};

pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

/// Versioned key/value state
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Current state version, 0 when nothing was ever migrated
    async fn version(&self) -> LedgerResult<u32>;

    async fn set_version(&self, version: u32) -> LedgerResult<()>;

    async fn get_value(&self, key: &str) -> LedgerResult<Option<Value>>;

    async fn set_value(&self, key: &str, value: Value) -> LedgerResult<()>;

    async fn remove_value(&self, key: &str) -> LedgerResult<()>;
}

#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn get_external_wallet(
        &self,
        wallet_type: WalletType,
    ) -> LedgerResult<Option<ExternalWallet>>;

    async fn save_external_wallet(&self, wallet: ExternalWallet) -> LedgerResult<()>;
}

/// Outstanding fee obligations, keyed by wallet type and obligation id
#[async_trait]
pub trait TransferFeeStore: Send + Sync {
    /// Inserts or replaces the obligation with the same id
    async fn set_transfer_fee(&self, wallet_type: WalletType, fee: TransferFee)
        -> LedgerResult<()>;

    /// No ordering guarantee
    async fn get_transfer_fees(&self, wallet_type: WalletType) -> LedgerResult<Vec<TransferFee>>;

    async fn remove_transfer_fee(&self, wallet_type: WalletType, id: &str) -> LedgerResult<()>;
}

#[async_trait]
pub trait ContributionStore: Send + Sync {
    async fn save_contribution_publisher(
        &self,
        publisher: ContributionPublisher,
    ) -> LedgerResult<()>;

    async fn get_contribution_publishers(
        &self,
        contribution_id: &str,
    ) -> LedgerResult<Vec<ContributionPublisher>>;

    /// Marks the publisher's share of the contribution as fully contributed
    async fn update_contributed_amount(
        &self,
        contribution_id: &str,
        publisher_key: &str,
    ) -> LedgerResult<()>;
}

#[async_trait]
pub trait EventLogStore: Send + Sync {
    async fn save_event_log(&self, key: &str, value: &str) -> LedgerResult<()>;

    async fn get_event_logs(&self) -> LedgerResult<Vec<EventLog>>;
}

/// Every store a backend has to provide
pub trait LedgerBackend:
    StateStore + WalletStore + TransferFeeStore + ContributionStore + EventLogStore
{
}

impl<T> LedgerBackend for T where
    T: StateStore + WalletStore + TransferFeeStore + ContributionStore + EventLogStore
{
}

/// Shared handles to the durable stores
#[derive(Clone)]
pub struct LedgerStores {
    pub state: Arc<dyn StateStore>,
    pub wallets: Arc<dyn WalletStore>,
    pub transfer_fees: Arc<dyn TransferFeeStore>,
    pub contributions: Arc<dyn ContributionStore>,
    pub event_log: Arc<dyn EventLogStore>,
}

impl LedgerStores {
    /// Uses one backend for every store
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: LedgerBackend + 'static,
    {
        Self {
            state: backend.clone(),
            wallets: backend.clone(),
            transfer_fees: backend.clone(),
            contributions: backend.clone(),
            event_log: backend,
        }
    }

    pub fn in_memory() -> Self {
        Self::from_backend(Arc::new(MemoryLedgerStore::new()))
    }
}
