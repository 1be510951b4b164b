use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::models::{
    ContributionPublisher, EventLog, ExternalWallet, TransferFee, WalletType,
};
use crate::store::{ContributionStore, EventLogStore, StateStore, TransferFeeStore, WalletStore};

/// In-process backend for every ledger store
pub struct MemoryLedgerStore {
    version: RwLock<u32>,
    values: RwLock<HashMap<String, Value>>,
    wallets: RwLock<HashMap<WalletType, ExternalWallet>>,
    transfer_fees: RwLock<HashMap<WalletType, HashMap<String, Decimal>>>,
    publishers: RwLock<HashMap<(String, String), ContributionPublisher>>,
    event_logs: RwLock<Vec<EventLog>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            version: RwLock::new(0),
            values: RwLock::new(HashMap::new()),
            wallets: RwLock::new(HashMap::new()),
            transfer_fees: RwLock::new(HashMap::new()),
            publishers: RwLock::new(HashMap::new()),
            event_logs: RwLock::new(Vec::new()),
        }
    }
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryLedgerStore {
    async fn version(&self) -> LedgerResult<u32> {
        Ok(*self.version.read().await)
    }

    async fn set_version(&self, version: u32) -> LedgerResult<()> {
        *self.version.write().await = version;
        Ok(())
    }

    async fn get_value(&self, key: &str) -> LedgerResult<Option<Value>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set_value(&self, key: &str, value: Value) -> LedgerResult<()> {
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove_value(&self, key: &str) -> LedgerResult<()> {
        self.values.write().await.remove(key);
        Ok(())
    }
}

#[async_trait]
impl WalletStore for MemoryLedgerStore {
    async fn get_external_wallet(
        &self,
        wallet_type: WalletType,
    ) -> LedgerResult<Option<ExternalWallet>> {
        Ok(self.wallets.read().await.get(&wallet_type).cloned())
    }

    async fn save_external_wallet(&self, wallet: ExternalWallet) -> LedgerResult<()> {
        self.wallets.write().await.insert(wallet.wallet_type, wallet);
        Ok(())
    }
}

#[async_trait]
impl TransferFeeStore for MemoryLedgerStore {
    async fn set_transfer_fee(
        &self,
        wallet_type: WalletType,
        fee: TransferFee,
    ) -> LedgerResult<()> {
        let mut fees = self.transfer_fees.write().await;
        fees.entry(wallet_type)
            .or_insert_with(HashMap::new)
            .insert(fee.id, fee.amount);
        Ok(())
    }

    async fn get_transfer_fees(&self, wallet_type: WalletType) -> LedgerResult<Vec<TransferFee>> {
        let fees = self.transfer_fees.read().await;
        Ok(fees
            .get(&wallet_type)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(id, amount)| TransferFee::new(id.clone(), *amount))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn remove_transfer_fee(&self, wallet_type: WalletType, id: &str) -> LedgerResult<()> {
        let mut fees = self.transfer_fees.write().await;
        if let Some(entries) = fees.get_mut(&wallet_type) {
            entries.remove(id);
        }
        Ok(())
    }
}

#[async_trait]
impl ContributionStore for MemoryLedgerStore {
    async fn save_contribution_publisher(
        &self,
        publisher: ContributionPublisher,
    ) -> LedgerResult<()> {
        let key = (
            publisher.contribution_id.clone(),
            publisher.publisher_key.clone(),
        );
        self.publishers.write().await.insert(key, publisher);
        Ok(())
    }

    async fn get_contribution_publishers(
        &self,
        contribution_id: &str,
    ) -> LedgerResult<Vec<ContributionPublisher>> {
        let publishers = self.publishers.read().await;
        Ok(publishers
            .values()
            .filter(|p| p.contribution_id == contribution_id)
            .cloned()
            .collect())
    }

    async fn update_contributed_amount(
        &self,
        contribution_id: &str,
        publisher_key: &str,
    ) -> LedgerResult<()> {
        let mut publishers = self.publishers.write().await;
        let key = (contribution_id.to_string(), publisher_key.to_string());
        let publisher = publishers.get_mut(&key).ok_or_else(|| {
            LedgerError::Failed(format!(
                "Publisher {} not found for contribution {}",
                publisher_key, contribution_id
            ))
        })?;

        publisher.contributed_amount = publisher.total_amount;
        Ok(())
    }
}

#[async_trait]
impl EventLogStore for MemoryLedgerStore {
    async fn save_event_log(&self, key: &str, value: &str) -> LedgerResult<()> {
        self.event_logs.write().await.push(EventLog::new(key, value));
        Ok(())
    }

    async fn get_event_logs(&self) -> LedgerResult<Vec<EventLog>> {
        Ok(self.event_logs.read().await.clone())
    }
}
