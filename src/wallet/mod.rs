// External wallet settlement
//
// Contribution flow:
// 1. Split the requested amount into publisher part and platform fee
// 2. Transfer the publisher part to the publisher's card
// 3. Persist the fee as an obligation and arm its retry timer
// 4. Mark the publisher's share as contributed
//
// The fee leg is owned by the timer from then on: it retries every ~45s
// until the provider accepts it, and is re-armed from the store on startup.

pub mod api;
pub mod fee;
pub mod transfer;
pub mod util;

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{LedgerConfig, RetryJitter};
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::models::{ServerPublisherInfo, Transaction, TransferFee, WalletStatus, WalletType};
use crate::ledger::LedgerContext;
use crate::wallet::fee::{randomized_delay, FeeSplit, FeeTimers, FEE_MESSAGE};
use crate::wallet::transfer::WalletTransfer;
use crate::wallet::util::{redact_address, reset_wallet};

pub use api::{ExternalWalletApi, WalletApiError};

/// Event log key for a disconnect
pub const EVENT_WALLET_DISCONNECTED: &str = "wallet_disconnected";

/// Notification shown to the user after a disconnect
pub const NOTIFICATION_WALLET_DISCONNECTED: &str = "wallet_disconnected";

#[derive(Debug, Clone)]
pub struct SettlementConfig {
    pub wallet_type: WalletType,
    pub fee_address: String,
    pub fee_retry_base: Duration,
    pub fee_retry_jitter: RetryJitter,
}

impl SettlementConfig {
    pub fn from_ledger_config(wallet_type: WalletType, config: &LedgerConfig) -> Self {
        Self {
            wallet_type,
            fee_address: config.fee_address(),
            fee_retry_base: config.fee_retry_base(),
            fee_retry_jitter: config.fee_retry_jitter,
        }
    }
}

/// What is left to do once the publisher transfer went through
#[derive(Debug, Clone)]
struct ContributionCompletion {
    contribution_id: String,
    fee: Decimal,
    publisher_key: String,
}

/// Settles contributions through one external wallet and owns the fee
/// retry timers for it
pub struct WalletSettlement {
    config: SettlementConfig,
    context: LedgerContext,
    api: Arc<dyn ExternalWalletApi>,
    transfer: WalletTransfer,
    timers: FeeTimers,
}

impl WalletSettlement {
    pub fn new(
        context: LedgerContext,
        api: Arc<dyn ExternalWalletApi>,
        config: SettlementConfig,
    ) -> Self {
        let transfer = WalletTransfer::new(
            config.wallet_type,
            context.stores.wallets.clone(),
            api.clone(),
        );

        Self {
            config,
            context,
            api,
            transfer,
            timers: FeeTimers::new(),
        }
    }

    pub fn wallet_type(&self) -> WalletType {
        self.config.wallet_type
    }

    /// Re-arms one timer per persisted fee obligation
    pub async fn initialize(self: &Arc<Self>) -> LedgerResult<()> {
        let fees = self
            .context
            .stores
            .transfer_fees
            .get_transfer_fees(self.config.wallet_type)
            .await?;

        for fee in &fees {
            self.start_transfer_fee_timer(&fee.id);
        }

        info!(
            "✅ {} settlement initialized, {} pending transfer fees",
            self.config.wallet_type,
            fees.len()
        );
        Ok(())
    }

    // ========== CONTRIBUTIONS ==========

    #[instrument(skip(self, info), fields(wallet = %self.config.wallet_type))]
    pub async fn start_contribution(
        self: &Arc<Self>,
        contribution_id: &str,
        info: Option<&ServerPublisherInfo>,
        amount: Decimal,
    ) -> LedgerResult<()> {
        let Some(info) = info else {
            error!("Publisher info is missing for contribution {}", contribution_id);
            return Err(LedgerError::Failed(format!(
                "publisher info is missing for contribution {}",
                contribution_id
            )));
        };

        let split = FeeSplit::for_amount(amount).map_err(|e| {
            error!("Contribution {} cannot be split: {}", contribution_id, e);
            e
        })?;
        let transaction = Transaction::new(info.address.clone(), split.reconcile_amount);
        let completion = ContributionCompletion {
            contribution_id: contribution_id.to_string(),
            fee: split.fee,
            publisher_key: info.publisher_key.clone(),
        };

        let transaction_id = self.start_transfer(&transaction).await.map_err(|e| {
            warn!("❌ Contribution {} transfer failed: {}", contribution_id, e);
            e
        })?;

        info!(
            "✓ Contribution {} transferred {} (tx: {})",
            contribution_id, split.reconcile_amount, transaction_id
        );

        self.contribution_completed(completion).await
    }

    async fn contribution_completed(
        self: &Arc<Self>,
        completion: ContributionCompletion,
    ) -> LedgerResult<()> {
        self.save_transfer_fee(TransferFee::new(
            completion.contribution_id.clone(),
            completion.fee,
        ))
        .await;

        if completion.publisher_key.is_empty() {
            return Ok(());
        }

        self.context
            .stores
            .contributions
            .update_contributed_amount(&completion.contribution_id, &completion.publisher_key)
            .await
    }

    // ========== WALLET OPERATIONS ==========

    pub async fn fetch_balance(&self) -> LedgerResult<Decimal> {
        let wallet = self
            .context
            .stores
            .wallets
            .get_external_wallet(self.config.wallet_type)
            .await?;

        let Some(wallet) = wallet.filter(|wallet| wallet.has_credentials()) else {
            debug!("{} wallet data is empty", self.config.wallet_type);
            return Ok(Decimal::ZERO);
        };

        if wallet.status == WalletStatus::Connected {
            debug!("{} wallet is connected but not verified", self.config.wallet_type);
            return Ok(Decimal::ZERO);
        }

        match self.api.fetch_balance(&wallet).await {
            Ok(available) => Ok(available),
            Err(WalletApiError::ExpiredToken) => {
                error!("{} wallet token expired", self.config.wallet_type);
                self.disconnect_wallet().await;
                Err(LedgerError::ExpiredToken)
            }
            Err(WalletApiError::Failed(message)) => {
                error!("Couldn't get {} balance: {}", self.config.wallet_type, message);
                Err(LedgerError::Failed(message))
            }
        }
    }

    /// Plain transfer out of the wallet, no fee is taken
    pub async fn transfer_funds(&self, amount: Decimal, address: &str) -> LedgerResult<String> {
        let transaction = Transaction::new(address, amount);
        self.start_transfer(&transaction).await
    }

    /// Best effort: failures are logged, never returned
    pub async fn disconnect_wallet(&self) {
        let wallet_type = self.config.wallet_type;
        info!("Disconnecting {} wallet", wallet_type);

        let wallet = match self.context.stores.wallets.get_external_wallet(wallet_type).await {
            Ok(Some(wallet)) => wallet,
            Ok(None) => {
                error!("{} wallet is missing", wallet_type);
                return;
            }
            Err(e) => {
                error!("Failed to load {} wallet: {}", wallet_type, e);
                return;
            }
        };

        if !wallet.address.is_empty() {
            let detail = format!("{}/{}", wallet_type, redact_address(&wallet.address));
            if let Err(e) = self
                .context
                .stores
                .event_log
                .save_event_log(EVENT_WALLET_DISCONNECTED, &detail)
                .await
            {
                warn!("Failed to record wallet disconnect: {}", e);
            }
        }

        let wallet = reset_wallet(wallet);

        self.context
            .client
            .show_notification(NOTIFICATION_WALLET_DISCONNECTED, &[]);

        if let Err(e) = self.context.stores.wallets.save_external_wallet(wallet).await {
            error!("Failed to save disconnected {} wallet: {}", wallet_type, e);
        }

        self.context.client.wallet_disconnected(wallet_type);
    }

    async fn start_transfer(&self, transaction: &Transaction) -> LedgerResult<String> {
        match self.transfer.start(transaction).await {
            Err(LedgerError::ExpiredToken) => {
                error!("{} wallet token expired during transfer", self.config.wallet_type);
                self.disconnect_wallet().await;
                Err(LedgerError::ExpiredToken)
            }
            result => result,
        }
    }

    // ========== TRANSFER FEES ==========

    async fn save_transfer_fee(self: &Arc<Self>, fee: TransferFee) {
        let fee_id = fee.id.clone();

        // The timer finds nothing to send if this write was lost
        if let Err(e) = self
            .context
            .stores
            .transfer_fees
            .set_transfer_fee(self.config.wallet_type, fee)
            .await
        {
            error!("Failed to persist transfer fee {}: {}", fee_id, e);
        }

        self.start_transfer_fee_timer(&fee_id);
    }

    fn start_transfer_fee_timer(self: &Arc<Self>, fee_id: &str) {
        let delay = randomized_delay(self.config.fee_retry_base, self.config.fee_retry_jitter);

        let settlement = Arc::downgrade(self);
        let id = fee_id.to_string();
        let armed = self.timers.arm(fee_id, delay, move |generation| async move {
            if let Some(settlement) = settlement.upgrade() {
                settlement.on_transfer_fee_timer_elapsed(&id, generation).await;
            }
        });

        if armed {
            info!("⏰ Transfer fee timer for {} set to {:?}", fee_id, delay);
        } else {
            debug!("Settlement is shut down, transfer fee {} stays pending", fee_id);
        }
    }

    async fn on_transfer_fee_timer_elapsed(self: &Arc<Self>, fee_id: &str, generation: u64) {
        if !self.timers.release(fee_id, generation) {
            debug!("Transfer fee timer for {} was replaced", fee_id);
            return;
        }

        let fees = match self
            .context
            .stores
            .transfer_fees
            .get_transfer_fees(self.config.wallet_type)
            .await
        {
            Ok(fees) => fees,
            Err(e) => {
                error!("Failed to load transfer fees: {}", e);
                if e.is_retryable() {
                    self.start_transfer_fee_timer(fee_id);
                }
                return;
            }
        };

        match fees.into_iter().find(|fee| fee.id == fee_id) {
            Some(fee) => self.transfer_fee(fee).await,
            None => debug!("Transfer fee {} is no longer pending", fee_id),
        }
    }

    async fn transfer_fee(self: &Arc<Self>, fee: TransferFee) {
        let transaction =
            Transaction::new(self.config.fee_address.clone(), fee.amount).with_message(FEE_MESSAGE);

        match self.start_transfer(&transaction).await {
            Ok(transaction_id) => {
                info!(
                    "💰 Transfer fee {} of {} delivered (tx: {})",
                    fee.id, fee.amount, transaction_id
                );
                if let Err(e) = self
                    .context
                    .stores
                    .transfer_fees
                    .remove_transfer_fee(self.config.wallet_type, &fee.id)
                    .await
                {
                    error!("Failed to remove delivered transfer fee {}: {}", fee.id, e);
                }
            }
            Err(e) => {
                warn!("Transfer fee {} failed, retrying: {}", fee.id, e);
                self.save_transfer_fee(fee).await;
            }
        }
    }

    /// Delay of the timer currently armed for `fee_id`
    pub fn fee_timer_delay(&self, fee_id: &str) -> Option<Duration> {
        self.timers.delay(fee_id)
    }

    pub fn has_fee_timer(&self, fee_id: &str) -> bool {
        self.timers.is_armed(fee_id)
    }

    /// Stops fee retries for good; pending obligations stay persisted
    pub fn shutdown(&self) {
        self.timers.cancel_all();
    }
}
