// Ledger orchestrator
//
// Owns the state migration, the wallet settlement and the redemption
// pipeline. `initialize` must finish before anything else touches persisted
// state; until then every operation fails with `NotInitialized`.

pub mod client;
pub mod models;

use futures::future::join_all;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, instrument};

use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::redeem::{
    ConfirmationInfo, ConfirmationSubmitter, ConfirmationsBook, RedeemOutcome,
    RedeemUnblindedToken,
};
use crate::state::StateMigration;
use crate::store::LedgerStores;
use crate::wallet::{ExternalWalletApi, SettlementConfig, WalletSettlement};

use client::LedgerClient;
use models::{Contribution, ServerPublisherInfo, TransferFee, WalletType};

/// Shared handles every component works through
///
/// Cloning is cheap; no component owns the stores or the client.
#[derive(Clone)]
pub struct LedgerContext {
    pub stores: LedgerStores,
    pub client: Arc<dyn LedgerClient>,
}

impl LedgerContext {
    pub fn new(stores: LedgerStores, client: Arc<dyn LedgerClient>) -> Self {
        Self { stores, client }
    }
}

pub struct Ledger {
    context: LedgerContext,
    migration: StateMigration,
    settlement: Arc<WalletSettlement>,
    confirmations: Arc<ConfirmationsBook>,
    redeemer: Option<RedeemUnblindedToken>,
    init_lock: Mutex<()>,
    ready: AtomicBool,
}

impl Ledger {
    pub fn new(
        config: &LedgerConfig,
        stores: LedgerStores,
        client: Arc<dyn LedgerClient>,
        wallet_api: Arc<dyn ExternalWalletApi>,
    ) -> Self {
        let context = LedgerContext::new(stores, client);
        let settlement = Arc::new(WalletSettlement::new(
            context.clone(),
            wallet_api,
            SettlementConfig::from_ledger_config(WalletType::Uphold, config),
        ));

        Self {
            migration: StateMigration::new(context.stores.clone()),
            context,
            settlement,
            confirmations: Arc::new(ConfirmationsBook::new()),
            redeemer: None,
            init_lock: Mutex::new(()),
            ready: AtomicBool::new(false),
        }
    }

    pub fn with_confirmation_submitter(mut self, submitter: Arc<dyn ConfirmationSubmitter>) -> Self {
        self.redeemer = Some(RedeemUnblindedToken::new(
            submitter,
            self.confirmations.clone(),
        ));
        self
    }

    /// Replaces the built-in migration steps
    pub fn with_state_migration(mut self, migration: StateMigration) -> Self {
        self.migration = migration;
        self
    }

    /// Migrates persisted state, then re-arms pending fee timers.
    /// Calling it again after success is a no-op.
    pub async fn initialize(&self) -> LedgerResult<()> {
        let _guard = self.init_lock.lock().await;
        if self.is_initialized() {
            return Ok(());
        }

        info!("🔄 Initializing ledger...");

        self.migration.migrate().await.map_err(|e| {
            error!("❌ Ledger state migration failed: {}", e);
            e
        })?;
        self.settlement.initialize().await?;

        self.ready.store(true, Ordering::SeqCst);
        info!("✅ Ledger initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn ensure_initialized(&self) -> LedgerResult<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(LedgerError::NotInitialized)
        }
    }

    pub fn context(&self) -> &LedgerContext {
        &self.context
    }

    pub fn settlement(&self) -> &Arc<WalletSettlement> {
        &self.settlement
    }

    pub async fn state_version(&self) -> LedgerResult<u32> {
        self.context.stores.state.version().await
    }

    // ========== WALLET ==========

    #[instrument(skip(self, contribution, info), fields(contribution = %contribution.id))]
    pub async fn settle_contribution(
        &self,
        contribution: &Contribution,
        info: Option<ServerPublisherInfo>,
    ) -> LedgerResult<()> {
        self.ensure_initialized()?;
        self.settlement
            .start_contribution(&contribution.id, info.as_ref(), contribution.amount)
            .await
    }

    pub async fn fetch_balance(&self) -> LedgerResult<Decimal> {
        self.ensure_initialized()?;
        self.settlement.fetch_balance().await
    }

    pub async fn transfer_funds(&self, amount: Decimal, address: &str) -> LedgerResult<String> {
        self.ensure_initialized()?;
        self.settlement.transfer_funds(amount, address).await
    }

    pub async fn disconnect_wallet(&self) -> LedgerResult<()> {
        self.ensure_initialized()?;
        self.settlement.disconnect_wallet().await;
        Ok(())
    }

    pub async fn pending_transfer_fees(&self) -> LedgerResult<Vec<TransferFee>> {
        self.ensure_initialized()?;
        self.context
            .stores
            .transfer_fees
            .get_transfer_fees(self.settlement.wallet_type())
            .await
    }

    // ========== CONFIRMATIONS ==========

    pub async fn redeem_confirmation(
        &self,
        confirmation: &ConfirmationInfo,
    ) -> LedgerResult<RedeemOutcome> {
        self.ensure_initialized()?;
        let redeemer = self.redeemer()?;
        Ok(redeemer.redeem(confirmation).await)
    }

    pub fn confirmations(&self) -> &ConfirmationsBook {
        &self.confirmations
    }

    /// Resubmits every confirmation that failed so far, concurrently
    pub async fn retry_failed_confirmations(&self) -> LedgerResult<Vec<RedeemOutcome>> {
        self.ensure_initialized()?;
        let redeemer = self.redeemer()?;

        let failed = self.confirmations.take_failed();
        if failed.is_empty() {
            return Ok(Vec::new());
        }

        info!("🔄 Retrying {} failed confirmations", failed.len());
        let outcomes = join_all(failed.iter().map(|confirmation| redeemer.redeem(confirmation))).await;
        Ok(outcomes)
    }

    fn redeemer(&self) -> LedgerResult<&RedeemUnblindedToken> {
        self.redeemer
            .as_ref()
            .ok_or_else(|| LedgerError::NotConfigured("confirmation submitter".to_string()))
    }

    /// Stops all fee timers; obligations stay persisted
    pub fn shutdown(&self) {
        self.settlement.shutdown();
        info!("Ledger shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryJitter;
    use crate::redeem::tests::confirmation;
    use crate::state::{MigrationStep, CURRENT_VERSION};
    use crate::store::{StateStore, TransferFeeStore};
    use crate::testing::{connected_wallet, test_context, TestHarness};
    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;
    use std::time::Duration;

    fn test_config() -> LedgerConfig {
        LedgerConfig {
            fee_retry_jitter: RetryJitter::None,
            fee_address: Some("fee-card".to_string()),
            ..LedgerConfig::default()
        }
    }

    fn ledger(harness: &TestHarness) -> Ledger {
        Ledger::new(
            &test_config(),
            harness.context.stores.clone(),
            harness.client.clone(),
            harness.api.clone(),
        )
    }

    /// Fails submissions in the order queued, succeeds afterwards
    #[derive(Default)]
    struct ScriptedSubmitter {
        failures: SyncMutex<VecDeque<String>>,
    }

    #[async_trait]
    impl ConfirmationSubmitter for ScriptedSubmitter {
        async fn submit(&self, _confirmation: &ConfirmationInfo) -> LedgerResult<()> {
            match self.failures.lock().pop_front() {
                Some(message) => Err(LedgerError::Failed(message)),
                None => Ok(()),
            }
        }
    }

    struct FailingStep;

    #[async_trait]
    impl MigrationStep for FailingStep {
        fn version(&self) -> u32 {
            1
        }

        async fn migrate(&self, _stores: &LedgerStores) -> LedgerResult<()> {
            Err(LedgerError::Failed("disk full".to_string()))
        }
    }

    #[tokio::test]
    async fn test_operations_rejected_before_initialize() {
        let harness = test_context(Some(connected_wallet())).await;
        let ledger = ledger(&harness);

        assert!(matches!(
            ledger.fetch_balance().await,
            Err(LedgerError::NotInitialized)
        ));
        assert!(matches!(
            ledger.transfer_funds(dec!(1), "card").await,
            Err(LedgerError::NotInitialized)
        ));
        assert!(harness.api.transfers().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_migrates_then_rearms_fees() {
        let harness = test_context(Some(connected_wallet())).await;
        harness
            .store
            .set_transfer_fee(WalletType::Uphold, TransferFee::new("c9", dec!(0.25)))
            .await
            .unwrap();
        let ledger = ledger(&harness);

        ledger.initialize().await.unwrap();

        assert!(ledger.is_initialized());
        assert_eq!(harness.store.version().await.unwrap(), CURRENT_VERSION);
        assert!(ledger.settlement().has_fee_timer("c9"));

        tokio::time::sleep(Duration::from_secs(46)).await;
        assert!(ledger.pending_transfer_fees().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_migration_keeps_ledger_closed() {
        let harness = test_context(Some(connected_wallet())).await;
        let migration = StateMigration::with_steps(
            harness.context.stores.clone(),
            vec![Box::new(FailingStep) as Box<dyn MigrationStep>],
        )
        .unwrap();
        let ledger = ledger(&harness).with_state_migration(migration);

        let result = ledger.initialize().await;

        assert!(matches!(
            result,
            Err(LedgerError::MigrationFailed { from: 0, to: 1 })
        ));
        assert!(!ledger.is_initialized());
        assert_eq!(ledger.state_version().await.unwrap(), 0);
        assert!(matches!(
            ledger.pending_transfer_fees().await,
            Err(LedgerError::NotInitialized)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_contribution_records_fee() {
        let harness = test_context(Some(connected_wallet())).await;
        let ledger = ledger(&harness);
        ledger.initialize().await.unwrap();

        let contribution = Contribution {
            id: "c42".to_string(),
            publisher_key: String::new(),
            amount: dec!(20),
        };
        ledger
            .settle_contribution(
                &contribution,
                Some(ServerPublisherInfo {
                    publisher_key: String::new(),
                    address: "publisher-card".to_string(),
                }),
            )
            .await
            .unwrap();

        assert_eq!(
            ledger.pending_transfer_fees().await.unwrap(),
            vec![TransferFee::new("c42", dec!(1.0))]
        );
    }

    #[tokio::test]
    async fn test_redeem_requires_submitter() {
        let harness = test_context(None).await;
        let ledger = ledger(&harness);
        ledger.initialize().await.unwrap();

        let result = ledger.redeem_confirmation(&confirmation("conf-1")).await;
        assert!(matches!(result, Err(LedgerError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_failed_confirmations_are_retried() {
        let harness = test_context(None).await;
        let submitter = Arc::new(ScriptedSubmitter::default());
        submitter.failures.lock().push_back("timeout".to_string());
        let ledger = ledger(&harness).with_confirmation_submitter(submitter);
        ledger.initialize().await.unwrap();

        let outcome = ledger
            .redeem_confirmation(&confirmation("conf-1"))
            .await
            .unwrap();
        assert_eq!(outcome, RedeemOutcome::Failed);
        assert_eq!(ledger.confirmations().failed_count(), 1);

        let outcomes = ledger.retry_failed_confirmations().await.unwrap();
        assert_eq!(outcomes, vec![RedeemOutcome::Redeemed]);
        assert!(ledger.confirmations().is_redeemed("conf-1"));
        assert_eq!(ledger.confirmations().failed_count(), 0);
    }
}
