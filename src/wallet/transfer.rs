use std::sync::Arc;
use tracing::{debug, error, instrument};

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::models::{Transaction, WalletType};
use crate::store::WalletStore;
use crate::wallet::api::ExternalWalletApi;

/// Moves funds out of the connected external wallet
pub struct WalletTransfer {
    wallet_type: WalletType,
    wallets: Arc<dyn WalletStore>,
    api: Arc<dyn ExternalWalletApi>,
}

impl WalletTransfer {
    pub fn new(
        wallet_type: WalletType,
        wallets: Arc<dyn WalletStore>,
        api: Arc<dyn ExternalWalletApi>,
    ) -> Self {
        Self {
            wallet_type,
            wallets,
            api,
        }
    }

    /// Returns the provider's transaction id
    #[instrument(skip(self, transaction), fields(wallet = %self.wallet_type, amount = %transaction.amount))]
    pub async fn start(&self, transaction: &Transaction) -> LedgerResult<String> {
        let wallet = self
            .wallets
            .get_external_wallet(self.wallet_type)
            .await?
            .filter(|wallet| !wallet.token.is_empty())
            .ok_or_else(|| {
                error!("{} wallet is not connected", self.wallet_type);
                LedgerError::Failed(format!("{} wallet is not connected", self.wallet_type))
            })?;

        let transaction_id = self.api.transfer(&wallet, transaction).await?;
        debug!("Transfer committed: {}", transaction_id);

        Ok(transaction_id)
    }
}
