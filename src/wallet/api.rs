use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::error::LedgerError;
use crate::ledger::models::{ExternalWallet, Transaction};

/// Failures reported by the wallet provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletApiError {
    #[error("Wallet token expired")]
    ExpiredToken,

    #[error("Wallet request failed: {0}")]
    Failed(String),
}

impl From<WalletApiError> for LedgerError {
    fn from(error: WalletApiError) -> Self {
        match error {
            WalletApiError::ExpiredToken => LedgerError::ExpiredToken,
            WalletApiError::Failed(message) => LedgerError::Failed(message),
        }
    }
}

/// Remote wallet provider
///
/// Transport, authorization headers and response parsing live behind this
/// trait; the settlement only sees classified outcomes.
#[async_trait]
pub trait ExternalWalletApi: Send + Sync {
    /// Sends `transaction` from the wallet's card, returns the provider's
    /// transaction id
    async fn transfer(
        &self,
        wallet: &ExternalWallet,
        transaction: &Transaction,
    ) -> Result<String, WalletApiError>;

    /// Available balance of the wallet's card
    async fn fetch_balance(&self, wallet: &ExternalWallet) -> Result<Decimal, WalletApiError>;
}
