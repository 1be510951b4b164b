pub mod bootstrap;
pub mod config;
pub mod error;
pub mod ledger;
pub mod redeem;
pub mod state;
pub mod store;
pub mod wallet;

#[cfg(test)]
mod testing;

pub use config::LedgerConfig;
pub use error::{ErrorKind, LedgerError, LedgerResult};
pub use ledger::{client::LedgerClient, Ledger, LedgerContext};
pub use redeem::{ConfirmationInfo, ConfirmationSubmitter, RedeemOutcome};
pub use wallet::{ExternalWalletApi, WalletApiError};
