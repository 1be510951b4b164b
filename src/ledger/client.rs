use crate::ledger::models::WalletType;

/// Host-side side effects the ledger core triggers
///
/// Both calls are fire-and-forget; implementations must not block.
pub trait LedgerClient: Send + Sync {
    fn show_notification(&self, kind: &str, args: &[String]);

    /// Tells other subsystems the wallet of this type is no longer usable
    fn wallet_disconnected(&self, wallet_type: WalletType);
}
