use crate::ledger::models::{ExternalWallet, WalletStatus};

/// Characters of a wallet address that may appear in the audit log
const REDACTED_ADDRESS_LEN: usize = 5;

/// Drops the credential and address, keeping only whether the wallet had
/// been verified before
pub fn reset_wallet(wallet: ExternalWallet) -> ExternalWallet {
    let status = match wallet.status {
        WalletStatus::NotConnected => WalletStatus::NotConnected,
        WalletStatus::Verified | WalletStatus::DisconnectedVerified => {
            WalletStatus::DisconnectedVerified
        }
        WalletStatus::Connected | WalletStatus::DisconnectedUnverified => {
            WalletStatus::DisconnectedUnverified
        }
    };

    ExternalWallet {
        status,
        ..ExternalWallet::new(wallet.wallet_type)
    }
}

pub fn redact_address(address: &str) -> String {
    address.chars().take(REDACTED_ADDRESS_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::models::WalletType;

    fn wallet(status: WalletStatus) -> ExternalWallet {
        ExternalWallet {
            wallet_type: WalletType::Uphold,
            address: "a1b2c3d4-e5f6".to_string(),
            token: "secret".to_string(),
            status,
        }
    }

    #[test]
    fn test_reset_keeps_verification_history() {
        let reset = reset_wallet(wallet(WalletStatus::Verified));
        assert_eq!(reset.status, WalletStatus::DisconnectedVerified);
        assert!(reset.token.is_empty());
        assert!(reset.address.is_empty());

        let reset = reset_wallet(wallet(WalletStatus::Connected));
        assert_eq!(reset.status, WalletStatus::DisconnectedUnverified);

        let reset = reset_wallet(wallet(WalletStatus::NotConnected));
        assert_eq!(reset.status, WalletStatus::NotConnected);
    }

    #[test]
    fn test_redact_address() {
        assert_eq!(redact_address("a1b2c3d4-e5f6"), "a1b2c");
        assert_eq!(redact_address("abc"), "abc");
    }
}
