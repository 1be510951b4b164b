// Built-in state migration steps
//
// Each step upgrades state written by an older release. Legacy data lives
// under `legacy.*` keys of the state store until the step for it moved it
// into its own store.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::models::{ExternalWallet, TransferFee, WalletStatus, WalletType};
use crate::state::MigrationStep;
use crate::store::LedgerStores;
use crate::wallet::util::reset_wallet;

pub const LEGACY_STATE_KEY: &str = "legacy.state";
pub const LEGACY_WALLETS_KEY: &str = "legacy.wallets";
pub const LEGACY_TRANSFER_FEES_KEY: &str = "legacy.transfer_fees";

/// Keys no release after version 3 reads
pub const OBSOLETE_KEYS: [&str; 3] = [
    "legacy.inline_tip",
    "legacy.grants",
    "legacy.anon_funds_checked",
];

/// Legacy blob field and the key it moves to
const LEGACY_STATE_FIELDS: [(&str, &str); 3] = [
    ("reconcileStamp", "reconcile_stamp"),
    ("autoContributeAmount", "auto_contribute.amount"),
    ("walletCreated", "wallet.created"),
];

pub fn all() -> Vec<Box<dyn MigrationStep>> {
    vec![
        Box::new(LegacyStateStep),
        Box::new(LegacyWalletsStep),
        Box::new(ObsoleteKeysStep),
        Box::new(LegacyTransferFeesStep),
        Box::new(StaleWalletsStep),
    ]
}

fn unknown_shape(key: &str, detail: impl std::fmt::Display) -> LedgerError {
    LedgerError::FatalUnknownState(format!("{} has an unknown shape: {}", key, detail))
}

fn expect_object(key: &str, value: Value) -> LedgerResult<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(unknown_shape(key, format!("expected an object, got {}", other))),
    }
}

// ========== V1 ==========

/// Splits the single legacy state blob into individual keys
pub struct LegacyStateStep;

#[async_trait]
impl MigrationStep for LegacyStateStep {
    fn version(&self) -> u32 {
        1
    }

    async fn migrate(&self, stores: &LedgerStores) -> LedgerResult<()> {
        let Some(blob) = stores.state.get_value(LEGACY_STATE_KEY).await? else {
            debug!("No legacy state to migrate");
            return Ok(());
        };

        let blob = expect_object(LEGACY_STATE_KEY, blob)?;
        for (legacy_field, key) in LEGACY_STATE_FIELDS {
            if let Some(value) = blob.get(legacy_field) {
                stores.state.set_value(key, value.clone()).await?;
            }
        }

        stores.state.remove_value(LEGACY_STATE_KEY).await
    }
}

// ========== V2 ==========

#[derive(Debug, Deserialize)]
struct LegacyWallet {
    #[serde(default)]
    address: String,
    #[serde(default)]
    token: String,
    status: i64,
}

/// Moves wallets out of the state blob into the wallet store
pub struct LegacyWalletsStep;

#[async_trait]
impl MigrationStep for LegacyWalletsStep {
    fn version(&self) -> u32 {
        2
    }

    async fn migrate(&self, stores: &LedgerStores) -> LedgerResult<()> {
        let Some(value) = stores.state.get_value(LEGACY_WALLETS_KEY).await? else {
            return Ok(());
        };

        let wallets: HashMap<String, LegacyWallet> = serde_json::from_value(value)
            .map_err(|e| unknown_shape(LEGACY_WALLETS_KEY, e))?;

        for (type_name, legacy) in wallets {
            let Ok(wallet_type) = WalletType::from_str(&type_name) else {
                warn!("Skipping legacy wallet of unsupported type {}", type_name);
                continue;
            };

            let status = WalletStatus::from_legacy_code(legacy.status).ok_or_else(|| {
                unknown_shape(
                    LEGACY_WALLETS_KEY,
                    format!("wallet status code {}", legacy.status),
                )
            })?;

            stores
                .wallets
                .save_external_wallet(ExternalWallet {
                    wallet_type,
                    address: legacy.address,
                    token: legacy.token,
                    status,
                })
                .await?;
            info!("Migrated legacy {} wallet ({})", wallet_type, status.as_str());
        }

        stores.state.remove_value(LEGACY_WALLETS_KEY).await
    }
}

// ========== V3 ==========

pub struct ObsoleteKeysStep;

#[async_trait]
impl MigrationStep for ObsoleteKeysStep {
    fn version(&self) -> u32 {
        3
    }

    async fn migrate(&self, stores: &LedgerStores) -> LedgerResult<()> {
        for key in OBSOLETE_KEYS {
            stores.state.remove_value(key).await?;
        }
        Ok(())
    }
}

// ========== V4 ==========

#[derive(Debug, Deserialize)]
struct LegacyTransferFee {
    #[serde(default)]
    id: String,
    amount: Option<Value>,
}

fn parse_legacy_amount(amount: Option<&Value>) -> Option<Decimal> {
    let amount = match amount? {
        Value::Number(number) => Decimal::from_str(&number.to_string())
            .or_else(|_| Decimal::from_scientific(&number.to_string()))
            .ok()?,
        Value::String(text) => Decimal::from_str(text).ok()?,
        _ => return None,
    };

    (!amount.is_sign_negative()).then_some(amount)
}

/// Moves pending fee obligations into the transfer fee store
pub struct LegacyTransferFeesStep;

#[async_trait]
impl MigrationStep for LegacyTransferFeesStep {
    fn version(&self) -> u32 {
        4
    }

    async fn migrate(&self, stores: &LedgerStores) -> LedgerResult<()> {
        let Some(value) = stores.state.get_value(LEGACY_TRANSFER_FEES_KEY).await? else {
            return Ok(());
        };

        let fees: HashMap<String, Vec<LegacyTransferFee>> = serde_json::from_value(value)
            .map_err(|e| unknown_shape(LEGACY_TRANSFER_FEES_KEY, e))?;

        for (type_name, entries) in fees {
            let Ok(wallet_type) = WalletType::from_str(&type_name) else {
                warn!("Dropping transfer fees of unsupported wallet type {}", type_name);
                continue;
            };

            for entry in entries {
                if entry.id.is_empty() {
                    return Err(unknown_shape(LEGACY_TRANSFER_FEES_KEY, "empty fee id"));
                }

                let amount = parse_legacy_amount(entry.amount.as_ref()).ok_or_else(|| {
                    unknown_shape(
                        LEGACY_TRANSFER_FEES_KEY,
                        format!("bad amount for fee {}", entry.id),
                    )
                })?;

                stores
                    .transfer_fees
                    .set_transfer_fee(wallet_type, TransferFee::new(entry.id, amount))
                    .await?;
            }
        }

        stores.state.remove_value(LEGACY_TRANSFER_FEES_KEY).await
    }
}

// ========== V5 ==========

/// Resets wallets that claim a connection but lost their token
pub struct StaleWalletsStep;

#[async_trait]
impl MigrationStep for StaleWalletsStep {
    fn version(&self) -> u32 {
        5
    }

    async fn migrate(&self, stores: &LedgerStores) -> LedgerResult<()> {
        for wallet_type in WalletType::all() {
            let Some(wallet) = stores.wallets.get_external_wallet(wallet_type).await? else {
                continue;
            };

            let claims_connection = matches!(
                wallet.status,
                WalletStatus::Connected | WalletStatus::Verified
            );
            if claims_connection && wallet.token.is_empty() {
                warn!("Resetting {} wallet without a token", wallet_type);
                stores.wallets.save_external_wallet(reset_wallet(wallet)).await?;
            }
        }
        Ok(())
    }
}
