use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::LedgerError;

/// External wallet providers the ledger can settle through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletType {
    Uphold,
}

impl fmt::Display for WalletType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl WalletType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletType::Uphold => "uphold",
        }
    }

    pub fn all() -> Vec<WalletType> {
        vec![WalletType::Uphold]
    }
}

impl FromStr for WalletType {
    type Err = LedgerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "uphold" => Ok(WalletType::Uphold),
            other => Err(LedgerError::FatalUnknownState(format!(
                "unknown wallet type: {}",
                other
            ))),
        }
    }
}

/// Connection state of an external wallet
///
/// `Connected` means linked but not yet verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletStatus {
    NotConnected,
    Connected,
    Verified,
    DisconnectedUnverified,
    DisconnectedVerified,
}

impl WalletStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletStatus::NotConnected => "not_connected",
            WalletStatus::Connected => "connected",
            WalletStatus::Verified => "verified",
            WalletStatus::DisconnectedUnverified => "disconnected_unverified",
            WalletStatus::DisconnectedVerified => "disconnected_verified",
        }
    }

    /// Integer codes used by state written before version 2
    pub fn from_legacy_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(WalletStatus::NotConnected),
            1 => Some(WalletStatus::Connected),
            2 => Some(WalletStatus::Verified),
            3 => Some(WalletStatus::DisconnectedUnverified),
            4 => Some(WalletStatus::DisconnectedVerified),
            _ => None,
        }
    }
}

impl FromStr for WalletStatus {
    type Err = LedgerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "not_connected" => Ok(WalletStatus::NotConnected),
            "connected" => Ok(WalletStatus::Connected),
            "verified" => Ok(WalletStatus::Verified),
            "disconnected_unverified" => Ok(WalletStatus::DisconnectedUnverified),
            "disconnected_verified" => Ok(WalletStatus::DisconnectedVerified),
            other => Err(LedgerError::FatalUnknownState(format!(
                "unknown wallet status: {}",
                other
            ))),
        }
    }
}

/// External wallet snapshot, always read and written as a whole
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalWallet {
    pub wallet_type: WalletType,
    pub address: String,
    pub token: String,
    pub status: WalletStatus,
}

impl ExternalWallet {
    pub fn new(wallet_type: WalletType) -> Self {
        Self {
            wallet_type,
            address: String::new(),
            token: String::new(),
            status: WalletStatus::NotConnected,
        }
    }

    pub fn has_credentials(&self) -> bool {
        !self.token.is_empty() && !self.address.is_empty()
    }
}

/// A single outgoing transfer, never persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub address: String,
    pub amount: Decimal,
    pub message: Option<String>,
}

impl Transaction {
    pub fn new(address: impl Into<String>, amount: Decimal) -> Self {
        Self {
            address: address.into(),
            amount,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Platform fee still owed for a settled contribution
///
/// `id` is the contribution id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferFee {
    pub id: String,
    pub amount: Decimal,
}

impl TransferFee {
    pub fn new(id: impl Into<String>, amount: Decimal) -> Self {
        Self {
            id: id.into(),
            amount,
        }
    }
}

/// Reconciled payment from the user to a publisher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub id: String,
    pub publisher_key: String,
    pub amount: Decimal,
}

/// Server-provided wallet info for a publisher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerPublisherInfo {
    pub publisher_key: String,
    pub address: String,
}

/// Per-publisher share of a contribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionPublisher {
    pub contribution_id: String,
    pub publisher_key: String,
    pub total_amount: Decimal,
    pub contributed_amount: Decimal,
}

/// Audit log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    pub id: Uuid,
    pub key: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
}

impl EventLog {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            key: key.into(),
            value: value.into(),
            created_at: Utc::now(),
        }
    }
}
