use sqlx::migrate::MigrateError;
use thiserror::Error;

/// Top-level error type for the ledger core
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Transient or unclassified failure, safe to retry from outside
    #[error("Request failed: {0}")]
    Failed(String),

    /// The wallet credential was rejected; the wallet has been disconnected
    #[error("Wallet token expired")]
    ExpiredToken,

    /// Persisted data is in a shape this build does not understand
    #[error("Unknown persisted state: {0}")]
    FatalUnknownState(String),

    #[error("State migration from version {from} to {to} failed")]
    MigrationFailed { from: u32, to: u32 },

    #[error("Ledger is not initialized")]
    NotInitialized,

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Outcome classes a host can act on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Retry later
    GenericFailure,
    /// Prompt the user to re-authorize the wallet
    ExpiredCredential,
    /// Needs operator or support intervention
    FatalUnknownState,
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::ExpiredToken => ErrorKind::ExpiredCredential,
            LedgerError::FatalUnknownState(_) => ErrorKind::FatalUnknownState,
            _ => ErrorKind::GenericFailure,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::GenericFailure
    }
}

impl From<anyhow::Error> for LedgerError {
    fn from(error: anyhow::Error) -> Self {
        LedgerError::Internal(format!("Error converting: {:?}", error))
    }
}

impl From<rust_decimal::Error> for LedgerError {
    fn from(error: rust_decimal::Error) -> Self {
        LedgerError::FatalUnknownState(format!("Decimal conversion error: {:?}", error))
    }
}

impl From<MigrateError> for LedgerError {
    fn from(error: MigrateError) -> Self {
        LedgerError::Internal(format!("Schema migration error: {:?}", error))
    }
}

impl From<config::ConfigError> for LedgerError {
    fn from(error: config::ConfigError) -> Self {
        LedgerError::Config(error.to_string())
    }
}

/// Result type alias for the ledger core
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(LedgerError::ExpiredToken.kind(), ErrorKind::ExpiredCredential);
        assert_eq!(
            LedgerError::FatalUnknownState("version 9".into()).kind(),
            ErrorKind::FatalUnknownState
        );
        assert_eq!(
            LedgerError::MigrationFailed { from: 2, to: 3 }.kind(),
            ErrorKind::GenericFailure
        );

        assert!(LedgerError::Failed("timeout".into()).is_retryable());
        assert!(!LedgerError::ExpiredToken.is_retryable());
    }
}
