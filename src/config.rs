use serde::Deserialize;
use std::time::Duration;

const FEE_ADDRESS_PRODUCTION: &str = "6654ecb0-6079-4f6c-ba58-791cc890a561";
const FEE_ADDRESS_STAGING: &str = "1b2b466f-5c15-49bf-995e-c91777d3da93";

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Staging,
    Development,
}

/// How the fee retry delay is randomized around its base interval
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RetryJitter {
    /// Geometrically distributed delay whose mean is the base interval
    Geometric,
    /// Exactly the base interval
    None,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    pub environment: Environment,
    pub database_url: Option<String>,
    pub fee_retry_base_secs: u64,
    pub fee_retry_jitter: RetryJitter,
    pub fee_address: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Production,
            database_url: None,
            fee_retry_base_secs: 45,
            fee_retry_jitter: RetryJitter::Geometric,
            fee_address: None,
        }
    }
}

impl LedgerConfig {
    /// Reads `LEDGER_*` environment variables on top of the defaults
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .set_default("environment", "production")?
            .set_default("fee_retry_base_secs", 45)?
            .set_default("fee_retry_jitter", "geometric")?
            .add_source(config::Environment::with_prefix("LEDGER").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Destination of the platform fee leg
    pub fn fee_address(&self) -> String {
        if let Some(address) = &self.fee_address {
            return address.clone();
        }

        match self.environment {
            Environment::Production => FEE_ADDRESS_PRODUCTION.to_string(),
            Environment::Staging | Environment::Development => FEE_ADDRESS_STAGING.to_string(),
        }
    }

    pub fn fee_retry_base(&self) -> Duration {
        Duration::from_secs(self.fee_retry_base_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_address_per_environment() {
        let mut config = LedgerConfig::default();
        assert_eq!(config.fee_address(), FEE_ADDRESS_PRODUCTION);

        config.environment = Environment::Staging;
        assert_eq!(config.fee_address(), FEE_ADDRESS_STAGING);

        config.fee_address = Some("custom-card".to_string());
        assert_eq!(config.fee_address(), "custom-card");
    }

    #[test]
    fn test_default_retry_base() {
        let config = LedgerConfig::default();
        assert_eq!(config.fee_retry_base(), Duration::from_secs(45));
        assert_eq!(config.fee_retry_jitter, RetryJitter::Geometric);
    }
}
