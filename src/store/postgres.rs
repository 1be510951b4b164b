use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::types::BigDecimal;
use sqlx::{PgPool, Row};
use std::str::FromStr;

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::models::{
    ContributionPublisher, EventLog, ExternalWallet, TransferFee, WalletStatus, WalletType,
};
use crate::store::{ContributionStore, EventLogStore, StateStore, TransferFeeStore, WalletStore};

/// Postgres backend for every ledger store
pub struct PgLedgerStore {
    pub pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_big_decimal(amount: Decimal) -> LedgerResult<BigDecimal> {
    BigDecimal::from_str(&amount.to_string())
        .map_err(|e| LedgerError::Internal(format!("Amount conversion failed: {:?}", e)))
}

fn from_big_decimal(amount: BigDecimal) -> LedgerResult<Decimal> {
    Ok(Decimal::from_str(&amount.to_string())?)
}

// ========== STATE ==========

#[async_trait]
impl StateStore for PgLedgerStore {
    async fn version(&self) -> LedgerResult<u32> {
        let row = sqlx::query(
            r#"
            SELECT version FROM ledger_state_version WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(0);
        };

        let version: i32 = row.try_get("version")?;
        u32::try_from(version).map_err(|_| {
            LedgerError::FatalUnknownState(format!("negative state version {}", version))
        })
    }

    async fn set_version(&self, version: u32) -> LedgerResult<()> {
        let version = i32::try_from(version)
            .map_err(|_| LedgerError::Internal(format!("state version {} out of range", version)))?;

        sqlx::query(
            r#"
            INSERT INTO ledger_state_version (id, version)
            VALUES (1, $1)
            ON CONFLICT (id) DO UPDATE SET version = EXCLUDED.version
            "#,
        )
        .bind(version)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_value(&self, key: &str) -> LedgerResult<Option<Value>> {
        let row = sqlx::query(
            r#"
            SELECT value FROM ledger_state WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row.try_get::<Value, _>("value")?)),
            None => Ok(None),
        }
    }

    async fn set_value(&self, key: &str, value: Value) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO ledger_state (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove_value(&self, key: &str) -> LedgerResult<()> {
        sqlx::query(
            r#"
            DELETE FROM ledger_state WHERE key = $1
            "#,
        )
        .bind(key)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ========== WALLETS ==========

#[async_trait]
impl WalletStore for PgLedgerStore {
    async fn get_external_wallet(
        &self,
        wallet_type: WalletType,
    ) -> LedgerResult<Option<ExternalWallet>> {
        let row = sqlx::query(
            r#"
            SELECT address, token, status
            FROM external_wallets
            WHERE wallet_type = $1
            "#,
        )
        .bind(wallet_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status: String = row.try_get("status")?;
        Ok(Some(ExternalWallet {
            wallet_type,
            address: row.try_get("address")?,
            token: row.try_get("token")?,
            status: status.parse::<WalletStatus>()?,
        }))
    }

    async fn save_external_wallet(&self, wallet: ExternalWallet) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO external_wallets (wallet_type, address, token, status, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (wallet_type) DO UPDATE
            SET address = EXCLUDED.address,
                token = EXCLUDED.token,
                status = EXCLUDED.status,
                updated_at = NOW()
            "#,
        )
        .bind(wallet.wallet_type.as_str())
        .bind(&wallet.address)
        .bind(&wallet.token)
        .bind(wallet.status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ========== TRANSFER FEES ==========

#[async_trait]
impl TransferFeeStore for PgLedgerStore {
    async fn set_transfer_fee(
        &self,
        wallet_type: WalletType,
        fee: TransferFee,
    ) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO transfer_fees (wallet_type, id, amount)
            VALUES ($1, $2, $3)
            ON CONFLICT (wallet_type, id) DO UPDATE SET amount = EXCLUDED.amount
            "#,
        )
        .bind(wallet_type.as_str())
        .bind(&fee.id)
        .bind(to_big_decimal(fee.amount)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_transfer_fees(&self, wallet_type: WalletType) -> LedgerResult<Vec<TransferFee>> {
        let rows = sqlx::query(
            r#"
            SELECT id, amount FROM transfer_fees WHERE wallet_type = $1
            "#,
        )
        .bind(wallet_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let id: String = row.try_get("id")?;
                if id.is_empty() {
                    return Err(LedgerError::FatalUnknownState(
                        "transfer fee without id".to_string(),
                    ));
                }
                let amount = from_big_decimal(row.try_get("amount")?)?;
                Ok(TransferFee::new(id, amount))
            })
            .collect()
    }

    async fn remove_transfer_fee(&self, wallet_type: WalletType, id: &str) -> LedgerResult<()> {
        sqlx::query(
            r#"
            DELETE FROM transfer_fees WHERE wallet_type = $1 AND id = $2
            "#,
        )
        .bind(wallet_type.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ========== CONTRIBUTIONS ==========

#[async_trait]
impl ContributionStore for PgLedgerStore {
    async fn save_contribution_publisher(
        &self,
        publisher: ContributionPublisher,
    ) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO contribution_publishers
                (contribution_id, publisher_key, total_amount, contributed_amount)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (contribution_id, publisher_key) DO UPDATE
            SET total_amount = EXCLUDED.total_amount,
                contributed_amount = EXCLUDED.contributed_amount
            "#,
        )
        .bind(&publisher.contribution_id)
        .bind(&publisher.publisher_key)
        .bind(to_big_decimal(publisher.total_amount)?)
        .bind(to_big_decimal(publisher.contributed_amount)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_contribution_publishers(
        &self,
        contribution_id: &str,
    ) -> LedgerResult<Vec<ContributionPublisher>> {
        let rows = sqlx::query(
            r#"
            SELECT contribution_id, publisher_key, total_amount, contributed_amount
            FROM contribution_publishers
            WHERE contribution_id = $1
            "#,
        )
        .bind(contribution_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(ContributionPublisher {
                    contribution_id: row.try_get("contribution_id")?,
                    publisher_key: row.try_get("publisher_key")?,
                    total_amount: from_big_decimal(row.try_get("total_amount")?)?,
                    contributed_amount: from_big_decimal(row.try_get("contributed_amount")?)?,
                })
            })
            .collect()
    }

    async fn update_contributed_amount(
        &self,
        contribution_id: &str,
        publisher_key: &str,
    ) -> LedgerResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE contribution_publishers
            SET contributed_amount = total_amount
            WHERE contribution_id = $1 AND publisher_key = $2
            "#,
        )
        .bind(contribution_id)
        .bind(publisher_key)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::Failed(format!(
                "Publisher {} not found for contribution {}",
                publisher_key, contribution_id
            )));
        }

        Ok(())
    }
}

// ========== EVENT LOG ==========

#[async_trait]
impl EventLogStore for PgLedgerStore {
    async fn save_event_log(&self, key: &str, value: &str) -> LedgerResult<()> {
        let entry = EventLog::new(key, value);

        sqlx::query(
            r#"
            INSERT INTO event_logs (id, key, value, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.key)
        .bind(&entry.value)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_event_logs(&self) -> LedgerResult<Vec<EventLog>> {
        let rows = sqlx::query(
            r#"
            SELECT id, key, value, created_at
            FROM event_logs
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(EventLog {
                    id: row.try_get("id")?,
                    key: row.try_get("key")?,
                    value: row.try_get("value")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}
