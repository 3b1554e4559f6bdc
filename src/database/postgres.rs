//! Postgres-backed stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use uuid::Uuid;

use super::error::{StoreError, StoreResult};
use super::models::{
    NewScheduledTransaction, NewTransaction, ScheduleStatus, ScheduledRequestFields,
    ScheduledTransaction, Transaction, TransactionStatus, WalletAccount,
};
use super::store::{ScheduleStore, TransactionLedger, WalletStore};
use crate::services::pricing::UserTier;
use crate::vending::types::{Category, ProviderId};

const TRANSACTION_COLUMNS: &str = "id, user_id, category, amount, provider_id, upstream_reference, status, message, token, created_at";
const SCHEDULE_COLUMNS: &str = "id, user_id, category, request_fields, scheduled_time, status, error, created_at, updated_at";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, FromRow)]
struct WalletRow {
    user_id: String,
    tier: String,
    balance: Decimal,
}

impl TryFrom<WalletRow> for WalletAccount {
    type Error = StoreError;

    fn try_from(row: WalletRow) -> Result<Self, Self::Error> {
        Ok(WalletAccount {
            tier: UserTier::from_str(&row.tier)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            user_id: row.user_id,
            balance: row.balance,
        })
    }
}

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: Uuid,
    user_id: String,
    category: String,
    amount: Decimal,
    provider_id: String,
    upstream_reference: String,
    status: String,
    message: String,
    token: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Transaction {
            id: row.id,
            user_id: row.user_id,
            category: parse_category(&row.category)?,
            amount: row.amount,
            provider_id: ProviderId::from_str(&row.provider_id)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            upstream_reference: row.upstream_reference,
            status: TransactionStatus::parse(&row.status)
                .ok_or_else(|| StoreError::Corrupt(format!("transaction status {}", row.status)))?,
            message: row.message,
            token: row.token,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ScheduleRow {
    id: Uuid,
    user_id: String,
    category: String,
    request_fields: serde_json::Value,
    scheduled_time: DateTime<Utc>,
    status: String,
    error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ScheduleRow> for ScheduledTransaction {
    type Error = StoreError;

    fn try_from(row: ScheduleRow) -> Result<Self, Self::Error> {
        let request_fields: ScheduledRequestFields = serde_json::from_value(row.request_fields)
            .map_err(|e| StoreError::Corrupt(format!("request_fields: {}", e)))?;
        Ok(ScheduledTransaction {
            id: row.id,
            user_id: row.user_id,
            category: parse_category(&row.category)?,
            request_fields,
            scheduled_time: row.scheduled_time,
            status: ScheduleStatus::parse(&row.status)
                .ok_or_else(|| StoreError::Corrupt(format!("schedule status {}", row.status)))?,
            error: row.error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn parse_category(raw: &str) -> StoreResult<Category> {
    Category::from_str(raw).map_err(|e| StoreError::Corrupt(e.to_string()))
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend {
                message: format!("migration failed: {}", e),
                retryable: false,
            })
    }

    async fn insert_transaction<'e, E>(
        executor: E,
        tx: NewTransaction,
        status: TransactionStatus,
    ) -> StoreResult<Transaction>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let record = tx.into_transaction(status);
        let query = format!(
            "INSERT INTO vend_transactions ({cols}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {cols}",
            cols = TRANSACTION_COLUMNS
        );
        let row = sqlx::query_as::<_, TransactionRow>(&query)
            .bind(record.id)
            .bind(&record.user_id)
            .bind(record.category.as_str())
            .bind(record.amount)
            .bind(record.provider_id.as_str())
            .bind(&record.upstream_reference)
            .bind(record.status.as_str())
            .bind(&record.message)
            .bind(&record.token)
            .bind(record.created_at)
            .fetch_one(executor)
            .await
            .map_err(StoreError::from_sqlx)?;
        row.try_into()
    }

    async fn transition(
        &self,
        id: Uuid,
        from: ScheduleStatus,
        to: ScheduleStatus,
        error: Option<&str>,
    ) -> StoreResult<bool> {
        if !from.can_transition_to(to) {
            return Ok(false);
        }
        let result = sqlx::query(
            "UPDATE scheduled_transactions
             SET status = $3, error = COALESCE($4, error), updated_at = now()
             WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl WalletStore for PgStore {
    async fn account(&self, user_id: &str) -> StoreResult<WalletAccount> {
        let row = sqlx::query_as::<_, WalletRow>(
            "SELECT user_id, tier, balance FROM wallets WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?
        .ok_or_else(|| StoreError::NotFound {
            entity: "wallet",
            id: user_id.to_string(),
        })?;
        row.try_into()
    }

    async fn credit(&self, user_id: &str, amount: Decimal) -> StoreResult<Decimal> {
        sqlx::query_scalar::<_, Decimal>(
            "UPDATE wallets SET balance = balance + $2, updated_at = now()
             WHERE user_id = $1 RETURNING balance",
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?
        .ok_or_else(|| StoreError::NotFound {
            entity: "wallet",
            id: user_id.to_string(),
        })
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;
        Ok(())
    }
}

#[async_trait]
impl TransactionLedger for PgStore {
    async fn settle_success(&self, tx: NewTransaction) -> StoreResult<(Transaction, Decimal)> {
        let mut db_tx = self.pool.begin().await.map_err(StoreError::from_sqlx)?;

        let debited = sqlx::query_scalar::<_, Decimal>(
            "UPDATE wallets SET balance = balance - $2, updated_at = now()
             WHERE user_id = $1 AND balance >= $2
             RETURNING balance",
        )
        .bind(&tx.user_id)
        .bind(tx.amount)
        .fetch_optional(&mut *db_tx)
        .await
        .map_err(StoreError::from_sqlx)?;

        let balance = match debited {
            Some(balance) => balance,
            None => {
                let current = sqlx::query_scalar::<_, Decimal>(
                    "SELECT balance FROM wallets WHERE user_id = $1",
                )
                .bind(&tx.user_id)
                .fetch_optional(&mut *db_tx)
                .await
                .map_err(StoreError::from_sqlx)?;
                db_tx.rollback().await.map_err(StoreError::from_sqlx)?;
                return Err(match current {
                    Some(balance) => StoreError::InsufficientFunds {
                        user_id: tx.user_id,
                        balance,
                        requested: tx.amount,
                    },
                    None => StoreError::NotFound {
                        entity: "wallet",
                        id: tx.user_id,
                    },
                });
            }
        };

        let record =
            Self::insert_transaction(&mut *db_tx, tx, TransactionStatus::Success).await?;
        db_tx.commit().await.map_err(StoreError::from_sqlx)?;
        Ok((record, balance))
    }

    async fn record_failure(&self, tx: NewTransaction) -> StoreResult<Transaction> {
        Self::insert_transaction(&self.pool, tx, TransactionStatus::Failed).await
    }

    async fn find_by_reference(
        &self,
        upstream_reference: &str,
    ) -> StoreResult<Option<Transaction>> {
        if upstream_reference.is_empty() {
            return Ok(None);
        }
        let query = format!(
            "SELECT {} FROM vend_transactions WHERE upstream_reference = $1 ORDER BY created_at DESC LIMIT 1",
            TRANSACTION_COLUMNS
        );
        sqlx::query_as::<_, TransactionRow>(&query)
            .bind(upstream_reference)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?
            .map(Transaction::try_from)
            .transpose()
    }

    async fn mark_success(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE vend_transactions SET status = 'success' WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_for_user(&self, user_id: &str, limit: i64) -> StoreResult<Vec<Transaction>> {
        let query = format!(
            "SELECT {} FROM vend_transactions WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
            TRANSACTION_COLUMNS
        );
        sqlx::query_as::<_, TransactionRow>(&query)
            .bind(user_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?
            .into_iter()
            .map(Transaction::try_from)
            .collect()
    }
}

#[async_trait]
impl ScheduleStore for PgStore {
    async fn create(&self, new: NewScheduledTransaction) -> StoreResult<ScheduledTransaction> {
        let fields = serde_json::to_value(&new.request_fields)
            .map_err(|e| StoreError::Corrupt(format!("request_fields: {}", e)))?;
        let query = format!(
            "INSERT INTO scheduled_transactions (id, user_id, category, request_fields, scheduled_time, status)
             VALUES ($1, $2, $3, $4, $5, 'pending') RETURNING {}",
            SCHEDULE_COLUMNS
        );
        let row = sqlx::query_as::<_, ScheduleRow>(&query)
            .bind(Uuid::new_v4())
            .bind(&new.user_id)
            .bind(new.category.as_str())
            .bind(fields)
            .bind(new.scheduled_time)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;
        row.try_into()
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<ScheduledTransaction>> {
        let query = format!(
            "SELECT {} FROM scheduled_transactions WHERE id = $1",
            SCHEDULE_COLUMNS
        );
        sqlx::query_as::<_, ScheduleRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?
            .map(ScheduledTransaction::try_from)
            .transpose()
    }

    async fn find_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<ScheduledTransaction>> {
        let query = format!(
            "SELECT {} FROM scheduled_transactions
             WHERE status = 'pending' AND scheduled_time <= $1
             ORDER BY scheduled_time ASC LIMIT $2",
            SCHEDULE_COLUMNS
        );
        sqlx::query_as::<_, ScheduleRow>(&query)
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?
            .into_iter()
            .map(ScheduledTransaction::try_from)
            .collect()
    }

    async fn claim(&self, id: Uuid) -> StoreResult<bool> {
        self.transition(id, ScheduleStatus::Pending, ScheduleStatus::Processing, None)
            .await
    }

    async fn complete(&self, id: Uuid) -> StoreResult<bool> {
        self.transition(id, ScheduleStatus::Processing, ScheduleStatus::Completed, None)
            .await
    }

    async fn fail(&self, id: Uuid, error: &str) -> StoreResult<bool> {
        self.transition(
            id,
            ScheduleStatus::Processing,
            ScheduleStatus::Failed,
            Some(error),
        )
        .await
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> StoreResult<Vec<ScheduledTransaction>> {
        let query = format!(
            "SELECT {} FROM scheduled_transactions WHERE user_id = $1 ORDER BY scheduled_time DESC LIMIT $2",
            SCHEDULE_COLUMNS
        );
        sqlx::query_as::<_, ScheduleRow>(&query)
            .bind(user_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?
            .into_iter()
            .map(ScheduledTransaction::try_from)
            .collect()
    }
}
