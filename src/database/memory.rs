//! Process-local store used by tests and by `SKIP_EXTERNALS` runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::error::{StoreError, StoreResult};
use super::models::{
    NewScheduledTransaction, NewTransaction, ScheduleStatus, ScheduledTransaction, Transaction,
    TransactionStatus, WalletAccount,
};
use super::store::{ScheduleStore, TransactionLedger, WalletStore};
use crate::services::pricing::UserTier;

#[derive(Default)]
struct State {
    wallets: HashMap<String, WalletAccount>,
    ledger: Vec<Transaction>,
    schedules: HashMap<Uuid, ScheduledTransaction>,
}

/// All three store traits over one lock, so the settle step is atomic.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert_wallet(&self, user_id: &str, tier: UserTier, balance: Decimal) {
        let mut state = self.state.write().await;
        state.wallets.insert(
            user_id.to_string(),
            WalletAccount {
                user_id: user_id.to_string(),
                tier,
                balance,
            },
        );
    }

    pub async fn balance(&self, user_id: &str) -> Option<Decimal> {
        self.state
            .read()
            .await
            .wallets
            .get(user_id)
            .map(|w| w.balance)
    }

    pub async fn ledger(&self) -> Vec<Transaction> {
        self.state.read().await.ledger.clone()
    }

    /// Inserts a schedule record verbatim, whatever its status.
    pub async fn insert_schedule(&self, record: ScheduledTransaction) {
        self.state
            .write()
            .await
            .schedules
            .insert(record.id, record);
    }

    async fn transition(
        &self,
        id: Uuid,
        from: ScheduleStatus,
        to: ScheduleStatus,
        error: Option<&str>,
    ) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        let record = match state.schedules.get_mut(&id) {
            Some(r) => r,
            None => return Ok(false),
        };
        if record.status != from || !from.can_transition_to(to) {
            return Ok(false);
        }
        record.status = to;
        record.updated_at = Utc::now();
        if let Some(message) = error {
            record.error = Some(message.to_string());
        }
        Ok(true)
    }
}

#[async_trait]
impl WalletStore for InMemoryStore {
    async fn account(&self, user_id: &str) -> StoreResult<WalletAccount> {
        self.state
            .read()
            .await
            .wallets
            .get(user_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                entity: "wallet",
                id: user_id.to_string(),
            })
    }

    async fn credit(&self, user_id: &str, amount: Decimal) -> StoreResult<Decimal> {
        let mut state = self.state.write().await;
        let wallet = state
            .wallets
            .get_mut(user_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "wallet",
                id: user_id.to_string(),
            })?;
        wallet.balance += amount;
        Ok(wallet.balance)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl TransactionLedger for InMemoryStore {
    async fn settle_success(&self, tx: NewTransaction) -> StoreResult<(Transaction, Decimal)> {
        let mut state = self.state.write().await;
        let wallet = state
            .wallets
            .get_mut(&tx.user_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "wallet",
                id: tx.user_id.clone(),
            })?;
        if wallet.balance < tx.amount {
            return Err(StoreError::InsufficientFunds {
                user_id: tx.user_id.clone(),
                balance: wallet.balance,
                requested: tx.amount,
            });
        }
        wallet.balance -= tx.amount;
        let balance = wallet.balance;
        let record = tx.into_transaction(TransactionStatus::Success);
        state.ledger.push(record.clone());
        Ok((record, balance))
    }

    async fn record_failure(&self, tx: NewTransaction) -> StoreResult<Transaction> {
        let record = tx.into_transaction(TransactionStatus::Failed);
        self.state.write().await.ledger.push(record.clone());
        Ok(record)
    }

    async fn find_by_reference(
        &self,
        upstream_reference: &str,
    ) -> StoreResult<Option<Transaction>> {
        Ok(self
            .state
            .read()
            .await
            .ledger
            .iter()
            .rev()
            .find(|t| !t.upstream_reference.is_empty() && t.upstream_reference == upstream_reference)
            .cloned())
    }

    async fn mark_success(&self, id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        match state.ledger.iter_mut().find(|t| t.id == id) {
            Some(record) if record.status == TransactionStatus::Pending => {
                record.status = TransactionStatus::Success;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_for_user(&self, user_id: &str, limit: i64) -> StoreResult<Vec<Transaction>> {
        let state = self.state.read().await;
        let mut records: Vec<Transaction> = state
            .ledger
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit.max(0) as usize);
        Ok(records)
    }
}

#[async_trait]
impl ScheduleStore for InMemoryStore {
    async fn create(&self, new: NewScheduledTransaction) -> StoreResult<ScheduledTransaction> {
        let now = Utc::now();
        let record = ScheduledTransaction {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            category: new.category,
            request_fields: new.request_fields,
            scheduled_time: new.scheduled_time,
            status: ScheduleStatus::Pending,
            error: None,
            created_at: now,
            updated_at: now,
        };
        self.insert_schedule(record.clone()).await;
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<ScheduledTransaction>> {
        Ok(self.state.read().await.schedules.get(&id).cloned())
    }

    async fn find_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<ScheduledTransaction>> {
        let state = self.state.read().await;
        let mut due: Vec<ScheduledTransaction> = state
            .schedules
            .values()
            .filter(|s| s.is_due(now))
            .cloned()
            .collect();
        due.sort_by(|a, b| a.scheduled_time.cmp(&b.scheduled_time));
        due.truncate(limit.max(0) as usize);
        Ok(due)
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
        let state = self.state.read().await;
        let mut records: Vec<ScheduledTransaction> = state
            .schedules
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.scheduled_time.cmp(&a.scheduled_time));
        records.truncate(limit.max(0) as usize);
        Ok(records)
    }
}
