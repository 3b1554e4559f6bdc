//! Persistence seams used by fulfillment and scheduling.
//!
//! The wallet debit and the SUCCESS ledger append are one operation
//! ([`TransactionLedger::settle_success`]) so a reader never observes one
//! without the other. Schedule transitions are conditional writes keyed on
//! the current status, which is what makes claiming safe across scheduler
//! instances.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::error::StoreResult;
use super::models::{
    NewScheduledTransaction, NewTransaction, ScheduledTransaction, Transaction, WalletAccount,
};

#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Tier and current balance for a user.
    async fn account(&self, user_id: &str) -> StoreResult<WalletAccount>;

    /// Funding entry point used by external top-up flows.
    async fn credit(&self, user_id: &str, amount: Decimal) -> StoreResult<Decimal>;

    async fn ping(&self) -> StoreResult<()>;
}

#[async_trait]
pub trait TransactionLedger: Send + Sync {
    /// Atomically decrements the wallet by `tx.amount` if the balance covers
    /// it and appends the SUCCESS record. Writes nothing and returns
    /// `StoreError::InsufficientFunds` otherwise.
    async fn settle_success(&self, tx: NewTransaction) -> StoreResult<(Transaction, Decimal)>;

    /// Appends a FAILED record. Never touches the wallet.
    async fn record_failure(&self, tx: NewTransaction) -> StoreResult<Transaction>;

    async fn find_by_reference(&self, upstream_reference: &str)
        -> StoreResult<Option<Transaction>>;

    /// Flips a PENDING record to SUCCESS. Returns `false` when the record is
    /// missing or in any other state.
    async fn mark_success(&self, id: Uuid) -> StoreResult<bool>;

    async fn list_for_user(&self, user_id: &str, limit: i64) -> StoreResult<Vec<Transaction>>;
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn create(&self, new: NewScheduledTransaction) -> StoreResult<ScheduledTransaction>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<ScheduledTransaction>>;

    /// PENDING records whose `scheduled_time <= now`, oldest first.
    async fn find_due(&self, now: DateTime<Utc>, limit: i64)
        -> StoreResult<Vec<ScheduledTransaction>>;

    /// PENDING -> PROCESSING. `false` means another worker got there first.
    async fn claim(&self, id: Uuid) -> StoreResult<bool>;

    /// PROCESSING -> COMPLETED.
    async fn complete(&self, id: Uuid) -> StoreResult<bool>;

    /// PROCESSING -> FAILED with the error recorded verbatim.
    async fn fail(&self, id: Uuid, error: &str) -> StoreResult<bool>;

    async fn list_for_user(&self, user_id: &str, limit: i64)
        -> StoreResult<Vec<ScheduledTransaction>>;
}
