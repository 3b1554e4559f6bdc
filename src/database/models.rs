use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::pricing::UserTier;
use crate::vending::types::{Category, MeterType, ProviderId, PurchaseRequest};

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalletAccount {
    pub user_id: String,
    pub tier: UserTier,
    pub balance: Decimal,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Awaiting asynchronous settlement; written only by external flows.
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TransactionStatus::Pending),
            "success" => Some(TransactionStatus::Success),
            "failed" => Some(TransactionStatus::Failed),
            _ => None,
        }
    }
}

/// Append-only ledger record of one purchase attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: String,
    pub category: Category,
    /// What the user paid (the charge, not the provider's cost).
    pub amount: Decimal,
    pub provider_id: ProviderId,
    pub upstream_reference: String,
    pub status: TransactionStatus,
    pub message: String,
    pub token: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub user_id: String,
    pub category: Category,
    pub amount: Decimal,
    pub provider_id: ProviderId,
    pub upstream_reference: String,
    pub message: String,
    pub token: Option<String>,
}

impl NewTransaction {
    pub fn into_transaction(self, status: TransactionStatus) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            category: self.category,
            amount: self.amount,
            provider_id: self.provider_id,
            upstream_reference: self.upstream_reference,
            status,
            message: self.message,
            token: self.token,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduled transactions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Pending => "pending",
            ScheduleStatus::Processing => "processing",
            ScheduleStatus::Completed => "completed",
            ScheduleStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ScheduleStatus::Pending),
            "processing" => Some(ScheduleStatus::Processing),
            "completed" => Some(ScheduleStatus::Completed),
            "failed" => Some(ScheduleStatus::Failed),
            _ => None,
        }
    }

    /// PENDING only moves to PROCESSING; PROCESSING only moves to a terminal
    /// state; terminal states never move.
    pub fn valid_transitions(&self) -> &'static [ScheduleStatus] {
        match self {
            ScheduleStatus::Pending => &[ScheduleStatus::Processing],
            ScheduleStatus::Processing => &[ScheduleStatus::Completed, ScheduleStatus::Failed],
            ScheduleStatus::Completed | ScheduleStatus::Failed => &[],
        }
    }

    pub fn can_transition_to(&self, next: ScheduleStatus) -> bool {
        self.valid_transitions().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledRequestFields {
    pub carrier: String,
    pub recipient: String,
    #[serde(default)]
    pub plan_id: Option<String>,
    /// Charge locked in when the purchase was scheduled.
    pub amount: Decimal,
    /// Top-up size sent upstream for upfront-priced categories.
    #[serde(default)]
    pub face_value: Option<Decimal>,
    #[serde(default)]
    pub meter_type: Option<MeterType>,
    #[serde(default)]
    pub quantity: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledTransaction {
    pub id: Uuid,
    pub user_id: String,
    pub category: Category,
    pub request_fields: ScheduledRequestFields,
    pub scheduled_time: DateTime<Utc>,
    pub status: ScheduleStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledTransaction {
    /// Rebuilds the purchase request for execution. The face value travels
    /// upstream; the locked charge is what the wallet pays.
    pub fn to_purchase_request(&self) -> PurchaseRequest {
        let fields = &self.request_fields;
        PurchaseRequest {
            category: self.category,
            carrier_or_biller: fields.carrier.clone(),
            recipient: fields.recipient.clone(),
            plan_or_service_id: fields.plan_id.clone(),
            amount: fields.face_value,
            meter_type: fields.meter_type,
            quantity: fields.quantity,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ScheduleStatus::Pending && self.scheduled_time <= now
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewScheduledTransaction {
    pub user_id: String,
    pub category: Category,
    pub request_fields: ScheduledRequestFields,
    pub scheduled_time: DateTime<Utc>,
}
