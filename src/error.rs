//! Error taxonomy for purchase fulfillment.
//!
//! Adapters never raise across their boundary; they return a
//! [`ProviderResult`](crate::vending::types::ProviderResult). Everything the
//! fulfillment and scheduling layers can fail with is one of the variants
//! below, each mapped to an HTTP status and a machine-readable code for the
//! internal purchase API.

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::database::error::StoreError;
use crate::services::pricing::PricingError;
use crate::vending::router::RoutingError;
use crate::vending::types::{Category, ProviderId};

pub type FulfillmentResult<T> = Result<T, FulfillmentError>;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ConfigurationError,
    RoutingError,
    InsufficientBalance,
    UpstreamTransient,
    UpstreamRejected,
    MalformedUpstreamResponse,
    InvalidRequest,
    SettlementConflict,
    StoreError,
    InternalError,
}

#[derive(Debug, Clone, Error)]
pub enum FulfillmentError {
    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: Decimal, required: Decimal },

    #[error("upstream transient failure: provider={provider}, message={message}")]
    UpstreamTransient {
        provider: ProviderId,
        message: String,
        transaction_id: Option<Uuid>,
    },

    #[error("upstream rejected: provider={provider}, message={message}")]
    UpstreamRejected {
        provider: ProviderId,
        message: String,
        transaction_id: Option<Uuid>,
    },

    #[error("malformed upstream response: provider={provider}, message={message}")]
    MalformedUpstreamResponse {
        provider: ProviderId,
        message: String,
        transaction_id: Option<Uuid>,
    },

    #[error("invalid request: {message}")]
    InvalidRequest {
        message: String,
        field: Option<String>,
    },

    #[error("settlement conflict for {category} via {provider}: upstream reference {upstream_reference} was fulfilled but the wallet debit failed")]
    SettlementConflict {
        category: Category,
        provider: ProviderId,
        upstream_reference: String,
        transaction_id: Option<Uuid>,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl From<PricingError> for FulfillmentError {
    fn from(err: PricingError) -> Self {
        FulfillmentError::Configuration {
            message: err.to_string(),
        }
    }
}

impl FulfillmentError {
    pub fn is_retryable(&self) -> bool {
        match self {
            FulfillmentError::Configuration { .. } => false,
            FulfillmentError::Routing(_) => false,
            FulfillmentError::InsufficientBalance { .. } => false,
            FulfillmentError::UpstreamTransient { .. } => true,
            FulfillmentError::UpstreamRejected { .. } => false,
            FulfillmentError::MalformedUpstreamResponse { .. } => true,
            FulfillmentError::InvalidRequest { .. } => false,
            FulfillmentError::SettlementConflict { .. } => false,
            FulfillmentError::Store(err) => err.is_retryable(),
            FulfillmentError::Internal { .. } => false,
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            FulfillmentError::Configuration { .. } => ErrorCode::ConfigurationError,
            FulfillmentError::Routing(_) => ErrorCode::RoutingError,
            FulfillmentError::InsufficientBalance { .. } => ErrorCode::InsufficientBalance,
            FulfillmentError::UpstreamTransient { .. } => ErrorCode::UpstreamTransient,
            FulfillmentError::UpstreamRejected { .. } => ErrorCode::UpstreamRejected,
            FulfillmentError::MalformedUpstreamResponse { .. } => {
                ErrorCode::MalformedUpstreamResponse
            }
            FulfillmentError::InvalidRequest { .. } => ErrorCode::InvalidRequest,
            FulfillmentError::SettlementConflict { .. } => ErrorCode::SettlementConflict,
            FulfillmentError::Store(_) => ErrorCode::StoreError,
            FulfillmentError::Internal { .. } => ErrorCode::InternalError,
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            FulfillmentError::Configuration { .. } => 500,
            FulfillmentError::Routing(_) => 500,
            FulfillmentError::InsufficientBalance { .. } => 402,
            FulfillmentError::UpstreamTransient { .. } => 503,
            FulfillmentError::UpstreamRejected { .. } => 422,
            FulfillmentError::MalformedUpstreamResponse { .. } => 502,
            FulfillmentError::InvalidRequest { .. } => 400,
            FulfillmentError::SettlementConflict { .. } => 409,
            FulfillmentError::Store(StoreError::NotFound { .. }) => 404,
            FulfillmentError::Store(_) => 500,
            FulfillmentError::Internal { .. } => 500,
        }
    }

    /// Ledger entry written for this failure, when one was.
    pub fn transaction_id(&self) -> Option<Uuid> {
        match self {
            FulfillmentError::UpstreamTransient { transaction_id, .. }
            | FulfillmentError::UpstreamRejected { transaction_id, .. }
            | FulfillmentError::MalformedUpstreamResponse { transaction_id, .. }
            | FulfillmentError::SettlementConflict { transaction_id, .. } => *transaction_id,
            _ => None,
        }
    }

    /// Message safe to show to the end user. Upstream rejections carry the
    /// provider's own wording.
    pub fn user_message(&self) -> String {
        match self {
            FulfillmentError::Configuration { .. } | FulfillmentError::Routing(_) => {
                "Service is temporarily unavailable for this product".to_string()
            }
            FulfillmentError::InsufficientBalance { .. } => {
                "Insufficient wallet balance".to_string()
            }
            FulfillmentError::UpstreamTransient { provider, .. } => format!(
                "{} did not respond in time. Please retry shortly",
                provider
            ),
            FulfillmentError::UpstreamRejected {
                provider, message, ..
            } => format!("{}: {}", provider, message),
            FulfillmentError::MalformedUpstreamResponse { provider, .. } => format!(
                "{} returned an unreadable response. Please retry shortly",
                provider
            ),
            FulfillmentError::InvalidRequest { message, .. } => message.clone(),
            FulfillmentError::SettlementConflict { .. } => {
                "Purchase is under review. Support has been notified".to_string()
            }
            FulfillmentError::Store(_) | FulfillmentError::Internal { .. } => {
                "An internal error occurred".to_string()
            }
        }
    }
}
