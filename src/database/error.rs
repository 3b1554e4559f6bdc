//! Store-specific error types

use rust_decimal::Decimal;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Requested record does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Conditional wallet decrement refused because the balance is too low
    #[error("insufficient funds for {user_id}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        user_id: String,
        balance: Decimal,
        requested: Decimal,
    },

    /// Stored document could not be decoded into a model
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// Connection, pool or query failure in the backend
    #[error("backend error: {message}")]
    Backend { message: String, retryable: bool },
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Backend { retryable: true, .. })
    }
}

#[cfg(feature = "database")]
impl StoreError {
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound {
                entity: "row",
                id: String::new(),
            },
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Backend {
                    message: err.to_string(),
                    retryable: true,
                }
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Corrupt(err.to_string())
            }
            other => StoreError::Backend {
                message: other.to_string(),
                retryable: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_flagged_backend_errors_are_retryable() {
        assert!(StoreError::Backend {
            message: "pool timed out".to_string(),
            retryable: true
        }
        .is_retryable());
        assert!(!StoreError::Corrupt("bad status".to_string()).is_retryable());
        assert!(!StoreError::NotFound {
            entity: "wallet",
            id: "u1".to_string()
        }
        .is_retryable());
    }
}
