use thiserror::Error;

use crate::money::Amount;

/// Error taxonomy shared by every CarePay crate.
///
/// Crate-local errors (ledger, provider) convert into this type at the crate
/// boundary, and the HTTP layer maps each variant to a status code.
#[derive(Debug, Error)]
pub enum CarePayError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: Amount, requested: Amount },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A reference is already bound to a different operation.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Upstream payment API failure. `retryable` is true for transport
    /// failures and 5xx responses.
    #[error("Provider error: {message}")]
    Provider { message: String, retryable: bool },

    /// A verified notification could not be matched to a wallet.
    #[error("Reconciliation gap: {0}")]
    ReconciliationGap(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CarePayError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CarePayError::Provider { retryable: true, .. } | CarePayError::Storage(_) | CarePayError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CarePayError>;
