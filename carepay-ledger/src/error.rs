use carepay_bank::ProviderError;
use carepay_common::{Amount, CarePayError};
use thiserror::Error;

/// Errors raised by the ledger store, the transaction engine and the
/// reconciliation layer.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Amount is zero, negative or not representable.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Account '{0}' not found.")]
    AccountNotFound(String),

    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: Amount, requested: Amount },

    #[error("Source and destination account are the same: '{0}'")]
    SameAccount(String),

    /// The reference already belongs to another account or direction.
    #[error("Reference '{0}' is bound to a different operation.")]
    ReferenceConflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Folds any redb error into [`LedgerError::Storage`].
pub(crate) fn storage_err<E: Into<redb::Error>>(e: E) -> LedgerError {
    LedgerError::Storage(e.into().to_string())
}

impl From<LedgerError> for CarePayError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InvalidAmount(msg) => CarePayError::Validation(format!("invalid amount: {}", msg)),
            LedgerError::SameAccount(id) => {
                CarePayError::Validation(format!("cannot transfer from '{}' to itself", id))
            }
            LedgerError::Validation(msg) => CarePayError::Validation(msg),
            LedgerError::AccountNotFound(id) => CarePayError::NotFound(format!("wallet for patient '{}'", id)),
            LedgerError::NotFound(what) => CarePayError::NotFound(what),
            LedgerError::InsufficientFunds { available, requested } => {
                CarePayError::InsufficientFunds { available, requested }
            }
            LedgerError::ReferenceConflict(reference) => {
                CarePayError::Conflict(format!("reference '{}' is already in use", reference))
            }
            LedgerError::Forbidden(msg) => CarePayError::Forbidden(msg),
            LedgerError::Storage(msg) => CarePayError::Storage(msg),
            LedgerError::Serialization(e) => CarePayError::Serialization(e),
            LedgerError::Io(e) => CarePayError::Io(e),
            LedgerError::Provider(e) => e.into(),
        }
    }
}
