use carepay_common::Amount;

use crate::error::{LedgerError, Result};

pub struct ValidationHandler;

impl ValidationHandler {
    /// Amounts must be strictly positive and fit in minor units.
    pub fn validate_amount(amount: Amount) -> Result<()> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(format!("{} must be greater than zero", amount)));
        }
        if amount.to_minor().is_none() {
            return Err(LedgerError::InvalidAmount(format!("{} is out of range", amount)));
        }
        Ok(())
    }

    /// Account ids key the per-account index as `{id}:{sequence}`.
    pub fn validate_account_id(account_id: &str) -> Result<()> {
        if account_id.trim().is_empty() {
            return Err(LedgerError::Validation("account id is empty".to_string()));
        }
        if account_id.contains(':') || account_id.contains(';') {
            return Err(LedgerError::Validation(format!("account id '{}' contains a reserved character", account_id)));
        }
        Ok(())
    }

    pub fn validate_reference(reference: &str) -> Result<()> {
        if reference.trim().is_empty() || reference.len() > 128 {
            return Err(LedgerError::Validation("reference must be 1-128 characters".to_string()));
        }
        Ok(())
    }
}
