pub mod funding;
pub mod ledger;
pub mod reconciliation;
pub mod store;

use std::sync::Arc;

use carepay_bank::{PaymentProvider, ProviderRegistry};
use carepay_common::payment::ProviderKind;

use crate::error::{LedgerError, Result};

pub(crate) fn provider_for(registry: &ProviderRegistry, kind: ProviderKind) -> Result<Arc<dyn PaymentProvider>> {
    registry.get(kind).map_err(|e| LedgerError::Validation(e.to_string()))
}
