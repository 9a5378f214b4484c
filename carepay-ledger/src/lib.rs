pub mod core;
pub mod error;

use std::sync::Arc;

use carepay_bank::ProviderRegistry;

use crate::core::funding::FundingService;
use crate::core::ledger::idempotency::IdempotencyGuard;
use crate::core::ledger::transaction_engine::TransactionEngine;
use crate::core::reconciliation::Reconciler;
use crate::core::store::LedgerStore;

pub use crate::core::store::schema::{Account, Channel, Direction, EntryStatus, LedgerEntry};
pub use error::{LedgerError, Result};

/// The wallet ledger: one store shared by the engine and the guard.
#[derive(Clone)]
pub struct Ledger {
    pub store: Arc<LedgerStore>,
    pub engine: Arc<TransactionEngine>,
    pub guard: Arc<IdempotencyGuard>,
}

impl Ledger {
    pub fn open(data_dir: &str) -> Result<Self> {
        let store = Arc::new(LedgerStore::open(data_dir)?);
        Ok(Self {
            engine: Arc::new(TransactionEngine::new(store.clone())),
            guard: Arc::new(IdempotencyGuard::new(store.clone())),
            store,
        })
    }

    pub fn reconciler(&self, registry: ProviderRegistry, reverify_webhooks: bool) -> Reconciler {
        Reconciler::new(self.engine.clone(), self.guard.clone(), registry, reverify_webhooks)
    }

    pub fn funding(&self, registry: ProviderRegistry) -> FundingService {
        FundingService::new(self.engine.clone(), self.guard.clone(), registry)
    }
}
