use std::collections::HashMap;
use std::sync::Arc;

use carepay_common::payment::ProviderKind;
use carepay_common::{CarePayError, Result};

use crate::providers::traits::PaymentProvider;

/// The payment providers enabled on this node, keyed by kind.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn PaymentProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self { providers: HashMap::new() }
    }

    pub fn register(&mut self, provider: Arc<dyn PaymentProvider>) -> Result<()> {
        let kind = provider.kind();
        if self.providers.contains_key(&kind) {
            return Err(CarePayError::Config(format!("Provider already registered: {}", kind)));
        }
        self.providers.insert(kind, provider);
        Ok(())
    }

    pub fn get(&self, kind: ProviderKind) -> Result<Arc<dyn PaymentProvider>> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or_else(|| CarePayError::Validation(format!("Payment provider {} is not enabled", kind)))
    }

    pub fn is_enabled(&self, kind: ProviderKind) -> bool {
        self.providers.contains_key(&kind)
    }

    pub fn kinds(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<_> = self.providers.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }
}
