use std::sync::Arc;

use carepay_bank::providers::{MonnifyProvider, PaystackProvider};
use carepay_bank::ProviderRegistry;
use carepay_common::CarePayError;
use carepay_ledger::core::funding::FundingService;
use carepay_ledger::core::reconciliation::Reconciler;
use carepay_ledger::Ledger;

use crate::api::auth::JwtAuth;
use crate::api::rest::AppState;
use crate::config::NodeConfig;
use crate::runtime::janitor::{Janitor, JanitorSettings};

pub type Result<T> = std::result::Result<T, CarePayError>;

pub struct CarePayRuntime {
    pub config: NodeConfig,
    pub ledger: Ledger,
    pub registry: ProviderRegistry,
    pub reconciler: Arc<Reconciler>,
    pub funding: Arc<FundingService>,
}

impl CarePayRuntime {
    pub fn app_state(&self) -> AppState {
        AppState {
            ledger: self.ledger.clone(),
            registry: self.registry.clone(),
            reconciler: Arc::clone(&self.reconciler),
            funding: Arc::clone(&self.funding),
            auth: Arc::new(JwtAuth::new(&self.config.jwt_secret)),
            currency: self.config.currency.clone(),
        }
    }

    pub fn janitor(&self) -> Janitor {
        Janitor::new(
            Arc::clone(&self.reconciler),
            Arc::clone(&self.ledger.guard),
            JanitorSettings::from(&self.config),
        )
    }
}

/// Registers every provider switched on in `config`.
pub fn build_registry(config: &NodeConfig) -> Result<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();

    if config.paystack.enabled {
        let provider = PaystackProvider::new(config.paystack.settings.clone())?;
        registry.register(Arc::new(provider))?;
        tracing::info!("💳 Paystack enabled ({})", config.paystack.settings.base_url);
    }
    if config.monnify.enabled {
        let provider = MonnifyProvider::new(config.monnify.settings.clone())?;
        registry.register(Arc::new(provider))?;
        tracing::info!("💳 Monnify enabled ({})", config.monnify.settings.base_url);
    }
    if registry.kinds().is_empty() {
        tracing::warn!("⚠️ No payment provider enabled. Every webhook will be rejected.");
    }
    Ok(registry)
}

pub fn build_runtime(config: NodeConfig) -> Result<CarePayRuntime> {
    // 1. Providers
    let registry = build_registry(&config)?;

    // 2. Ledger
    let ledger = Ledger::open(&config.data_dir)?;
    tracing::info!("✅ Ledger opened at {}", config.data_dir);

    // 3. Services
    let reconciler = Arc::new(ledger.reconciler(registry.clone(), config.reverify_webhooks));
    let funding = Arc::new(ledger.funding(registry.clone()));
    if !config.reverify_webhooks {
        tracing::warn!("⚠️ Webhook re-verification disabled. Signed webhooks are credited as reported.");
    }

    Ok(CarePayRuntime { config, ledger, registry, reconciler, funding })
}
