use std::sync::Arc;

use carepay_bank::{ProviderError, ProviderRegistry};
use carepay_common::payment::{PaymentInit, ProviderKind, VirtualAccount};
use carepay_common::Amount;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::core::ledger::idempotency::{IdempotencyGuard, Reservation};
use crate::core::ledger::transaction_engine::locks::AccountLocks;
use crate::core::ledger::transaction_engine::validation::ValidationHandler;
use crate::core::ledger::transaction_engine::TransactionEngine;
use crate::core::provider_for;
use crate::error::{LedgerError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct FundingCheckout {
    pub reference: String,
    pub checkout_url: String,
    pub access_code: Option<String>,
    pub provider: ProviderKind,
    pub amount: Amount,
}

/// Patient-initiated funding: hosted checkouts and virtual accounts.
pub struct FundingService {
    engine: Arc<TransactionEngine>,
    guard: Arc<IdempotencyGuard>,
    registry: ProviderRegistry,
    provisioning: AccountLocks,
}

impl FundingService {
    pub fn new(engine: Arc<TransactionEngine>, guard: Arc<IdempotencyGuard>, registry: ProviderRegistry) -> Self {
        Self { engine, guard, registry, provisioning: AccountLocks::new() }
    }

    /// Reserves a reference and opens a provider checkout for it.
    ///
    /// The reservation is written before the provider call so a payment made
    /// on a checkout we never heard back from can still be swept. A failed
    /// initiation marks the reservation failed and is not retried here.
    pub async fn initiate(
        &self,
        patient_id: &str,
        amount: Amount,
        provider_kind: ProviderKind,
        callback_url: Option<String>,
    ) -> Result<FundingCheckout> {
        ValidationHandler::validate_amount(amount)?;
        let provider = provider_for(&self.registry, provider_kind)?;
        let account = self.engine.account(patient_id).await?;

        // 1. Reserve
        let reference = format!("WAL-{}", Uuid::new_v4().simple());
        let description = format!("Wallet funding via {}", provider_kind);
        self.guard.reserve(Reservation {
            reference: reference.clone(),
            account_id: patient_id.to_string(),
            amount,
            provider: provider_kind,
            description: description.clone(),
            metadata: Some(json!({ "source": "checkout", "callback_url": callback_url })),
        })?;

        // 2. Provider checkout
        let init = PaymentInit {
            patient_id: patient_id.to_string(),
            holder: account.holder.clone(),
            amount,
            currency: account.currency.clone(),
            reference: reference.clone(),
            description,
            callback_url,
        };
        let checkout = match provider.initialize_payment(&init).await {
            Ok(checkout) => checkout,
            Err(e) => {
                tracing::error!("❌ {} checkout for {} failed: {}", provider_kind, patient_id, e);
                self.guard.mark_failed(&reference, &format!("initialization failed: {}", e))?;
                return Err(e.into());
            }
        };

        tracing::info!("💳 Checkout {} opened for {} ({} {})", reference, patient_id, amount, account.currency);
        Ok(FundingCheckout {
            reference,
            checkout_url: checkout.checkout_url,
            access_code: checkout.access_code,
            provider: provider_kind,
            amount,
        })
    }

    /// Returns the patient's virtual account with `provider_kind`, creating
    /// it on first use.
    ///
    /// A stored account is returned without calling the provider. A customer
    /// id left by an earlier partial failure is passed back to the adapter.
    pub async fn provision_virtual_account(&self, patient_id: &str, provider_kind: ProviderKind) -> Result<VirtualAccount> {
        let provider = provider_for(&self.registry, provider_kind)?;
        let store = self.engine.store();

        let _guard = self.provisioning.lock(&format!("{}:{}", provider_kind, patient_id)).await;

        // 1. Existing record
        if let Some(existing) = store.virtual_account(provider_kind, patient_id)? {
            return Ok(existing);
        }
        let account = self.engine.account(patient_id).await?;

        // 2. Provider call, resuming from a known customer
        let known_customer = store.provider_customer(provider_kind, patient_id)?;
        let created = provider
            .create_funding_account(patient_id, &account.holder, known_customer.as_deref())
            .await;

        let virtual_account = match created {
            Ok(virtual_account) => virtual_account,
            Err(ProviderError::PartialFunding { customer_id, message }) => {
                store.put_provider_customer(provider_kind, patient_id, &customer_id)?;
                tracing::warn!(
                    "⚠️ {} customer {} kept for {} after account step failed: {}",
                    provider_kind,
                    customer_id,
                    patient_id,
                    message
                );
                return Err(LedgerError::Provider(ProviderError::PartialFunding { customer_id, message }));
            }
            Err(e) => return Err(e.into()),
        };

        // 3. Persist
        if let Some(customer_id) = &virtual_account.customer_id {
            store.put_provider_customer(provider_kind, patient_id, customer_id)?;
        }
        store.put_virtual_account(&virtual_account)?;

        tracing::info!(
            "🏦 {} virtual account {} ({}) provisioned for {}",
            provider_kind,
            virtual_account.account_number,
            virtual_account.bank_name,
            patient_id
        );
        Ok(virtual_account)
    }

    pub async fn virtual_accounts(&self, patient_id: &str) -> Result<Vec<VirtualAccount>> {
        self.engine.account(patient_id).await?;
        self.engine.store().virtual_accounts_for(patient_id)
    }
}
