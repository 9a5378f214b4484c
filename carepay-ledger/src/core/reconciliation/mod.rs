pub mod state;

use std::sync::Arc;
use std::time::Duration;

use carepay_bank::{PaymentProvider, ProviderRegistry};
use carepay_common::payment::{PaymentEvent, PaymentEventKind, ProviderKind, VerificationStatus};
use carepay_common::{Amount, CarePayError};
use serde_json::json;

use crate::core::ledger::idempotency::{IdempotencyGuard, Reservation};
use crate::core::ledger::transaction_engine::{Posting, TransactionEngine};
use crate::core::provider_for;
use crate::core::store::schema::{Channel, EntryStatus, LedgerEntry};
use crate::error::{LedgerError, Result};
use state::{PaymentConfirmation, SweepReport, WebhookOutcome, WebhookState};

/// Tracing target of every reconciliation decision. The node routes it to
/// the audit log used for manual follow-up.
pub const RECONCILIATION_TARGET: &str = "reconciliation";

/// Turns verified provider notifications into exactly-once wallet credits.
pub struct Reconciler {
    engine: Arc<TransactionEngine>,
    guard: Arc<IdempotencyGuard>,
    registry: ProviderRegistry,
    /// Query the provider before crediting a webhook.
    reverify: bool,
}

impl Reconciler {
    pub fn new(
        engine: Arc<TransactionEngine>,
        guard: Arc<IdempotencyGuard>,
        registry: ProviderRegistry,
        reverify: bool,
    ) -> Self {
        Self { engine, guard, registry, reverify }
    }

    /// Processes one webhook delivery.
    ///
    /// Returns `Err` only for storage failures while resolving the wallet,
    /// before anything was decided. Every other condition is an outcome; only
    /// [`WebhookState::Rejected`] should be refused to the provider.
    pub async fn handle(&self, kind: ProviderKind, raw: &[u8], signature: Option<&str>) -> Result<WebhookOutcome> {
        // 1. Signature
        let provider = match provider_for(&self.registry, kind) {
            Ok(provider) => provider,
            Err(_) => {
                tracing::warn!(target: RECONCILIATION_TARGET, "❌ Webhook for disabled provider {} rejected", kind);
                return Ok(WebhookOutcome::new(WebhookState::Rejected).with_detail("provider not enabled"));
            }
        };
        if !provider.verify_webhook(raw, signature) {
            tracing::warn!(target: RECONCILIATION_TARGET, "❌ {} webhook rejected: invalid signature", kind);
            return Ok(WebhookOutcome::new(WebhookState::Rejected).with_detail("invalid signature"));
        }
        tracing::debug!(target: RECONCILIATION_TARGET, "{} webhook: {:?}", kind, WebhookState::SignatureVerified);

        // 2. Classification
        let event = match provider.parse_webhook(raw) {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(target: RECONCILIATION_TARGET, "❌ Verified {} webhook could not be parsed: {}", kind, e);
                return Ok(WebhookOutcome::new(WebhookState::ReconciliationFailed).with_detail(e.to_string()));
            }
        };
        if !event.kind.is_funds_received() {
            tracing::info!(target: RECONCILIATION_TARGET, "{} event {:?} ignored", kind, event.kind);
            return Ok(WebhookOutcome::new(WebhookState::Ignored).with_reference(event.reference.as_deref()));
        }
        tracing::debug!(target: RECONCILIATION_TARGET, "{} webhook: {:?}", kind, WebhookState::EventClassified);

        let Some(reference) = event.reference.clone() else {
            tracing::error!(target: RECONCILIATION_TARGET, "❌ {} funds event without reference: {}", kind, event.raw);
            return Ok(WebhookOutcome::new(WebhookState::ReconciliationFailed).with_detail("missing reference"));
        };
        let Some(amount) = event.amount.filter(Amount::is_positive) else {
            tracing::error!(target: RECONCILIATION_TARGET, "❌ {} payment {} has no usable amount", kind, reference);
            return Ok(WebhookOutcome::new(WebhookState::ReconciliationFailed)
                .with_reference(Some(&reference))
                .with_detail("missing amount"));
        };

        // 3. Account resolution
        let existing = self.guard.get(&reference)?;
        if let Some(entry) = existing.as_ref().filter(|e| e.status == EntryStatus::Completed) {
            tracing::info!(target: RECONCILIATION_TARGET, "🔁 {} payment {} already credited", kind, reference);
            let mut outcome = WebhookOutcome::new(WebhookState::Credited)
                .with_reference(Some(&reference))
                .with_account(&entry.account_id);
            outcome.replayed = true;
            return Ok(outcome);
        }

        let Some(account_id) = self.resolve_account(&event, existing.as_ref())? else {
            // Acknowledged to the provider; the gap is left for manual follow-up.
            let gap = CarePayError::ReconciliationGap(format!(
                "no wallet matches {} payment {} of {} (account_number={:?} customer={:?} hint={:?})",
                kind, reference, amount, event.account_number, event.customer_id, event.patient_hint
            ));
            tracing::error!(target: RECONCILIATION_TARGET, "❌ {} payload={}", gap, event.raw);
            return Ok(WebhookOutcome::new(WebhookState::Unresolved)
                .with_reference(Some(&reference))
                .with_detail(gap.to_string()));
        };
        tracing::debug!(target: RECONCILIATION_TARGET, "{} {} -> {} ({:?})", kind, reference, account_id, WebhookState::AccountResolved);

        // 4. Verification and credit. Failures from here on are acknowledged.
        Ok(self.settle_event(provider.as_ref(), &event, &reference, amount, &account_id, existing.as_ref()).await)
    }

    /// Reservation for the reference, then metadata hint, then virtual
    /// account by number, then by customer id.
    fn resolve_account(&self, event: &PaymentEvent, existing: Option<&LedgerEntry>) -> Result<Option<String>> {
        if let Some(entry) = existing {
            return Ok(Some(entry.account_id.clone()));
        }

        let store = self.engine.store();
        if let Some(hint) = &event.patient_hint {
            if store.account(hint)?.is_some() {
                return Ok(Some(hint.clone()));
            }
        }
        if let Some(number) = &event.account_number {
            if let Some(va) = store.virtual_account_by_number(event.provider, number)? {
                return Ok(Some(va.patient_id));
            }
        }
        if let Some(customer_id) = &event.customer_id {
            if let Some(va) = store.virtual_account_by_customer(event.provider, customer_id)? {
                return Ok(Some(va.patient_id));
            }
        }
        Ok(None)
    }

    async fn settle_event(
        &self,
        provider: &dyn PaymentProvider,
        event: &PaymentEvent,
        reference: &str,
        amount: Amount,
        account_id: &str,
        existing: Option<&LedgerEntry>,
    ) -> WebhookOutcome {
        let kind = event.provider;
        let (channel, description) = match event.kind {
            PaymentEventKind::TransferSucceeded => (Channel::BankTransfer, format!("Bank transfer via {}", kind)),
            _ => (Channel::from(kind), format!("Wallet funding via {}", kind)),
        };
        let failed = |detail: String| {
            WebhookOutcome::new(WebhookState::ReconciliationFailed)
                .with_reference(Some(reference))
                .with_account(account_id)
                .with_detail(detail)
        };

        let mut credit_amount = amount;
        if self.reverify {
            match provider.verify_external_transaction(reference).await {
                Ok(verification) if verification.is_success() => {
                    if let Some(verified) = verification.amount {
                        if verified != amount {
                            tracing::warn!(
                                target: RECONCILIATION_TARGET,
                                "⚠️ {} payment {}: webhook amount {} differs from verified {}",
                                kind,
                                reference,
                                amount,
                                verified
                            );
                        }
                        credit_amount = verified;
                    }
                }
                Ok(verification) => {
                    let detail = format!("provider reports {:?}", verification.status);
                    match verification.status {
                        VerificationStatus::Pending => {
                            self.keep_pending(kind, reference, account_id, amount, &description);
                        }
                        _ if existing.is_some() => {
                            if let Err(e) = self.guard.mark_failed(reference, &detail) {
                                tracing::error!(target: RECONCILIATION_TARGET, "❌ Could not fail {}: {}", reference, e);
                            }
                        }
                        _ => {}
                    }
                    tracing::warn!(
                        target: RECONCILIATION_TARGET,
                        "⚠️ {} payment {} for {} not credited: {}",
                        kind,
                        reference,
                        account_id,
                        detail
                    );
                    return failed(detail);
                }
                Err(e) => {
                    self.keep_pending(kind, reference, account_id, amount, &description);
                    tracing::error!(
                        target: RECONCILIATION_TARGET,
                        "❌ {} verification of {} unavailable, left pending: {}",
                        kind,
                        reference,
                        e
                    );
                    return failed(format!("verification unavailable: {}", e));
                }
            }
        }

        let posting = Posting::credit(account_id, credit_amount, &description)
            .with_reference(Some(reference))
            .with_provider(kind, channel)
            .with_metadata(json!({
                "source": "webhook",
                "account_number": event.account_number,
                "customer_id": event.customer_id,
            }));

        match self.engine.apply(posting).await {
            Ok(outcome) => {
                tracing::info!(
                    target: RECONCILIATION_TARGET,
                    "✅ {} payment {} credited {} to {}{}",
                    kind,
                    reference,
                    outcome.entry.amount,
                    account_id,
                    if outcome.replayed { " (replay)" } else { "" }
                );
                let mut result = WebhookOutcome::new(WebhookState::Credited)
                    .with_reference(Some(reference))
                    .with_account(account_id);
                result.replayed = outcome.replayed;
                result
            }
            Err(e) => {
                if !matches!(e, LedgerError::ReferenceConflict(_)) {
                    self.keep_pending(kind, reference, account_id, credit_amount, &description);
                }
                tracing::error!(target: RECONCILIATION_TARGET, "❌ Credit of {} to {} failed: {}", reference, account_id, e);
                failed(e.to_string())
            }
        }
    }

    /// Leaves a pending reservation behind so the sweep retries it.
    fn keep_pending(&self, kind: ProviderKind, reference: &str, account_id: &str, amount: Amount, description: &str) {
        let reservation = Reservation {
            reference: reference.to_string(),
            account_id: account_id.to_string(),
            amount,
            provider: kind,
            description: description.to_string(),
            metadata: Some(json!({ "source": "webhook" })),
        };
        if let Err(e) = self.guard.reserve(reservation) {
            tracing::error!(target: RECONCILIATION_TARGET, "❌ Could not record {} for retry: {}", reference, e);
        }
    }

    /// Redirect-back confirmation of a checkout.
    ///
    /// `caller` restricts the lookup to the caller's own wallet. Safe to call
    /// repeatedly: a completed reference is returned as is.
    pub async fn confirm_payment(&self, reference: &str, caller: Option<&str>) -> Result<PaymentConfirmation> {
        let entry = self
            .guard
            .get(reference)?
            .ok_or_else(|| LedgerError::NotFound(format!("payment reference '{}'", reference)))?;

        if let Some(caller) = caller {
            if caller != entry.account_id {
                return Err(LedgerError::Forbidden(format!("payment '{}' belongs to another wallet", reference)));
            }
        }
        self.settle_reservation(entry).await
    }

    /// Re-verifies every reservation pending for at least `older_than`.
    pub async fn sweep_pending(&self, older_than: Duration) -> Result<SweepReport> {
        let pending = self.guard.pending(older_than)?;
        let mut report = SweepReport::default();

        for entry in pending {
            report.checked += 1;
            let reference = entry.reference.clone();
            match self.settle_reservation(entry).await {
                Ok(confirmation) => match confirmation.status {
                    EntryStatus::Completed => report.credited += 1,
                    EntryStatus::Failed => report.failed += 1,
                    EntryStatus::Pending => report.still_pending += 1,
                },
                Err(e) => {
                    report.errors += 1;
                    report.unsettled.push(reference.clone());
                    tracing::warn!(target: RECONCILIATION_TARGET, "⚠️ Sweep could not settle {}: {}", reference, e);
                }
            }
        }

        if report.checked > 0 {
            tracing::info!(
                target: RECONCILIATION_TARGET,
                "🔁 Sweep: checked={} credited={} failed={} pending={} errors={}",
                report.checked,
                report.credited,
                report.failed,
                report.still_pending,
                report.errors
            );
        }
        Ok(report)
    }

    async fn settle_reservation(&self, entry: LedgerEntry) -> Result<PaymentConfirmation> {
        if entry.status == EntryStatus::Completed {
            let account = self.engine.account(&entry.account_id).await?;
            return Ok(PaymentConfirmation { reference: entry.reference, status: EntryStatus::Completed, account, replayed: true });
        }

        let kind = entry
            .provider
            .ok_or_else(|| LedgerError::Validation(format!("'{}' is not a provider payment", entry.reference)))?;
        let provider = provider_for(&self.registry, kind)?;
        let verification = provider.verify_external_transaction(&entry.reference).await?;

        match verification.status {
            VerificationStatus::Succeeded => {
                let amount = verification.amount.unwrap_or(entry.amount);
                let posting = Posting::credit(&entry.account_id, amount, &entry.description)
                    .with_reference(Some(&entry.reference))
                    .with_provider(kind, entry.channel)
                    .with_metadata(json!({ "verified_at": verification.paid_at }));
                let outcome = self.engine.apply(posting).await?;
                tracing::info!(
                    target: RECONCILIATION_TARGET,
                    "✅ {} payment {} confirmed for {} ({})",
                    kind,
                    entry.reference,
                    entry.account_id,
                    outcome.entry.amount
                );
                Ok(PaymentConfirmation {
                    reference: entry.reference,
                    status: EntryStatus::Completed,
                    account: outcome.account,
                    replayed: outcome.replayed,
                })
            }
            VerificationStatus::Pending => {
                let account = self.engine.account(&entry.account_id).await?;
                Ok(PaymentConfirmation { reference: entry.reference, status: EntryStatus::Pending, account, replayed: false })
            }
            VerificationStatus::Failed(reason) => self.fail_reservation(entry, &reason).await,
            VerificationStatus::NotFound => self.fail_reservation(entry, "not found at provider").await,
        }
    }

    async fn fail_reservation(&self, entry: LedgerEntry, reason: &str) -> Result<PaymentConfirmation> {
        let status = self
            .guard
            .mark_failed(&entry.reference, reason)?
            .map_or(EntryStatus::Failed, |e| e.status);
        let account = self.engine.account(&entry.account_id).await?;
        tracing::warn!(target: RECONCILIATION_TARGET, "⚠️ Payment {} not confirmed: {}", entry.reference, reason);
        Ok(PaymentConfirmation { reference: entry.reference, status, account, replayed: false })
    }
}
