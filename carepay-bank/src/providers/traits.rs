use async_trait::async_trait;
use carepay_common::payment::{
    AccountHolder, Checkout, PaymentEvent, PaymentInit, ProviderKind, ProviderVerification, VirtualAccount,
};

use crate::error::ProviderError;
use crate::signature::WebhookVerifier;

/// Common interface of the external payment processors.
///
/// Adapters translate provider payloads into the provider-neutral types in
/// `carepay_common::payment`; they never touch wallet balances.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Secret used to authenticate this provider's webhooks.
    fn webhook_secret(&self) -> &str;

    /// Opens (or re-fetches) the provider bank account routed to a patient.
    ///
    /// `known_customer` is a customer id left over from an earlier partial
    /// failure; adapters that have a separate customer step reuse it.
    async fn create_funding_account(
        &self,
        patient_id: &str,
        holder: &AccountHolder,
        known_customer: Option<&str>,
    ) -> Result<VirtualAccount, ProviderError>;

    /// Opens a hosted checkout. Not retried: the caller decides.
    async fn initialize_payment(&self, init: &PaymentInit) -> Result<Checkout, ProviderError>;

    /// Server-to-server status query for a payment reference.
    async fn verify_external_transaction(&self, reference: &str) -> Result<ProviderVerification, ProviderError>;

    /// Normalizes a raw webhook body into a [`PaymentEvent`].
    fn parse_webhook(&self, raw: &[u8]) -> Result<PaymentEvent, ProviderError>;

    fn verify_webhook(&self, raw: &[u8], signature: Option<&str>) -> bool {
        WebhookVerifier::verify(self.kind(), raw, signature, self.webhook_secret())
    }
}
