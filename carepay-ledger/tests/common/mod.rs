#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use carepay_bank::providers::{PaystackConfig, PaystackProvider};
use carepay_bank::{PaymentProvider, ProviderError, ProviderRegistry, WebhookVerifier};
use carepay_common::payment::{
    AccountHolder, Checkout, PaymentEvent, PaymentInit, ProviderKind, ProviderVerification, VerificationStatus,
    VirtualAccount,
};
use carepay_common::Amount;
use carepay_ledger::Ledger;
use serde_json::{json, Value};
use tempfile::TempDir;

pub const SECRET: &str = "sk_test_secret";

/// Paystack-shaped provider: real signature and payload handling, scripted
/// network calls.
pub struct StubProvider {
    inner: PaystackProvider,
    verifications: Mutex<HashMap<String, Result<ProviderVerification, u16>>>,
    pub verify_calls: AtomicUsize,
    pub fail_account_step: AtomicBool,
    pub known_customers: Mutex<Vec<Option<String>>>,
    pub fail_initialize: AtomicBool,
}

impl StubProvider {
    pub fn new() -> Arc<Self> {
        let inner = PaystackProvider::new(PaystackConfig { secret_key: SECRET.into(), ..Default::default() }).unwrap();
        Arc::new(Self {
            inner,
            verifications: Mutex::new(HashMap::new()),
            verify_calls: AtomicUsize::new(0),
            fail_account_step: AtomicBool::new(false),
            known_customers: Mutex::new(Vec::new()),
            fail_initialize: AtomicBool::new(false),
        })
    }

    pub fn verify_as(&self, reference: &str, status: VerificationStatus, amount: Option<&str>) {
        let verification = ProviderVerification {
            reference: reference.to_string(),
            status,
            amount: amount.map(|a| a.parse().unwrap()),
            currency: Some("NGN".into()),
            patient_hint: None,
            paid_at: None,
            raw: Value::Null,
        };
        self.verifications.lock().unwrap().insert(reference.to_string(), Ok(verification));
    }

    pub fn verify_unavailable(&self, reference: &str) {
        self.verifications.lock().unwrap().insert(reference.to_string(), Err(503));
    }
}

#[async_trait]
impl PaymentProvider for StubProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Paystack
    }

    fn webhook_secret(&self) -> &str {
        self.inner.webhook_secret()
    }

    async fn create_funding_account(
        &self,
        patient_id: &str,
        _holder: &AccountHolder,
        known_customer: Option<&str>,
    ) -> Result<VirtualAccount, ProviderError> {
        self.known_customers.lock().unwrap().push(known_customer.map(str::to_string));
        if self.fail_account_step.load(Ordering::SeqCst) {
            return Err(ProviderError::PartialFunding { customer_id: "CUS_stub".into(), message: "bank down".into() });
        }
        Ok(VirtualAccount {
            patient_id: patient_id.to_string(),
            provider: ProviderKind::Paystack,
            account_number: format!("99{:08}", patient_id.len()),
            account_name: "CAREPAY/TEST".into(),
            bank_name: "Wema Bank".into(),
            bank_code: Some("wema-bank".into()),
            customer_id: Some(known_customer.unwrap_or("CUS_stub").to_string()),
            provider_reference: None,
            created_at: 1,
        })
    }

    async fn initialize_payment(&self, init: &PaymentInit) -> Result<Checkout, ProviderError> {
        if self.fail_initialize.load(Ordering::SeqCst) {
            return Err(ProviderError::Api { status: 400, message: "Invalid amount".into() });
        }
        Ok(Checkout {
            checkout_url: format!("https://checkout.test/{}", init.reference),
            reference: init.reference.clone(),
            access_code: None,
        })
    }

    async fn verify_external_transaction(&self, reference: &str) -> Result<ProviderVerification, ProviderError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        match self.verifications.lock().unwrap().get(reference).cloned() {
            Some(Ok(verification)) => Ok(verification),
            Some(Err(status)) => Err(ProviderError::Api { status, message: "unavailable".into() }),
            None => Ok(ProviderVerification {
                reference: reference.to_string(),
                status: VerificationStatus::NotFound,
                amount: None,
                currency: None,
                patient_hint: None,
                paid_at: None,
                raw: Value::Null,
            }),
        }
    }

    fn parse_webhook(&self, raw: &[u8]) -> Result<PaymentEvent, ProviderError> {
        self.inner.parse_webhook(raw)
    }
}

pub struct Harness {
    pub ledger: Ledger,
    pub provider: Arc<StubProvider>,
    pub registry: ProviderRegistry,
    _dir: TempDir,
}

pub async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Ledger::open(dir.path().to_str().unwrap()).unwrap();
    let provider = StubProvider::new();
    let mut registry = ProviderRegistry::new();
    registry.register(provider.clone()).unwrap();
    Harness { ledger, provider, registry, _dir: dir }
}

pub fn holder(id: &str) -> AccountHolder {
    AccountHolder { name: format!("Patient {}", id), email: format!("{}@example.com", id), phone: None }
}

pub fn naira(value: &str) -> Amount {
    value.parse().unwrap()
}

/// Signed Paystack `charge.success` body.
pub fn charge_success(reference: &str, kobo: i64, patient_id: Option<&str>) -> (Vec<u8>, String) {
    let body = json!({
        "event": "charge.success",
        "data": {
            "reference": reference,
            "amount": kobo,
            "channel": "card",
            "currency": "NGN",
            "metadata": { "patient_id": patient_id },
        }
    });
    sign(&body)
}

/// Signed Paystack dedicated-account transfer body.
pub fn transfer_into(account_number: &str, reference: &str, kobo: i64) -> (Vec<u8>, String) {
    let body = json!({
        "event": "charge.success",
        "data": {
            "reference": reference,
            "amount": kobo,
            "channel": "dedicated_nuban",
            "authorization": { "receiver_bank_account_number": account_number },
        }
    });
    sign(&body)
}

pub fn sign(body: &Value) -> (Vec<u8>, String) {
    let raw = serde_json::to_vec(body).unwrap();
    let signature = WebhookVerifier::sign(ProviderKind::Paystack, &raw, SECRET).unwrap();
    (raw, signature)
}
