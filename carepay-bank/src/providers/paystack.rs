use std::time::Duration;

use async_trait::async_trait;
use carepay_common::payment::{
    AccountHolder, Checkout, PaymentEvent, PaymentEventKind, PaymentInit, ProviderKind, ProviderVerification,
    VerificationStatus, VirtualAccount,
};
use carepay_common::utils::time::current_time_millis;
use carepay_common::Amount;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::http::{build_client, endpoint, read_json, with_retry, RetryPolicy, DEFAULT_TIMEOUT_SECS};
use super::payload::{first_str, metadata_object};
use super::traits::PaymentProvider;
use crate::error::ProviderError;

pub const PAYSTACK_BASE_URL: &str = "https://api.paystack.co";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaystackConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub secret_key: String,
    /// Bank slug for dedicated accounts (`wema-bank`, `titan-paystack`).
    #[serde(default = "default_preferred_bank")]
    pub preferred_bank: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    PAYSTACK_BASE_URL.to_string()
}

fn default_preferred_bank() -> String {
    "wema-bank".to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for PaystackConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            secret_key: String::new(),
            preferred_bank: default_preferred_bank(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Paystack adapter.
///
/// Amounts on the wire are kobo: initiation multiplies by 100, webhooks and
/// verification responses are divided by 100.
pub struct PaystackProvider {
    config: PaystackConfig,
    client: Client,
    retry: RetryPolicy,
}

impl PaystackProvider {
    pub fn new(config: PaystackConfig) -> Result<Self, ProviderError> {
        if config.secret_key.is_empty() {
            return Err(ProviderError::NotConfigured("paystack secret_key is empty".to_string()));
        }
        let client = build_client(Duration::from_secs(config.timeout_secs))?;
        Ok(Self { config, client, retry: RetryPolicy::default() })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        endpoint(&self.config.base_url, segments)
    }

    async fn get(&self, url: Url) -> Result<Value, ProviderError> {
        let response = self.client.get(url).bearer_auth(&self.config.secret_key).send().await?;
        read_json(response).await
    }

    async fn post(&self, url: Url, body: &Value) -> Result<Value, ProviderError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.secret_key)
            .json(body)
            .send()
            .await?;
        read_json(response).await
    }

    /// Returns the customer code and any dedicated account Paystack already
    /// holds for this email, creating the customer only when none exists.
    async fn find_or_create_customer(&self, holder: &AccountHolder) -> Result<(String, Option<Value>), ProviderError> {
        match self.get(self.url(&["customer", holder.email.as_str()])?).await {
            Ok(body) => {
                let code = first_str(&body, &[&["data", "customer_code"]])
                    .ok_or_else(|| ProviderError::Malformed("customer lookup without customer_code".to_string()))?;
                let dedicated = body["data"]
                    .get("dedicated_account")
                    .filter(|v| v.is_object())
                    .cloned();
                tracing::info!("👤 Reusing Paystack customer {}", code);
                return Ok((code, dedicated));
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let (first_name, last_name) = split_name(&holder.name);
        let body = self
            .post(
                self.url(&["customer"])?,
                &json!({
                    "email": holder.email,
                    "first_name": first_name,
                    "last_name": last_name,
                    "phone": holder.phone,
                }),
            )
            .await?;
        let code = first_str(&body, &[&["data", "customer_code"]])
            .ok_or_else(|| ProviderError::Malformed("customer creation without customer_code".to_string()))?;
        tracing::info!("👤 Created Paystack customer {}", code);
        Ok((code, None))
    }

    async fn create_dedicated_account(&self, customer_code: &str) -> Result<Value, ProviderError> {
        let body = self
            .post(
                self.url(&["dedicated_account"])?,
                &json!({ "customer": customer_code, "preferred_bank": self.config.preferred_bank }),
            )
            .await?;
        Ok(body["data"].clone())
    }

    fn to_virtual_account(patient_id: &str, customer_code: &str, dva: &Value) -> Result<VirtualAccount, ProviderError> {
        let account_number = first_str(dva, &[&["account_number"]])
            .ok_or_else(|| ProviderError::Malformed("dedicated account without account_number".to_string()))?;
        Ok(VirtualAccount {
            patient_id: patient_id.to_string(),
            provider: ProviderKind::Paystack,
            account_number,
            account_name: first_str(dva, &[&["account_name"]]).unwrap_or_default(),
            bank_name: first_str(dva, &[&["bank", "name"]]).unwrap_or_default(),
            bank_code: first_str(dva, &[&["bank", "slug"]]),
            customer_id: Some(customer_code.to_string()),
            provider_reference: first_str(dva, &[&["id"]]),
            created_at: current_time_millis(),
        })
    }
}

#[async_trait]
impl PaymentProvider for PaystackProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Paystack
    }

    fn webhook_secret(&self) -> &str {
        &self.config.secret_key
    }

    async fn create_funding_account(
        &self,
        patient_id: &str,
        holder: &AccountHolder,
        known_customer: Option<&str>,
    ) -> Result<VirtualAccount, ProviderError> {
        // 1. Customer (reuse before create)
        let (customer_code, existing_dva) = match known_customer {
            Some(code) => (code.to_string(), None),
            None => self.find_or_create_customer(holder).await?,
        };

        if let Some(dva) = existing_dva {
            return Self::to_virtual_account(patient_id, &customer_code, &dva);
        }

        // 2. Dedicated account. From here on a failure must carry the customer code.
        let dva = self.create_dedicated_account(&customer_code).await.map_err(|e| {
            tracing::error!("❌ Paystack dedicated account failed for customer {}: {}", customer_code, e);
            ProviderError::PartialFunding { customer_id: customer_code.clone(), message: e.to_string() }
        })?;

        Self::to_virtual_account(patient_id, &customer_code, &dva).map_err(|e| ProviderError::PartialFunding {
            customer_id: customer_code.clone(),
            message: e.to_string(),
        })
    }

    async fn initialize_payment(&self, init: &PaymentInit) -> Result<Checkout, ProviderError> {
        let kobo = init
            .amount
            .to_minor()
            .ok_or_else(|| ProviderError::Malformed(format!("amount {} out of range", init.amount)))?;

        let body = self
            .post(
                self.url(&["transaction", "initialize"])?,
                &json!({
                    "email": init.holder.email,
                    "amount": kobo.to_string(),
                    "currency": init.currency,
                    "reference": init.reference,
                    "callback_url": init.callback_url,
                    "metadata": {
                        "patient_id": init.patient_id,
                        "type": "wallet_funding",
                        "description": init.description,
                    },
                }),
            )
            .await?;

        let checkout_url = first_str(&body, &[&["data", "authorization_url"]])
            .ok_or_else(|| ProviderError::Malformed("initialize without authorization_url".to_string()))?;
        Ok(Checkout {
            checkout_url,
            reference: first_str(&body, &[&["data", "reference"]]).unwrap_or_else(|| init.reference.clone()),
            access_code: first_str(&body, &[&["data", "access_code"]]),
        })
    }

    async fn verify_external_transaction(&self, reference: &str) -> Result<ProviderVerification, ProviderError> {
        let url = self.url(&["transaction", "verify", reference])?;
        let result = with_retry(self.retry, "paystack verify", || self.get(url.clone())).await;

        let body = match result {
            Ok(body) => body,
            Err(e) if e.is_not_found() => {
                return Ok(ProviderVerification {
                    reference: reference.to_string(),
                    status: VerificationStatus::NotFound,
                    amount: None,
                    currency: None,
                    patient_hint: None,
                    paid_at: None,
                    raw: Value::Null,
                })
            }
            Err(e) => return Err(e),
        };

        let data = &body["data"];
        let status = match data["status"].as_str().unwrap_or_default() {
            "success" => VerificationStatus::Succeeded,
            "ongoing" | "pending" | "abandoned" | "processing" | "queued" => VerificationStatus::Pending,
            other => VerificationStatus::Failed(
                first_str(data, &[&["gateway_response"]]).unwrap_or_else(|| other.to_string()),
            ),
        };
        let metadata = metadata_object(data.get("metadata"));

        Ok(ProviderVerification {
            reference: first_str(data, &[&["reference"]]).unwrap_or_else(|| reference.to_string()),
            status,
            amount: kobo_amount(&data["amount"]),
            currency: first_str(data, &[&["currency"]]),
            patient_hint: first_str(&metadata, &[&["patient_id"], &["patientId"]]),
            paid_at: first_str(data, &[&["paid_at"]]),
            raw: body,
        })
    }

    fn parse_webhook(&self, raw: &[u8]) -> Result<PaymentEvent, ProviderError> {
        let body: Value = serde_json::from_slice(raw)?;
        let event = body["event"].as_str().unwrap_or_default().to_string();
        let data = &body["data"];

        let kind = match event.as_str() {
            "charge.success" if data["channel"].as_str() == Some("dedicated_nuban") => PaymentEventKind::TransferSucceeded,
            "charge.success" => PaymentEventKind::PaymentSucceeded,
            // transfer.* events describe payouts leaving the integration.
            _ => PaymentEventKind::Other(event),
        };
        let metadata = metadata_object(data.get("metadata"));

        Ok(PaymentEvent {
            provider: ProviderKind::Paystack,
            kind,
            reference: first_str(data, &[&["reference"]]),
            amount: kobo_amount(&data["amount"]),
            account_number: first_str(
                data,
                &[
                    &["authorization", "receiver_bank_account_number"],
                    &["metadata", "receiver_account_number"],
                    &["metadata", "account_number"],
                ],
            ),
            customer_id: first_str(data, &[&["customer", "customer_code"]]),
            patient_hint: first_str(&metadata, &[&["patient_id"], &["patientId"]]),
            raw: body,
        })
    }
}

/// Kobo (integer or numeric string) to naira.
fn kobo_amount(value: &Value) -> Option<Amount> {
    match value {
        Value::Number(n) => n.as_i64().map(Amount::from_minor),
        Value::String(s) => s.trim().parse::<i64>().ok().map(Amount::from_minor),
        _ => None,
    }
}

fn split_name(name: &str) -> (String, String) {
    let mut parts = name.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let rest = parts.collect::<Vec<_>>().join(" ");
    (first, rest)
}
