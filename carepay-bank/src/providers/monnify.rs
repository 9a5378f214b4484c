use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use carepay_common::payment::{
    AccountHolder, Checkout, PaymentEvent, PaymentEventKind, PaymentInit, ProviderKind, ProviderVerification,
    VerificationStatus, VirtualAccount,
};
use carepay_common::utils::time::current_time_millis;
use carepay_common::Amount;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::{json, Value};

use super::http::{build_client, endpoint, read_json, with_retry, RetryPolicy, DEFAULT_TIMEOUT_SECS};
use super::payload::{decimal_at, first_str};
use super::token_cache::TokenCache;
use super::traits::PaymentProvider;
use crate::error::ProviderError;

pub const MONNIFY_BASE_URL: &str = "https://sandbox.monnify.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonnifyConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub contract_code: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    MONNIFY_BASE_URL.to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for MonnifyConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            secret_key: String::new(),
            contract_code: String::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Monnify adapter.
///
/// Monnify amounts are naira on every endpoint. Requests carry a bearer
/// token from `/api/v1/auth/login`, cached in a [`TokenCache`].
pub struct MonnifyProvider {
    config: MonnifyConfig,
    client: Client,
    retry: RetryPolicy,
    token: TokenCache,
}

impl MonnifyProvider {
    pub fn new(config: MonnifyConfig) -> Result<Self, ProviderError> {
        if config.api_key.is_empty() || config.secret_key.is_empty() || config.contract_code.is_empty() {
            return Err(ProviderError::NotConfigured(
                "monnify api_key, secret_key and contract_code are required".to_string(),
            ));
        }
        let client = build_client(Duration::from_secs(config.timeout_secs))?;
        Ok(Self { config, client, retry: RetryPolicy::default(), token: TokenCache::new() })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn account_reference(patient_id: &str) -> String {
        format!("PAT-{}", patient_id)
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        endpoint(&self.config.base_url, segments)
    }

    async fn login(&self) -> Result<(String, Duration), ProviderError> {
        let basic = STANDARD.encode(format!("{}:{}", self.config.api_key, self.config.secret_key));
        let response = self
            .client
            .post(self.url(&["api", "v1", "auth", "login"])?)
            .header(reqwest::header::AUTHORIZATION, format!("Basic {}", basic))
            .json(&json!({}))
            .send()
            .await?;
        let body = expect_successful(read_json(response).await?)?;

        let token = first_str(&body, &[&["responseBody", "accessToken"]])
            .ok_or_else(|| ProviderError::Malformed("login without accessToken".to_string()))?;
        let expires_in = body["responseBody"]["expiresIn"].as_u64().unwrap_or(300);
        Ok((token, TokenCache::ttl_for(expires_in)))
    }

    async fn bearer(&self) -> Result<String, ProviderError> {
        self.token
            .get_or_refresh(|| with_retry(self.retry, "monnify login", || self.login()))
            .await
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, ProviderError> {
        let token = self.bearer().await?;
        let response = request.bearer_auth(token).send().await?;
        let result = read_json(response).await;
        if let Err(ProviderError::Api { status: 401, .. }) = &result {
            self.token.invalidate().await;
        }
        expect_successful(result?)
    }

    async fn fetch_reserved_account(&self, account_reference: &str) -> Result<Value, ProviderError> {
        let url = self.url(&["api", "v2", "bank-transfer", "reserved-accounts", account_reference])?;
        let body = with_retry(self.retry, "monnify reserved account lookup", || self.send(self.client.get(url.clone()))).await?;
        Ok(body["responseBody"].clone())
    }

    fn to_virtual_account(patient_id: &str, reserved: &Value) -> Result<VirtualAccount, ProviderError> {
        let first_account = reserved["accounts"].as_array().and_then(|a| a.first()).cloned().unwrap_or(Value::Null);
        let account_number = first_str(&first_account, &[&["accountNumber"]])
            .or_else(|| first_str(reserved, &[&["accountNumber"]]))
            .ok_or_else(|| ProviderError::Malformed("reserved account without accountNumber".to_string()))?;

        Ok(VirtualAccount {
            patient_id: patient_id.to_string(),
            provider: ProviderKind::Monnify,
            account_number,
            account_name: first_str(&first_account, &[&["accountName"]])
                .or_else(|| first_str(reserved, &[&["accountName"]]))
                .unwrap_or_default(),
            bank_name: first_str(&first_account, &[&["bankName"]])
                .or_else(|| first_str(reserved, &[&["bankName"]]))
                .unwrap_or_default(),
            bank_code: first_str(&first_account, &[&["bankCode"]]).or_else(|| first_str(reserved, &[&["bankCode"]])),
            // Reserved-account webhooks identify the owner by accountReference.
            customer_id: first_str(reserved, &[&["accountReference"]]),
            provider_reference: first_str(reserved, &[&["reservationReference"]]),
            created_at: current_time_millis(),
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InitTransaction<'a> {
    amount: Box<RawValue>,
    customer_name: &'a str,
    customer_email: &'a str,
    payment_reference: &'a str,
    payment_description: &'a str,
    currency_code: &'a str,
    contract_code: &'a str,
    redirect_url: Option<&'a str>,
    meta_data: Value,
}

/// The amount as a bare JSON number with its two decimal places intact.
fn decimal_number(amount: Amount) -> Result<Box<RawValue>, ProviderError> {
    RawValue::from_string(amount.as_decimal().to_string())
        .map_err(|e| ProviderError::Malformed(format!("amount {} is not a JSON number: {}", amount, e)))
}

#[async_trait]
impl PaymentProvider for MonnifyProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Monnify
    }

    fn webhook_secret(&self) -> &str {
        &self.config.secret_key
    }

    async fn create_funding_account(
        &self,
        patient_id: &str,
        holder: &AccountHolder,
        _known_customer: Option<&str>,
    ) -> Result<VirtualAccount, ProviderError> {
        let account_reference = Self::account_reference(patient_id);
        let request = self.client.post(self.url(&["api", "v2", "bank-transfer", "reserved-accounts"])?).json(&json!({
            "accountReference": account_reference,
            "accountName": holder.name,
            "currencyCode": "NGN",
            "contractCode": self.config.contract_code,
            "customerEmail": holder.email,
            "customerName": holder.name,
            "getAllAvailableBanks": true,
        }));

        match self.send(request).await {
            Ok(body) => Self::to_virtual_account(patient_id, &body["responseBody"]),
            Err(create_err) => {
                // A timed-out or duplicate reservation may already exist upstream.
                tracing::warn!("⚠️ Monnify reservation for {} failed ({}), checking for an existing one", account_reference, create_err);
                match self.fetch_reserved_account(&account_reference).await {
                    Ok(existing) => Self::to_virtual_account(patient_id, &existing),
                    Err(_) => Err(create_err),
                }
            }
        }
    }

    async fn initialize_payment(&self, init: &PaymentInit) -> Result<Checkout, ProviderError> {
        let payload = InitTransaction {
            amount: decimal_number(init.amount)?,
            customer_name: &init.holder.name,
            customer_email: &init.holder.email,
            payment_reference: &init.reference,
            payment_description: &init.description,
            currency_code: &init.currency,
            contract_code: &self.config.contract_code,
            redirect_url: init.callback_url.as_deref(),
            meta_data: json!({ "patientId": init.patient_id }),
        };

        let request = self
            .client
            .post(self.url(&["api", "v1", "merchant", "transactions", "init-transaction"])?)
            .json(&payload);
        let body = self.send(request).await?;

        let checkout_url = first_str(&body, &[&["responseBody", "checkoutUrl"]])
            .ok_or_else(|| ProviderError::Malformed("init-transaction without checkoutUrl".to_string()))?;
        Ok(Checkout {
            checkout_url,
            reference: first_str(&body, &[&["responseBody", "paymentReference"]]).unwrap_or_else(|| init.reference.clone()),
            access_code: first_str(&body, &[&["responseBody", "transactionReference"]]),
        })
    }

    async fn verify_external_transaction(&self, reference: &str) -> Result<ProviderVerification, ProviderError> {
        let mut url = self.url(&["api", "v2", "merchant", "transactions", "query"])?;
        url.query_pairs_mut().append_pair("paymentReference", reference);

        let body = match with_retry(self.retry, "monnify verify", || self.send(self.client.get(url.clone()))).await {
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

        let data = &body["responseBody"];
        let status = match data["paymentStatus"].as_str().unwrap_or_default() {
            "PAID" | "OVERPAID" => VerificationStatus::Succeeded,
            "PENDING" => VerificationStatus::Pending,
            other => VerificationStatus::Failed(other.to_string()),
        };

        Ok(ProviderVerification {
            reference: first_str(data, &[&["paymentReference"]]).unwrap_or_else(|| reference.to_string()),
            status,
            amount: decimal_at(data, &["amountPaid"]).or_else(|| decimal_at(data, &["amount"])).map(Amount::new),
            currency: first_str(data, &[&["currencyCode"], &["currency"]]),
            patient_hint: first_str(data, &[&["metaData", "patientId"], &["metaData", "patient_id"]]),
            paid_at: first_str(data, &[&["paidOn"], &["completedOn"]]),
            raw: body,
        })
    }

    fn parse_webhook(&self, raw: &[u8]) -> Result<PaymentEvent, ProviderError> {
        let body: Value = serde_json::from_slice(raw)?;
        let event_type = body["eventType"].as_str().unwrap_or_default().to_string();
        let data = body.get("eventData").unwrap_or(&body);

        let paid = matches!(data["paymentStatus"].as_str(), Some("PAID") | Some("OVERPAID"));
        let reserved = data["product"]["type"].as_str() == Some("RESERVED_ACCOUNT");
        let kind = match event_type.as_str() {
            "SUCCESSFUL_TRANSACTION" if paid && reserved => PaymentEventKind::TransferSucceeded,
            "SUCCESSFUL_TRANSACTION" if paid => PaymentEventKind::PaymentSucceeded,
            _ => PaymentEventKind::Other(event_type),
        };

        Ok(PaymentEvent {
            provider: ProviderKind::Monnify,
            kind,
            reference: first_str(data, &[&["paymentReference"], &["transactionReference"]]),
            amount: decimal_at(data, &["amountPaid"]).or_else(|| decimal_at(data, &["totalPayable"])).map(Amount::new),
            account_number: first_str(data, &[&["destinationAccountInformation", "accountNumber"]]),
            customer_id: if reserved { first_str(data, &[&["product", "reference"]]) } else { None },
            patient_hint: first_str(data, &[&["metaData", "patientId"], &["metaData", "patient_id"]]),
            raw: body.clone(),
        })
    }
}

/// Monnify wraps every response in `{requestSuccessful, responseMessage, responseBody}`.
fn expect_successful(body: Value) -> Result<Value, ProviderError> {
    if body["requestSuccessful"].as_bool() == Some(false) {
        let message = first_str(&body, &[&["responseMessage"]]).unwrap_or_else(|| "request unsuccessful".to_string());
        let status = if message.to_ascii_lowercase().contains("not found") { 404 } else { 400 };
        return Err(ProviderError::Api { status, message });
    }
    Ok(body)
}
