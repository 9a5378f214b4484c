use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::money::Amount;

/// External payment processors a wallet can be funded through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Paystack,
    Monnify,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Paystack => "paystack",
            ProviderKind::Monnify => "monnify",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "paystack" => Ok(ProviderKind::Paystack),
            "monnify" | "monify" => Ok(ProviderKind::Monnify),
            other => Err(format!("Unknown payment provider: {}", other)),
        }
    }
}

/// Identity details providers need to open a customer or checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountHolder {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Canonical classification of an inbound notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentEventKind {
    /// Card/checkout payment completed.
    PaymentSucceeded,
    /// Inbound bank transfer into a virtual account.
    TransferSucceeded,
    Other(String),
}

impl PaymentEventKind {
    /// Only these kinds move money into a wallet.
    pub fn is_funds_received(&self) -> bool {
        matches!(self, PaymentEventKind::PaymentSucceeded | PaymentEventKind::TransferSucceeded)
    }
}

/// Provider-neutral view of a webhook payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub provider: ProviderKind,
    pub kind: PaymentEventKind,
    pub reference: Option<String>,
    pub amount: Option<Amount>,
    pub account_number: Option<String>,
    pub customer_id: Option<String>,
    /// Patient id embedded in the payment metadata at initiation time.
    pub patient_hint: Option<String>,
    pub raw: serde_json::Value,
}

/// Provider-issued bank account routed to a patient's wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualAccount {
    pub patient_id: String,
    pub provider: ProviderKind,
    pub account_number: String,
    pub account_name: String,
    pub bank_name: String,
    pub bank_code: Option<String>,
    pub customer_id: Option<String>,
    pub provider_reference: Option<String>,
    pub created_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum VerificationStatus {
    Succeeded,
    Pending,
    Failed(String),
    NotFound,
}

/// Result of a server-to-server status query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderVerification {
    pub reference: String,
    pub status: VerificationStatus,
    pub amount: Option<Amount>,
    pub currency: Option<String>,
    pub patient_hint: Option<String>,
    pub paid_at: Option<String>,
    pub raw: serde_json::Value,
}

impl ProviderVerification {
    pub fn is_success(&self) -> bool {
        self.status == VerificationStatus::Succeeded
    }
}

/// Request to open a hosted checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInit {
    pub patient_id: String,
    pub holder: AccountHolder,
    pub amount: Amount,
    pub currency: String,
    pub reference: String,
    pub description: String,
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkout {
    pub checkout_url: String,
    pub reference: String,
    pub access_code: Option<String>,
}
