use carepay_common::CarePayError;
use thiserror::Error;

/// Failures talking to an external payment provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network-level failure (connect, timeout, TLS, body read).
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider answered with a non-success status or a negative envelope.
    #[error("Provider rejected request ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed provider response: {0}")]
    Malformed(String),

    /// The provider customer exists but the account step failed.
    /// Retrying with `customer_id` avoids creating a second customer.
    #[error("Customer {customer_id} created but funding account step failed: {message}")]
    PartialFunding { customer_id: String, message: String },

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            ProviderError::Api { status, .. } => *status >= 500 || *status == 429,
            ProviderError::PartialFunding { .. } => true,
            ProviderError::Malformed(_) | ProviderError::NotConfigured(_) => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            ProviderError::Api { status, message } => {
                *status == 404 || (*status == 400 && message.to_ascii_lowercase().contains("not found"))
            }
            _ => false,
        }
    }
}

impl From<ProviderError> for CarePayError {
    fn from(err: ProviderError) -> Self {
        let retryable = err.is_retryable();
        CarePayError::Provider { message: err.to_string(), retryable }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Malformed(err.to_string())
    }
}
