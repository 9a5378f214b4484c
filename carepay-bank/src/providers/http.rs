use std::future::Future;
use std::time::Duration;

use reqwest::{Client, Response, Url};
use serde_json::Value;

use crate::error::ProviderError;

pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Builds the shared HTTP client. Every provider call is bounded by `timeout`.
pub fn build_client(timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(5)))
        .user_agent(concat!("carepay/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(ProviderError::from)
}

/// Appends percent-encoded path segments to `base`.
pub fn endpoint(base: &str, segments: &[&str]) -> Result<Url, ProviderError> {
    let mut url = Url::parse(base).map_err(|e| ProviderError::NotConfigured(format!("invalid base url {}: {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| ProviderError::NotConfigured(format!("base url cannot be a base: {}", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Reads a JSON body, turning non-2xx statuses into [`ProviderError::Api`].
///
/// The error message is taken from `message` (Paystack) or
/// `responseMessage` (Monnify) when the body carries one.
pub async fn read_json(response: Response) -> Result<Value, ProviderError> {
    let status = response.status();
    let bytes = response.bytes().await?;
    let body: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

    if !status.is_success() {
        let message = body
            .get("message")
            .or_else(|| body.get("responseMessage"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| String::from_utf8_lossy(&bytes).chars().take(200).collect());
        return Err(ProviderError::Api { status: status.as_u16(), message });
    }

    if body.is_null() {
        return Err(ProviderError::Malformed("empty or non-JSON response body".to_string()));
    }
    Ok(body)
}

/// Backoff policy for idempotent provider reads (verification, token fetch).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_millis(250) }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self { max_attempts: 1, base_delay: Duration::ZERO }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(6))
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// policy runs out of attempts.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!("🔁 {} failed (attempt {}): {}. Retrying in {:?}", label, attempt + 1, e, delay);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
