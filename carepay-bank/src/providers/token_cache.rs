use std::future::Future;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};

use crate::error::ProviderError;

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Short-lived provider auth token shared across requests.
///
/// Reads take the `RwLock` fast path. A refresh holds `refresh_gate` for the
/// whole login call, so concurrent callers that find the token expired wait
/// for the single in-flight fetch instead of logging in again.
#[derive(Debug, Default)]
pub struct TokenCache {
    slot: RwLock<Option<CachedToken>>,
    refresh_gate: Mutex<()>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lifetime to cache a token for, given the provider's `expiresIn`:
    /// thirty seconds of headroom, never less than one minute.
    pub fn ttl_for(expires_in_secs: u64) -> Duration {
        Duration::from_secs(expires_in_secs.saturating_sub(30).max(60))
    }

    pub async fn get_or_refresh<F, Fut>(&self, fetch: F) -> Result<String, ProviderError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(String, Duration), ProviderError>>,
    {
        if let Some(token) = self.fresh().await {
            return Ok(token);
        }

        let _gate = self.refresh_gate.lock().await;
        // Another caller may have refreshed while we waited on the gate.
        if let Some(token) = self.fresh().await {
            return Ok(token);
        }

        let (value, ttl) = fetch().await?;
        *self.slot.write().await = Some(CachedToken { value: value.clone(), expires_at: Instant::now() + ttl });
        tracing::debug!("🔑 Provider token refreshed (ttl {:?})", ttl);
        Ok(value)
    }

    /// Drops the cached token, e.g. after the provider answered 401.
    pub async fn invalidate(&self) {
        *self.slot.write().await = None;
    }

    async fn fresh(&self) -> Option<String> {
        let slot = self.slot.read().await;
        slot.as_ref()
            .filter(|t| t.expires_at > Instant::now())
            .map(|t| t.value.clone())
    }
}
