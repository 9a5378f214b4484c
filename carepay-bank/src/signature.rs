use carepay_common::payment::ProviderKind;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;

type HmacSha512 = Hmac<Sha512>;

pub const PAYSTACK_SIGNATURE_HEADER: &str = "x-paystack-signature";
pub const MONNIFY_SIGNATURE_HEADER: &str = "monnify-signature";
/// Older Monnify integrations send the prefixed variant.
pub const MONNIFY_SIGNATURE_HEADER_ALT: &str = "x-monnify-signature";

/// Authenticates inbound provider notifications.
///
/// - Paystack: `hex(HMAC-SHA512(secret, body))`
/// - Monnify: `hex(SHA-512(secret || body))`
///
/// Both digests are computed over the exact bytes received. Any missing,
/// empty or non-hex header fails verification.
pub struct WebhookVerifier;

impl WebhookVerifier {
    pub fn signature_headers(provider: ProviderKind) -> &'static [&'static str] {
        match provider {
            ProviderKind::Paystack => &[PAYSTACK_SIGNATURE_HEADER],
            ProviderKind::Monnify => &[MONNIFY_SIGNATURE_HEADER, MONNIFY_SIGNATURE_HEADER_ALT],
        }
    }

    pub fn verify(provider: ProviderKind, raw_body: &[u8], signature: Option<&str>, secret: &str) -> bool {
        let Some(signature) = signature.map(str::trim).filter(|s| !s.is_empty()) else {
            tracing::warn!("⚠️ Missing {} webhook signature", provider);
            return false;
        };
        if secret.is_empty() {
            tracing::error!("❌ No webhook secret configured for {}", provider);
            return false;
        }

        let provided = match hex::decode(signature) {
            Ok(bytes) => bytes,
            Err(_) => {
                tracing::warn!("⚠️ Malformed {} webhook signature", provider);
                return false;
            }
        };

        let Some(expected) = Self::digest(provider, raw_body, secret) else {
            return false;
        };

        provided.len() == expected.len() && bool::from(provided.ct_eq(&expected))
    }

    /// Produces the hex signature a provider would attach to `raw_body`.
    pub fn sign(provider: ProviderKind, raw_body: &[u8], secret: &str) -> Option<String> {
        Self::digest(provider, raw_body, secret).map(hex::encode)
    }

    fn digest(provider: ProviderKind, raw_body: &[u8], secret: &str) -> Option<Vec<u8>> {
        match provider {
            ProviderKind::Paystack => {
                let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).ok()?;
                mac.update(raw_body);
                Some(mac.finalize().into_bytes().to_vec())
            }
            ProviderKind::Monnify => {
                let mut hasher = Sha512::new();
                hasher.update(secret.as_bytes());
                hasher.update(raw_body);
                Some(hasher.finalize().to_vec())
            }
        }
    }
}
