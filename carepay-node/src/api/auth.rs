use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::rest::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    #[serde(alias = "admin", alias = "doctor", alias = "nurse", alias = "pharmacist")]
    Staff,
}

/// Claims minted by the hospital's auth service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(alias = "id")]
    pub sub: String,
    pub role: Role,
    pub exp: u64,
}

/// Validates HS256 bearer tokens. Tokens are issued elsewhere.
pub struct JwtAuth {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAuth {
    pub fn new(secret: &str) -> Self {
        Self { key: DecodingKey::from_secret(secret.as_bytes()), validation: Validation::new(Algorithm::HS256) }
    }

    pub fn authenticate(&self, token: &str) -> Result<AuthenticatedCaller, ApiError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            tracing::debug!("Rejected bearer token: {}", e);
            ApiError::unauthorized("invalid or expired token")
        })?;
        if data.claims.sub.is_empty() {
            return Err(ApiError::unauthorized("token has no subject"));
        }
        Ok(AuthenticatedCaller { subject: data.claims.sub, role: data.claims.role })
    }
}

/// The caller behind a validated bearer token. For patients the subject is
/// their patient id and therefore their wallet id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedCaller {
    pub subject: String,
    pub role: Role,
}

impl AuthenticatedCaller {
    pub fn is_staff(&self) -> bool {
        self.role == Role::Staff
    }

    pub fn require_staff(&self) -> Result<(), ApiError> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(ApiError::forbidden("staff role required"))
        }
    }

    /// The wallet a patient may act on. Staff have no wallet of their own.
    pub fn wallet_id(&self) -> Result<&str, ApiError> {
        match self.role {
            Role::Patient => Ok(&self.subject),
            Role::Staff => Err(ApiError::forbidden("patient role required")),
        }
    }
}

impl FromRequestParts<AppState> for AuthenticatedCaller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("no token provided"))?;

        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ApiError::unauthorized("no token provided"))?;

        state.auth.authenticate(token)
    }
}
