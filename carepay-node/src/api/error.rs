use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use carepay_common::CarePayError;
use carepay_ledger::LedgerError;
use serde_json::json;

/// HTTP face of [`CarePayError`].
#[derive(Debug)]
pub struct ApiError(pub CarePayError);

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        ApiError(CarePayError::Unauthorized(msg.into()))
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        ApiError(CarePayError::Forbidden(msg.into()))
    }

    pub fn status(&self) -> StatusCode {
        match &self.0 {
            CarePayError::Validation(_) | CarePayError::Serialization(_) => StatusCode::BAD_REQUEST,
            CarePayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            CarePayError::Forbidden(_) => StatusCode::FORBIDDEN,
            CarePayError::NotFound(_) => StatusCode::NOT_FOUND,
            CarePayError::Conflict(_) => StatusCode::CONFLICT,
            CarePayError::InsufficientFunds { .. } | CarePayError::ReconciliationGap(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            CarePayError::Provider { .. } => StatusCode::BAD_GATEWAY,
            CarePayError::Storage(_) | CarePayError::Config(_) | CarePayError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<CarePayError> for ApiError {
    fn from(e: CarePayError) -> Self {
        ApiError(e)
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        ApiError(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("❌ Internal error: {}", self.0);
            "Internal server error".to_string()
        } else {
            self.0.to_string()
        };

        let mut body = json!({ "success": false, "error": message });
        if let CarePayError::InsufficientFunds { available, requested } = &self.0 {
            body["available"] = json!(available);
            body["requested"] = json!(requested);
        }
        (status, Json(body)).into_response()
    }
}
