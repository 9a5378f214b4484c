#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use carepay_bank::WebhookVerifier;
use carepay_common::payment::ProviderKind;
use carepay_common::utils::time::current_time_millis;
use carepay_common::Amount;
use carepay_node::api::rest::build_router;
use carepay_node::runtime::builder::{build_runtime, CarePayRuntime};
use carepay_node::NodeConfig;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

pub const JWT_SECRET: &str = "jwt_test_secret";
pub const PAYSTACK_SECRET: &str = "sk_test_secret";

pub struct TestNode {
    pub router: Router,
    pub runtime: CarePayRuntime,
    _dir: TempDir,
}

/// A node with Paystack enabled against `paystack_url` (defaults to an
/// unroutable address).
pub fn node(reverify_webhooks: bool, paystack_url: Option<String>) -> TestNode {
    let dir = tempfile::tempdir().unwrap();
    let mut config = NodeConfig {
        jwt_secret: JWT_SECRET.into(),
        data_dir: dir.path().join("ledger").to_str().unwrap().to_string(),
        reverify_webhooks,
        sweep_after_secs: 0,
        ..Default::default()
    };
    config.paystack.enabled = true;
    config.paystack.settings.secret_key = PAYSTACK_SECRET.into();
    config.paystack.settings.base_url = paystack_url.unwrap_or_else(|| "http://127.0.0.1:9".into());

    let runtime = build_runtime(config).unwrap();
    let router = build_router(runtime.app_state());
    TestNode { router, runtime, _dir: dir }
}

pub fn token(subject: &str, role: &str) -> String {
    let claims = json!({ "sub": subject, "role": role, "exp": current_time_millis() / 1000 + 3600 });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes())).unwrap()
}

pub fn staff() -> String {
    token("staff-1", "staff")
}

pub fn patient(id: &str) -> String {
    token(id, "patient")
}

impl TestNode {
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
        (status, body)
    }

    pub async fn get(&self, uri: &str, bearer: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(t) = bearer {
            builder = builder.header("authorization", format!("Bearer {}", t));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post(&self, uri: &str, bearer: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("POST").uri(uri).header("content-type", "application/json");
        if let Some(t) = bearer {
            builder = builder.header("authorization", format!("Bearer {}", t));
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap()).await
    }

    pub async fn webhook(&self, raw: Vec<u8>, signature: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("POST").uri("/webhooks/paystack");
        if let Some(sig) = signature {
            builder = builder.header("x-paystack-signature", sig);
        }
        self.send(builder.body(Body::from(raw)).unwrap()).await
    }

    pub async fn open_wallet(&self, patient_id: &str) {
        let (status, _) = self
            .post(
                "/api/staff/wallets",
                Some(&staff()),
                json!({ "patient_id": patient_id, "name": "Ada Obi", "email": format!("{}@example.com", patient_id) }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }
}

pub fn charge_success(reference: &str, kobo: i64, patient_id: &str) -> (Vec<u8>, String) {
    sign(&json!({
        "event": "charge.success",
        "data": {
            "reference": reference,
            "amount": kobo,
            "channel": "card",
            "currency": "NGN",
            "metadata": { "patient_id": patient_id },
        }
    }))
}

pub fn sign(body: &Value) -> (Vec<u8>, String) {
    let raw = serde_json::to_vec(body).unwrap();
    let signature = WebhookVerifier::sign(ProviderKind::Paystack, &raw, PAYSTACK_SECRET).unwrap();
    (raw, signature)
}

pub fn amount(value: &Value) -> Amount {
    match value {
        Value::String(s) => s.parse().unwrap(),
        other => other.to_string().parse().unwrap(),
    }
}

pub fn naira(s: &str) -> Amount {
    s.parse().unwrap()
}
