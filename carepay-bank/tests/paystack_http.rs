use std::time::Duration;

use carepay_bank::providers::http::RetryPolicy;
use carepay_bank::providers::{PaystackConfig, PaystackProvider};
use carepay_bank::{PaymentProvider, ProviderError};
use carepay_common::payment::{AccountHolder, PaymentInit, VerificationStatus};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer) -> PaystackProvider {
    PaystackProvider::new(PaystackConfig {
        base_url: server.uri(),
        secret_key: "sk_test_123".into(),
        ..Default::default()
    })
    .unwrap()
    .with_retry_policy(RetryPolicy { max_attempts: 3, base_delay: Duration::from_millis(1) })
}

fn holder() -> AccountHolder {
    AccountHolder { name: "Ada Obi".into(), email: "ada@example.com".into(), phone: Some("08030000000".into()) }
}

#[tokio::test]
async fn test_verify_success_converts_kobo() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/transaction/verify/PAY-1"))
        .and(header("authorization", "Bearer sk_test_123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "data": {
                "status": "success",
                "reference": "PAY-1",
                "amount": 500000,
                "currency": "NGN",
                "paid_at": "2024-01-01T10:00:00.000Z",
                "metadata": { "patient_id": "p-1" }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let verification = provider(&server).verify_external_transaction("PAY-1").await.unwrap();
    assert!(verification.is_success());
    assert_eq!(verification.amount, Some("5000.00".parse().unwrap()));
    assert_eq!(verification.patient_hint.as_deref(), Some("p-1"));
}

#[tokio::test]
async fn test_verify_unknown_reference_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/transaction/verify/NOPE"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "status": false,
            "message": "Transaction reference not found"
        })))
        .mount(&server)
        .await;

    let verification = provider(&server).verify_external_transaction("NOPE").await.unwrap();
    assert_eq!(verification.status, VerificationStatus::NotFound);
}

#[tokio::test]
async fn test_verify_retries_transient_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/transaction/verify/PAY-2"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/transaction/verify/PAY-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "data": { "status": "failed", "reference": "PAY-2", "amount": 1000, "gateway_response": "Declined" }
        })))
        .mount(&server)
        .await;

    let verification = provider(&server).verify_external_transaction("PAY-2").await.unwrap();
    assert_eq!(verification.status, VerificationStatus::Failed("Declined".into()));
}

#[tokio::test]
async fn test_abandoned_checkout_is_still_pending() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/transaction/verify/PAY-3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "data": { "status": "abandoned", "reference": "PAY-3", "amount": 1000, "gateway_response": "The transaction was not completed" }
        })))
        .mount(&server)
        .await;

    let verification = provider(&server).verify_external_transaction("PAY-3").await.unwrap();
    assert_eq!(verification.status, VerificationStatus::Pending);
}

#[tokio::test]
async fn test_partial_funding_then_retry_reuses_customer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/customer/ada@example.com"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "status": false, "message": "Customer not found" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/customer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "data": { "customer_code": "CUS_ada" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/dedicated_account"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "status": false, "message": "Bank unavailable" })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/dedicated_account"))
        .and(body_partial_json(json!({ "customer": "CUS_ada", "preferred_bank": "wema-bank" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "data": {
                "id": 77,
                "account_number": "9930000001",
                "account_name": "CAREPAY/ADA OBI",
                "bank": { "name": "Wema Bank", "slug": "wema-bank" }
            }
        })))
        .mount(&server)
        .await;

    let paystack = provider(&server);
    let err = paystack.create_funding_account("p-1", &holder(), None).await.unwrap_err();
    let customer_id = match err {
        ProviderError::PartialFunding { customer_id, .. } => customer_id,
        other => panic!("expected partial funding, got {other:?}"),
    };
    assert_eq!(customer_id, "CUS_ada");

    let account = paystack.create_funding_account("p-1", &holder(), Some(&customer_id)).await.unwrap();
    assert_eq!(account.account_number, "9930000001");
    assert_eq!(account.customer_id.as_deref(), Some("CUS_ada"));
    assert_eq!(account.bank_name, "Wema Bank");
}

#[tokio::test]
async fn test_existing_customer_with_account_is_reused() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/customer/ada@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "data": {
                "customer_code": "CUS_ada",
                "dedicated_account": {
                    "account_number": "9930000002",
                    "account_name": "CAREPAY/ADA OBI",
                    "bank": { "name": "Wema Bank", "slug": "wema-bank" }
                }
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/customer"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let account = provider(&server).create_funding_account("p-1", &holder(), None).await.unwrap();
    assert_eq!(account.account_number, "9930000002");
}

#[tokio::test]
async fn test_initialize_sends_kobo() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transaction/initialize"))
        .and(body_partial_json(json!({
            "amount": "500000",
            "reference": "WAL-p-1-1",
            "metadata": { "patient_id": "p-1" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "data": {
                "authorization_url": "https://checkout.paystack.com/abc",
                "access_code": "abc",
                "reference": "WAL-p-1-1"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let checkout = provider(&server)
        .initialize_payment(&PaymentInit {
            patient_id: "p-1".into(),
            holder: holder(),
            amount: "5000".parse().unwrap(),
            currency: "NGN".into(),
            reference: "WAL-p-1-1".into(),
            description: "Wallet funding".into(),
            callback_url: None,
        })
        .await
        .unwrap();

    assert_eq!(checkout.checkout_url, "https://checkout.paystack.com/abc");
    assert_eq!(checkout.access_code.as_deref(), Some("abc"));
}
