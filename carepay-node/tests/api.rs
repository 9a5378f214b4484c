mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::json;

#[tokio::test]
async fn test_health_lists_enabled_providers() {
    let node = node(false, None);
    let (status, body) = node.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["providers"], json!(["paystack"]));
}

#[tokio::test]
async fn test_wallet_routes_require_a_valid_token() {
    let node = node(false, None);

    let (status, _) = node.get("/api/wallet/balance", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = node.get("/api/wallet/balance", Some("not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_staff_routes_reject_patient_tokens() {
    let node = node(false, None);
    node.open_wallet("p-1").await;

    let (status, _) = node.get("/api/staff/wallets/p-1", Some(&patient("p-1"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = node
        .post("/api/staff/wallets/p-1/debit", Some(&patient("p-1")), json!({ "amount": 10, "description": "x" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = node.get("/api/staff/wallets/p-1", Some(&staff())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["account"]["patient_id"], "p-1");
    assert_eq!(body["virtual_accounts"], json!([]));
}

#[tokio::test]
async fn test_webhook_credits_once_and_balance_is_scoped_to_caller() {
    let node = node(false, None);
    node.open_wallet("p-1").await;
    node.open_wallet("p-2").await;

    let (raw, signature) = charge_success("PAY-1", 500_000, "p-1");
    let (status, body) = node.webhook(raw.clone(), Some(&signature)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "credited");
    assert_eq!(body["replayed"], false);

    let (status, body) = node.webhook(raw, Some(&signature)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["replayed"], true);

    let (_, body) = node.get("/api/wallet/balance", Some(&patient("p-1"))).await;
    assert_eq!(body["patient_id"], "p-1");
    assert_eq!(amount(&body["balance"]), naira("5000"));

    let (_, body) = node.get("/api/wallet/balance", Some(&patient("p-2"))).await;
    assert_eq!(body["patient_id"], "p-2");
    assert_eq!(amount(&body["balance"]), naira("0"));

    // Staff have no wallet of their own.
    let (status, _) = node.get("/api/wallet/balance", Some(&staff())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_webhook_acknowledgement_rules() {
    let node = node(false, None);
    node.open_wallet("p-1").await;

    let (raw, _) = charge_success("PAY-1", 100_000, "p-1");
    let (status, body) = node.webhook(raw.clone(), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["state"], "rejected");

    let (status, _) = node.webhook(raw, Some("deadbeef")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (raw, signature) = sign(&json!({ "event": "transfer.success", "data": { "reference": "TRF-9", "amount": 100 } }));
    let (status, body) = node.webhook(raw, Some(&signature)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "ignored");

    let (raw, signature) = charge_success("PAY-2", 100_000, "ghost");
    let (status, body) = node.webhook(raw, Some(&signature)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "unresolved");

    let (_, body) = node.get("/api/wallet/balance", Some(&patient("p-1"))).await;
    assert_eq!(amount(&body["balance"]), naira("0"));
}

#[tokio::test]
async fn test_monnify_webhook_rejected_when_disabled() {
    let node = node(false, None);
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/webhooks/monnify")
        .header("monnify-signature", "abc")
        .body(axum::body::Body::from("{}"))
        .unwrap();
    let (status, _) = node.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_staff_debit_is_idempotent_and_guarded() {
    let node = node(false, None);
    node.open_wallet("p-1").await;
    node.open_wallet("p-2").await;
    for (reference, patient_id) in [("PAY-1", "p-1"), ("PAY-2", "p-2")] {
        let (raw, signature) = charge_success(reference, 500_000, patient_id);
        node.webhook(raw, Some(&signature)).await;
    }

    let debit = json!({ "amount": "1000", "description": "Consultation", "idempotency_key": "INV-1" });
    let (status, body) = node.post("/api/staff/wallets/p-1/debit", Some(&staff()), debit.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(amount(&body["balance"]), naira("4000"));

    let (status, body) = node.post("/api/staff/wallets/p-1/debit", Some(&staff()), debit.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(amount(&body["balance"]), naira("4000"));

    let (status, _) = node.post("/api/staff/wallets/p-2/debit", Some(&staff()), debit).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = node
        .post("/api/staff/wallets/p-1/debit", Some(&staff()), json!({ "amount": 99999, "description": "Surgery" }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(amount(&body["available"]), naira("4000"));

    let (status, _) = node
        .post("/api/staff/wallets/p-1/debit", Some(&staff()), json!({ "amount": -5, "description": "x" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = node
        .post("/api/staff/wallets/ghost/debit", Some(&staff()), json!({ "amount": 5, "description": "x" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_transfer_history_and_recalculate() {
    let node = node(false, None);
    node.open_wallet("p-1").await;
    node.open_wallet("p-2").await;
    let (raw, signature) = charge_success("PAY-1", 500_000, "p-1");
    node.webhook(raw, Some(&signature)).await;

    let (status, body) = node
        .post("/api/staff/wallets/transfer", Some(&staff()), json!({ "from": "p-1", "to": "p-2", "amount": 1250.5 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(amount(&body["from"]["balance"]), naira("3749.50"));
    assert_eq!(amount(&body["to"]["balance"]), naira("1250.50"));

    let (status, _) = node
        .post("/api/staff/wallets/transfer", Some(&staff()), json!({ "from": "p-1", "to": "p-1", "amount": 1 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = node.get("/api/wallet/transactions?limit=1", Some(&patient("p-1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["pages"], 2);
    assert_eq!(body["transactions"].as_array().unwrap().len(), 1);
    assert_eq!(body["transactions"][0]["direction"], "debit");

    let (_, body) = node.get("/api/wallet/transactions?type=credit", Some(&patient("p-1"))).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["transactions"][0]["reference"], "PAY-1");

    let (status, body) = node.post("/api/staff/wallets/p-1/recalculate", Some(&staff()), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(amount(&body["balance"]), naira("3749.50"));
}

#[tokio::test]
async fn test_verify_funding_is_owner_only() {
    let node = node(false, None);
    node.open_wallet("p-1").await;
    node.open_wallet("p-2").await;
    let (raw, signature) = charge_success("PAY-1", 200_000, "p-1");
    node.webhook(raw, Some(&signature)).await;

    let (status, _) = node.get("/api/wallet/fund/PAY-1/verify", Some(&patient("p-2"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = node.get("/api/wallet/fund/NOPE/verify", Some(&patient("p-1"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = node.get("/api/wallet/fund/PAY-1/verify", Some(&patient("p-1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["replayed"], true);
    assert_eq!(amount(&body["account"]["balance"]), naira("2000"));
}

#[tokio::test]
async fn test_open_wallet_is_idempotent() {
    let node = node(false, None);
    node.open_wallet("p-1").await;
    node.open_wallet("p-1").await;

    let (status, _) = node
        .post("/api/staff/wallets", Some(&staff()), json!({ "patient_id": "bad:id", "name": "X", "email": "x@example.com" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
