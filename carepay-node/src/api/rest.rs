use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use carepay_bank::{ProviderRegistry, WebhookVerifier};
use carepay_common::payment::{AccountHolder, ProviderKind, VirtualAccount};
use carepay_common::Amount;
use carepay_ledger::core::funding::{FundingCheckout, FundingService};
use carepay_ledger::core::ledger::transaction_engine::{HistoryPage, HistoryQuery, TransferReceipt};
use carepay_ledger::core::reconciliation::state::PaymentConfirmation;
use carepay_ledger::core::reconciliation::Reconciler;
use carepay_ledger::{Account, Ledger};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::auth::{AuthenticatedCaller, JwtAuth};
use super::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Ledger,
    pub registry: ProviderRegistry,
    pub reconciler: Arc<Reconciler>,
    pub funding: Arc<FundingService>,
    pub auth: Arc<JwtAuth>,
    pub currency: String,
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    providers: Vec<ProviderKind>,
}

#[derive(Deserialize)]
struct FundRequest {
    amount: Amount,
    provider: ProviderKind,
    callback_url: Option<String>,
}

#[derive(Serialize)]
struct BalanceResponse {
    patient_id: String,
    balance: Amount,
    currency: String,
}

#[derive(Deserialize)]
struct ProvisionRequest {
    provider: ProviderKind,
}

#[derive(Deserialize)]
struct OpenWalletRequest {
    patient_id: String,
    name: String,
    email: String,
    phone: Option<String>,
    currency: Option<String>,
}

#[derive(Deserialize)]
struct DebitRequest {
    amount: Amount,
    description: String,
    idempotency_key: Option<String>,
}

#[derive(Deserialize)]
struct TransferRequest {
    from: String,
    to: String,
    amount: Amount,
    description: Option<String>,
}

#[derive(Serialize)]
struct WalletView {
    account: Account,
    virtual_accounts: Vec<VirtualAccount>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhooks/paystack", post(paystack_webhook))
        .route("/webhooks/monnify", post(monnify_webhook))
        .route("/api/wallet/fund", post(fund_wallet))
        .route("/api/wallet/fund/{reference}/verify", get(verify_funding))
        .route("/api/wallet/balance", get(get_balance))
        .route("/api/wallet/transactions", get(list_transactions))
        .route(
            "/api/wallet/virtual-accounts",
            get(list_virtual_accounts).post(provision_virtual_account),
        )
        .route("/api/staff/wallets", post(open_wallet))
        .route("/api/staff/wallets/transfer", post(transfer_funds))
        .route("/api/staff/wallets/{patient_id}", get(get_wallet))
        .route("/api/staff/wallets/{patient_id}/debit", post(debit_wallet))
        .route("/api/staff/wallets/{patient_id}/recalculate", post(recalculate_wallet))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn start_rest_api(port: u16, state: AppState) -> std::io::Result<()> {
    let app = build_router(state);

    info!("🌐 REST API listening on 0.0.0.0:{}", port);
    let listener = TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    axum::serve(listener, app).await
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", providers: state.registry.kinds() })
}

// --- Webhooks ---

async fn paystack_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Response, ApiError> {
    receive_webhook(&state, ProviderKind::Paystack, &headers, &body).await
}

async fn monnify_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Response, ApiError> {
    receive_webhook(&state, ProviderKind::Monnify, &headers, &body).await
}

/// Hands the untouched body to the reconciler; the signature covers the
/// exact bytes received.
async fn receive_webhook(
    state: &AppState,
    kind: ProviderKind,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response, ApiError> {
    let signature = WebhookVerifier::signature_headers(kind)
        .iter()
        .find_map(|name| headers.get(*name))
        .and_then(|value| value.to_str().ok());

    let outcome = state.reconciler.handle(kind, body, signature).await?;
    let status = if outcome.state.acknowledges() { StatusCode::OK } else { StatusCode::UNAUTHORIZED };
    Ok((status, Json(outcome)).into_response())
}

// --- Patient wallet ---

async fn fund_wallet(
    State(state): State<AppState>,
    caller: AuthenticatedCaller,
    Json(req): Json<FundRequest>,
) -> ApiResult<FundingCheckout> {
    let patient_id = caller.wallet_id()?;
    let checkout = state.funding.initiate(patient_id, req.amount, req.provider, req.callback_url).await?;
    Ok(Json(checkout))
}

async fn verify_funding(
    State(state): State<AppState>,
    caller: AuthenticatedCaller,
    Path(reference): Path<String>,
) -> ApiResult<PaymentConfirmation> {
    let owner = if caller.is_staff() { None } else { Some(caller.subject.as_str()) };
    let confirmation = state.reconciler.confirm_payment(&reference, owner).await?;
    Ok(Json(confirmation))
}

async fn get_balance(State(state): State<AppState>, caller: AuthenticatedCaller) -> ApiResult<BalanceResponse> {
    let account = state.ledger.engine.account(caller.wallet_id()?).await?;
    Ok(Json(BalanceResponse { patient_id: account.patient_id, balance: account.balance, currency: account.currency }))
}

async fn list_transactions(
    State(state): State<AppState>,
    caller: AuthenticatedCaller,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<HistoryPage> {
    let page = state.ledger.engine.history(caller.wallet_id()?, &query).await?;
    Ok(Json(page))
}

async fn list_virtual_accounts(
    State(state): State<AppState>,
    caller: AuthenticatedCaller,
) -> ApiResult<Vec<VirtualAccount>> {
    Ok(Json(state.funding.virtual_accounts(caller.wallet_id()?).await?))
}

async fn provision_virtual_account(
    State(state): State<AppState>,
    caller: AuthenticatedCaller,
    Json(req): Json<ProvisionRequest>,
) -> ApiResult<VirtualAccount> {
    let account = state.funding.provision_virtual_account(caller.wallet_id()?, req.provider).await?;
    Ok(Json(account))
}

// --- Staff ---

async fn open_wallet(
    State(state): State<AppState>,
    caller: AuthenticatedCaller,
    Json(req): Json<OpenWalletRequest>,
) -> Result<(StatusCode, Json<Account>), ApiError> {
    caller.require_staff()?;
    let holder = AccountHolder { name: req.name, email: req.email, phone: req.phone };
    let currency = req.currency.unwrap_or_else(|| state.currency.clone());
    let account = state.ledger.engine.open_account(&req.patient_id, holder, &currency).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

async fn get_wallet(
    State(state): State<AppState>,
    caller: AuthenticatedCaller,
    Path(patient_id): Path<String>,
) -> ApiResult<WalletView> {
    caller.require_staff()?;
    let account = state.ledger.engine.account(&patient_id).await?;
    let virtual_accounts = state.funding.virtual_accounts(&patient_id).await?;
    Ok(Json(WalletView { account, virtual_accounts }))
}

async fn debit_wallet(
    State(state): State<AppState>,
    caller: AuthenticatedCaller,
    Path(patient_id): Path<String>,
    Json(req): Json<DebitRequest>,
) -> ApiResult<Account> {
    caller.require_staff()?;
    let account = state
        .ledger
        .engine
        .debit(&patient_id, req.amount, &req.description, req.idempotency_key.as_deref())
        .await?;
    info!("🧾 {} debited {} from {} ({})", caller.subject, req.amount, patient_id, req.description);
    Ok(Json(account))
}

async fn transfer_funds(
    State(state): State<AppState>,
    caller: AuthenticatedCaller,
    Json(req): Json<TransferRequest>,
) -> ApiResult<TransferReceipt> {
    caller.require_staff()?;
    let description = req.description.unwrap_or_else(|| format!("Transfer from {} to {}", req.from, req.to));
    let receipt = state.ledger.engine.transfer(&req.from, &req.to, req.amount, &description).await?;
    Ok(Json(receipt))
}

async fn recalculate_wallet(
    State(state): State<AppState>,
    caller: AuthenticatedCaller,
    Path(patient_id): Path<String>,
) -> ApiResult<Account> {
    caller.require_staff()?;
    Ok(Json(state.ledger.engine.recalculate_balance(&patient_id).await?))
}
