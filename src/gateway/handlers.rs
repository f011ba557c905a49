//! HTTP handlers
//!
//! Handlers decode and validate the request, call the ledger, and map the
//! outcome onto the `{code, msg, data}` envelope.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
};
use utoipa::OpenApi;

use super::openapi::ApiDoc;
use super::state::AppState;
use super::types::{
    AccountResponse, ApiError, ApiResult, CreateAccountRequest, HealthResponse, HistoryQuery,
    TransactionRequest, TransactionView, TransferResponse, created, ok,
};
use crate::ledger::{AccountId, TransferStatus};

/// Unwrap a JSON body, turning any decode failure into a 400
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match body {
        Ok(Json(v)) => Ok(v),
        Err(rejection) => {
            tracing::debug!(error = %rejection.body_text(), "Rejected request body");
            Err(ApiError::bad_request("invalid request body"))
        }
    }
}

fn parse_account_id(raw: &str) -> Result<AccountId, ApiError> {
    raw.parse::<AccountId>()
        .map_err(|_| ApiError::bad_request("invalid account id"))
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Create an account with an opening balance
#[utoipa::path(
    post,
    path = "/accounts",
    request_body = CreateAccountRequest,
    responses(
        (status = 201, description = "Account created", body = AccountResponse),
        (status = 400, description = "Malformed body or invalid values"),
        (status = 409, description = "Account already exists"),
        (status = 504, description = "Request timed out")
    ),
    tag = "Accounts"
)]
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateAccountRequest>, JsonRejection>,
) -> ApiResult<AccountResponse> {
    let req = json_body(body)?;
    req.validate().map_err(ApiError::bad_request)?;

    let initial_balance = req.initial_balance.inner();
    state
        .ledger
        .create_account(req.account_id, initial_balance)
        .await?;

    created(AccountResponse {
        account_id: req.account_id,
        balance: initial_balance,
    })
}

/// Read the committed balance of one account
#[utoipa::path(
    get,
    path = "/accounts/{account_id}",
    params(("account_id" = i64, Path, description = "Account id")),
    responses(
        (status = 200, description = "Current balance", body = AccountResponse),
        (status = 400, description = "Account id is not an integer"),
        (status = 404, description = "Account not found")
    ),
    tag = "Accounts"
)]
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> ApiResult<AccountResponse> {
    let account_id = parse_account_id(&raw_id)?;
    let balance = state.ledger.balance(account_id).await?;
    ok(AccountResponse {
        account_id,
        balance,
    })
}

/// Transfer funds between two accounts
#[utoipa::path(
    post,
    path = "/transactions",
    request_body = TransactionRequest,
    responses(
        (status = 200, description = "Transfer committed", body = TransferResponse),
        (status = 400, description = "Malformed body or invalid values"),
        (status = 404, description = "Source or destination not found"),
        (status = 409, description = "Insufficient funds"),
        (status = 504, description = "Request timed out")
    ),
    tag = "Transactions"
)]
pub async fn create_transaction(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TransactionRequest>, JsonRejection>,
) -> ApiResult<TransferResponse> {
    let req = json_body(body)?;
    req.validate().map_err(ApiError::bad_request)?;

    let amount = req.amount.inner();
    state
        .ledger
        .transfer(req.source_account_id, req.destination_account_id, amount)
        .await?;

    ok(TransferResponse {
        source_account_id: req.source_account_id,
        destination_account_id: req.destination_account_id,
        amount,
        status: TransferStatus::Succeeded.as_str().to_string(),
    })
}

/// Audit history of one account, newest first
#[utoipa::path(
    get,
    path = "/accounts/{account_id}/transactions",
    params(
        ("account_id" = i64, Path, description = "Account id"),
        HistoryQuery
    ),
    responses(
        (status = 200, description = "Audit records", body = Vec<TransactionView>),
        (status = 400, description = "Account id or limit is not an integer")
    ),
    tag = "Transactions"
)]
pub async fn list_account_transactions(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult<Vec<TransactionView>> {
    let account_id = parse_account_id(&raw_id)?;
    let Query(query) = query.map_err(|_| ApiError::bad_request("invalid limit"))?;
    let limit = query.limit.unwrap_or(state.history_limit);
    let records = state.ledger.transactions(account_id, limit).await?;
    ok(records.into_iter().map(TransactionView::from).collect())
}

/// Liveness probe
#[utoipa::path(
    get,
    path = "/healthz",
    responses((status = 200, description = "Process is up", body = HealthResponse)),
    tag = "System"
)]
pub async fn healthz() -> ApiResult<HealthResponse> {
    ok(HealthResponse {
        timestamp_ms: now_ms(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness probe: the ledger store must answer
#[utoipa::path(
    get,
    path = "/readyz",
    responses(
        (status = 200, description = "Ready to serve", body = HealthResponse),
        (status = 503, description = "Store unavailable")
    ),
    tag = "System"
)]
pub async fn readyz(State(state): State<Arc<AppState>>) -> ApiResult<HealthResponse> {
    if let Err(e) = state.ledger.ping().await {
        tracing::error!(error = %e, "[HEALTH] ledger store ping failed");
        return ApiError::service_unavailable("unavailable").into_err();
    }
    ok(HealthResponse {
        timestamp_ms: now_ms(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// OpenAPI document
pub async fn openapi_json() -> (StatusCode, Json<utoipa::openapi::OpenApi>) {
    (StatusCode::OK, Json(ApiDoc::openapi()))
}
