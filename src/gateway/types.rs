//! Gateway request/response types
//!
//! - [`StrictDecimal`]: format-validated decimal for API input
//! - Request DTOs with their syntactic validation
//! - [`ApiResponse`] envelope, [`ApiError`] and `error_codes`

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::{IntoParams, ToSchema};

use crate::ledger::{AccountId, LedgerError, TransactionRecord};

// ============================================================================
// StrictDecimal: Format-Validated Decimal at Serde Layer
// ============================================================================

/// Strict format Decimal - validates format during deserialization
///
/// - Accepts JSON strings (preferred) and JSON numbers
/// - Rejects `.5` (must be `0.5`) and `5.` (must be `5.0` or `5`)
/// - Rejects negative numbers and empty strings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrictDecimal(Decimal);

impl StrictDecimal {
    /// Get the inner Decimal value
    pub fn inner(self) -> Decimal {
        self.0
    }

    pub fn from_decimal(d: Decimal) -> Self {
        Self(d)
    }
}

impl std::ops::Deref for StrictDecimal {
    type Target = Decimal;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de> Deserialize<'de> for StrictDecimal {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum DecimalOrString {
            String(String),
            Number(Decimal),
        }

        let d = match DecimalOrString::deserialize(deserializer)? {
            DecimalOrString::String(s) => {
                if s.is_empty() {
                    return Err(D::Error::custom("Amount cannot be empty"));
                }
                if s.starts_with('.') {
                    return Err(D::Error::custom("Invalid format: use 0.5 not .5"));
                }
                if s.ends_with('.') {
                    return Err(D::Error::custom("Invalid format: use 5.0 not 5."));
                }
                Decimal::from_str(&s)
                    .map_err(|e| D::Error::custom(format!("Invalid decimal: {}", e)))?
            }
            DecimalOrString::Number(d) => d,
        };

        if d.is_sign_negative() && !d.is_zero() {
            return Err(D::Error::custom("Amount cannot be negative"));
        }
        Ok(StrictDecimal(d))
    }
}

impl Serialize for StrictDecimal {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        // Serialize as string to preserve precision
        serializer.serialize_str(&self.0.to_string())
    }
}

// ============================================================================
// Requests
// ============================================================================

pub const ERR_INVALID_ACCOUNT_ID: &str = "account_id must be non-zero";
pub const ERR_INVALID_INITIAL_BALANCE: &str = "initial_balance must be >= 0";
pub const ERR_INVALID_AMOUNT: &str = "amount must be > 0";
pub const ERR_SAME_SOURCE_DESTINATION: &str = "source and destination must differ";

/// POST /accounts
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateAccountRequest {
    #[schema(example = 100)]
    pub account_id: AccountId,
    #[schema(value_type = String, example = "1000.00")]
    pub initial_balance: StrictDecimal,
}

impl CreateAccountRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.account_id == 0 {
            return Err(ERR_INVALID_ACCOUNT_ID);
        }
        if self.initial_balance.inner() < Decimal::ZERO {
            return Err(ERR_INVALID_INITIAL_BALANCE);
        }
        Ok(())
    }
}

/// POST /transactions
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TransactionRequest {
    #[schema(example = 100)]
    pub source_account_id: AccountId,
    #[schema(example = 200)]
    pub destination_account_id: AccountId,
    #[schema(value_type = String, example = "100.50")]
    pub amount: StrictDecimal,
}

impl TransactionRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.source_account_id == 0 || self.destination_account_id == 0 {
            return Err(ERR_INVALID_ACCOUNT_ID);
        }
        if self.source_account_id == self.destination_account_id {
            return Err(ERR_SAME_SOURCE_DESTINATION);
        }
        if self.amount.inner() <= Decimal::ZERO {
            return Err(ERR_INVALID_AMOUNT);
        }
        Ok(())
    }
}

/// GET /accounts/{id}/transactions
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// Page size (1..=1000)
    pub limit: Option<i64>,
}

// ============================================================================
// Responses
// ============================================================================

/// Unified API response wrapper
///
/// - code: 0 = success, non-zero = error code
/// - msg: short message description
/// - data: actual data (success) or null (error)
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    #[schema(example = 0)]
    pub code: i32,
    #[schema(example = "ok")]
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: i32, msg: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

/// Account balance view
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccountResponse {
    #[schema(example = 100)]
    pub account_id: AccountId,
    #[schema(value_type = String, example = "899.50")]
    pub balance: Decimal,
}

/// Committed transfer view
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransferResponse {
    pub source_account_id: AccountId,
    pub destination_account_id: AccountId,
    #[schema(value_type = String, example = "100.50")]
    pub amount: Decimal,
    #[schema(example = "succeeded")]
    pub status: String,
}

/// One audit log entry
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransactionView {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub source_account_id: AccountId,
    pub destination_account_id: AccountId,
    #[schema(value_type = String)]
    pub amount: Decimal,
    #[schema(example = "failed")]
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "insufficient funds")]
    pub error_message: Option<String>,
}

impl From<TransactionRecord> for TransactionView {
    fn from(r: TransactionRecord) -> Self {
        Self {
            id: r.id,
            created_at: r.created_at,
            source_account_id: r.source_account_id,
            destination_account_id: r.destination_account_id,
            amount: r.amount,
            status: r.status.as_str().to_string(),
            error_message: r.error_message,
        }
    }
}

/// Health check response data
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = 1703494800000_u64)]
    pub timestamp_ms: u64,
    pub version: String,
}

// ============================================================================
// Error Codes
// ============================================================================

/// Standard API error codes
pub mod error_codes {
    pub const SUCCESS: i32 = 0;

    // Client errors (1xxx)
    pub const INVALID_PARAMETER: i32 = 1001;
    pub const INSUFFICIENT_FUNDS: i32 = 1002;
    pub const DUPLICATE_ACCOUNT: i32 = 1003;

    // Resource errors (4xxx)
    pub const ACCOUNT_NOT_FOUND: i32 = 4001;

    // Server errors (5xxx)
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const SERVICE_UNAVAILABLE: i32 = 5001;
    pub const TIMEOUT: i32 = 5004;
}

// ============================================================================
// ApiError
// ============================================================================

/// Error half of every handler result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: i32,
    pub msg: String,
}

pub type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::OK, Json(ApiResponse::success(data))))
}

pub fn created<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::CREATED, Json(ApiResponse::success(data))))
}

impl ApiError {
    pub fn new(status: StatusCode, code: i32, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            msg: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error_codes::INVALID_PARAMETER, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            error_codes::INTERNAL_ERROR,
            msg,
        )
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            error_codes::SERVICE_UNAVAILABLE,
            msg,
        )
    }

    pub fn into_err<T>(self) -> ApiResult<T> {
        Err(self)
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        let status = StatusCode::from_u16(e.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        match e {
            LedgerError::InvalidInput(msg) => ApiError::bad_request(msg),
            LedgerError::AccountNotFound(_) => {
                ApiError::new(status, error_codes::ACCOUNT_NOT_FOUND, "account not found")
            }
            LedgerError::DuplicateAccount(_) => {
                ApiError::new(status, error_codes::DUPLICATE_ACCOUNT, "account already exists")
            }
            LedgerError::InsufficientFunds => {
                ApiError::new(status, error_codes::INSUFFICIENT_FUNDS, "insufficient funds")
            }
            // Internal detail is logged by the engine, never returned
            LedgerError::Timeout => ApiError::new(status, error_codes::TIMEOUT, "request timed out"),
            LedgerError::StorageFailure(_) => ApiError::internal("internal error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::error(self.code, self.msg))).into_response()
    }
}
