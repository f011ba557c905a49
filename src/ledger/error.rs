//! Ledger error types
//!
//! `StorageError` is what the storage adapter reports. `LedgerError` is the
//! outcome taxonomy the engine returns to callers.

use thiserror::Error;

use super::types::AccountId;

/// Errors raised by a [`LedgerStore`](super::store::LedgerStore) implementation
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Account already exists: {0}")]
    DuplicateAccount(AccountId),

    #[error("Invalid ledger state: {0}")]
    InvalidState(String),

    /// The server gave up waiting for a row lock or a statement
    #[error("Storage wait timed out")]
    Timeout,

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

/// `lock_not_available` raised by `lock_timeout`
const SQLSTATE_LOCK_NOT_AVAILABLE: &str = "55P03";
/// `query_canceled` raised by `statement_timeout`
const SQLSTATE_QUERY_CANCELED: &str = "57014";

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            let code = db.code();
            if matches!(
                code.as_deref(),
                Some(SQLSTATE_LOCK_NOT_AVAILABLE | SQLSTATE_QUERY_CANCELED)
            ) {
                return StorageError::Timeout;
            }
        }
        StorageError::Database(e)
    }
}

/// Engine outcome for every failed operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    // === Client-correctable ===
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // === Business outcomes ===
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Account already exists: {0}")]
    DuplicateAccount(AccountId),

    #[error("Insufficient funds")]
    InsufficientFunds,

    // === System faults ===
    #[error("Operation timed out")]
    Timeout,

    #[error("Storage failure: {0}")]
    StorageFailure(String),
}

impl LedgerError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidInput(_) => "INVALID_INPUT",
            LedgerError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            LedgerError::DuplicateAccount(_) => "DUPLICATE_ACCOUNT",
            LedgerError::InsufficientFunds => "INSUFFICIENT_FUNDS",
            LedgerError::Timeout => "TIMEOUT",
            LedgerError::StorageFailure(_) => "STORAGE_FAILURE",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            LedgerError::InvalidInput(_) => 400,
            LedgerError::AccountNotFound(_) => 404,
            LedgerError::DuplicateAccount(_) | LedgerError::InsufficientFunds => 409,
            LedgerError::StorageFailure(_) => 500,
            LedgerError::Timeout => 504,
        }
    }

    /// True for faults whose detail must not reach the client
    pub fn is_internal(&self) -> bool {
        matches!(self, LedgerError::Timeout | LedgerError::StorageFailure(_))
    }
}

impl From<StorageError> for LedgerError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::AccountNotFound(id) => LedgerError::AccountNotFound(id),
            StorageError::DuplicateAccount(id) => LedgerError::DuplicateAccount(id),
            StorageError::InvalidState(msg) => LedgerError::StorageFailure(msg),
            StorageError::Timeout => LedgerError::Timeout,
            StorageError::Database(e) => LedgerError::StorageFailure(e.to_string()),
        }
    }
}

impl From<tokio::time::error::Elapsed> for LedgerError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        LedgerError::Timeout
    }
}
