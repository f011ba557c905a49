//! Ledger domain types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Caller-assigned account identifier
pub type AccountId = i64;

/// Fractional digits persisted for balances and amounts (`NUMERIC(28, 10)`).
pub const BALANCE_SCALE: u32 = 10;

/// Exclusive upper bound for balances and amounts: `NUMERIC(28, 10)` keeps
/// 18 integer digits.
pub fn balance_limit() -> Decimal {
    Decimal::from(1_000_000_000_000_000_000_i64)
}

/// Audit reason written when one side of a transfer does not exist
pub const REASON_ACCOUNT_NOT_FOUND: &str = "account not found";

/// Audit reason written when the source cannot cover the amount
pub const REASON_INSUFFICIENT_FUNDS: &str = "insufficient funds";

/// Audit reason written when the credit would push the destination past
/// [`balance_limit`]
pub const REASON_BALANCE_LIMIT: &str = "balance limit exceeded";

/// Outcome stored with every transfer attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Succeeded,
    Failed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Succeeded => "succeeded",
            TransferStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "succeeded" => Ok(TransferStatus::Succeeded),
            "failed" => Ok(TransferStatus::Failed),
            other => Err(format!("unknown transfer status: {}", other)),
        }
    }
}

/// Audit record before the store assigns `id` and `created_at`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransactionRecord {
    pub source_account_id: AccountId,
    pub destination_account_id: AccountId,
    pub amount: Decimal,
    pub status: TransferStatus,
    pub error_message: Option<String>,
}

impl NewTransactionRecord {
    pub fn succeeded(source: AccountId, destination: AccountId, amount: Decimal) -> Self {
        Self {
            source_account_id: source,
            destination_account_id: destination,
            amount,
            status: TransferStatus::Succeeded,
            error_message: None,
        }
    }

    pub fn failed(
        source: AccountId,
        destination: AccountId,
        amount: Decimal,
        reason: &str,
    ) -> Self {
        Self {
            source_account_id: source,
            destination_account_id: destination,
            amount,
            status: TransferStatus::Failed,
            error_message: Some(reason.to_string()),
        }
    }
}

/// Immutable audit log entry, one per transfer attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionRecord {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub source_account_id: AccountId,
    pub destination_account_id: AccountId,
    pub amount: Decimal,
    pub status: TransferStatus,
    pub error_message: Option<String>,
}

impl TransactionRecord {
    /// Materialize a pending record with store-assigned identity
    pub fn from_new(id: i64, created_at: DateTime<Utc>, new: NewTransactionRecord) -> Self {
        Self {
            id,
            created_at,
            source_account_id: new.source_account_id,
            destination_account_id: new.destination_account_id,
            amount: new.amount,
            status: new.status,
            error_message: new.error_message,
        }
    }

    /// True if the account took part in this attempt on either side
    pub fn involves(&self, account_id: AccountId) -> bool {
        self.source_account_id == account_id || self.destination_account_id == account_id
    }
}

/// Order in which the two rows of a transfer are locked.
///
/// Always ascending by id, independent of which side is the source, so that
/// two transfers over the same pair can never wait on each other in a cycle.
pub fn lock_order(a: AccountId, b: AccountId) -> [AccountId; 2] {
    if a <= b { [a, b] } else { [b, a] }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_lock_order_is_ascending() {
        assert_eq!(lock_order(100, 200), [100, 200]);
        assert_eq!(lock_order(200, 100), [100, 200]);
        assert_eq!(lock_order(-5, 3), [-5, 3]);
    }

    #[test]
    fn test_status_string_round_trip() {
        assert_eq!(TransferStatus::Succeeded.as_str(), "succeeded");
        assert_eq!("failed".parse::<TransferStatus>(), Ok(TransferStatus::Failed));
        assert!("pending".parse::<TransferStatus>().is_err());
    }

    #[test]
    fn test_failed_record_carries_reason() {
        let rec = NewTransactionRecord::failed(999, 200, dec!(1.5), REASON_ACCOUNT_NOT_FOUND);
        assert_eq!(rec.status, TransferStatus::Failed);
        assert_eq!(rec.error_message.as_deref(), Some("account not found"));

        let full = TransactionRecord::from_new(7, Utc::now(), rec);
        assert!(full.involves(999));
        assert!(full.involves(200));
        assert!(!full.involves(100));
    }
}
