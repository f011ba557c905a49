//! Transfer Engine
//!
//! Account creation, balance lookup and the atomic transfer protocol on top
//! of a [`LedgerStore`].
//!
//! # Transfer protocol
//!
//! ```text
//! validate ─▶ BEGIN ─▶ lock min(id) ─▶ lock max(id) ─▶ funds check ─▶ write both ─▶ audit ─▶ COMMIT
//!                          │                │               │
//!                          └── missing ─────┴──▶ audit(failed) + COMMIT
//!                                                           └── short ──▶ audit(failed) + COMMIT
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Total lock order**: rows are locked in ascending id order, never in
//!    source/destination order, so overlapping transfers cannot deadlock.
//! 2. **All-or-nothing**: both balance writes and the `succeeded` record
//!    commit together or not at all.
//! 3. **Audit completeness**: every attempt that reaches the locking stage
//!    leaves exactly one record. Timeouts and storage faults leave none.
//! 4. **Bounded calls**: every operation runs under the engine timeout.
//!    Expiry drops the open transaction, which rolls it back. Stores whose
//!    server can outlive a dropped client wait (PostgreSQL) also cap that
//!    wait server-side and report it as a timeout.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::error::{LedgerError, StorageError};
use super::store::{LedgerStore, LedgerTx};
use super::types::{
    AccountId, BALANCE_SCALE, NewTransactionRecord, REASON_ACCOUNT_NOT_FOUND,
    REASON_BALANCE_LIMIT, REASON_INSUFFICIENT_FUNDS, TransactionRecord, balance_limit,
    lock_order,
};

/// Upper bound for one audit history page
pub const MAX_HISTORY_LIMIT: i64 = 1000;

/// Engine operations consumed by the HTTP gateway
#[async_trait]
pub trait LedgerService: Send + Sync {
    async fn create_account(
        &self,
        account_id: AccountId,
        initial_balance: Decimal,
    ) -> Result<(), LedgerError>;

    async fn balance(&self, account_id: AccountId) -> Result<Decimal, LedgerError>;

    async fn transfer(
        &self,
        source: AccountId,
        destination: AccountId,
        amount: Decimal,
    ) -> Result<(), LedgerError>;

    async fn transactions(
        &self,
        account_id: AccountId,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>, LedgerError>;

    /// Check that the backing store answers
    async fn ping(&self) -> Result<(), LedgerError>;
}

/// Ledger transfer engine
pub struct TransferEngine<S: LedgerStore> {
    store: Arc<S>,
    timeout: Duration,
}

impl<S: LedgerStore> Clone for TransferEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            timeout: self.timeout,
        }
    }
}

/// Reject values the `NUMERIC(28, 10)` columns cannot hold exactly.
/// Trailing zeros do not count as fractional digits.
fn check_representable(what: &str, value: Decimal) -> Result<(), LedgerError> {
    if value.normalize().scale() > BALANCE_SCALE {
        return Err(LedgerError::InvalidInput(format!(
            "{} has more than {} fractional digits",
            what, BALANCE_SCALE
        )));
    }
    if value.abs() >= balance_limit() {
        return Err(LedgerError::InvalidInput(format!(
            "{} must be below {}",
            what,
            balance_limit()
        )));
    }
    Ok(())
}

impl<S: LedgerStore> TransferEngine<S> {
    /// Create a new engine; `timeout` bounds every call
    pub fn new(store: Arc<S>, timeout: Duration) -> Self {
        debug!(
            backend = store.name(),
            timeout_ms = timeout.as_millis() as u64,
            "Transfer engine created"
        );
        Self { store, timeout }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn bounded<T, F>(&self, op: F) -> Result<T, LedgerError>
    where
        F: Future<Output = Result<T, LedgerError>>,
    {
        tokio::time::timeout(self.timeout, op).await?
    }

    /// Create an account with a non-negative opening balance
    pub async fn create_account(
        &self,
        account_id: AccountId,
        initial_balance: Decimal,
    ) -> Result<(), LedgerError> {
        if account_id == 0 {
            return Err(LedgerError::InvalidInput(
                "account_id must be non-zero".to_string(),
            ));
        }
        if initial_balance < Decimal::ZERO {
            return Err(LedgerError::InvalidInput(
                "initial_balance must be >= 0".to_string(),
            ));
        }
        check_representable("initial_balance", initial_balance)?;

        let result = self
            .bounded(async {
                self.store
                    .insert_account(account_id, initial_balance)
                    .await
                    .map_err(LedgerError::from)
            })
            .await;

        match &result {
            Ok(()) => info!(account_id, balance = %initial_balance, "Account created"),
            Err(e) if e.is_internal() => {
                error!(account_id, error = %e, "Account creation failed")
            }
            Err(e) => debug!(account_id, error = %e, "Account creation rejected"),
        }
        result
    }

    /// Last committed balance of an account
    pub async fn balance(&self, account_id: AccountId) -> Result<Decimal, LedgerError> {
        self.bounded(async {
            self.store
                .read_balance(account_id)
                .await
                .map_err(LedgerError::from)
        })
        .await
    }

    /// Audit history of one account, newest first
    pub async fn transactions(
        &self,
        account_id: AccountId,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        let limit = limit.clamp(1, MAX_HISTORY_LIMIT);
        self.bounded(async {
            self.store
                .list_records(account_id, limit)
                .await
                .map_err(LedgerError::from)
        })
        .await
    }

    /// Move `amount` from `source` to `destination` atomically.
    ///
    /// Not idempotent: each call that reaches the locking stage writes a new
    /// audit record and, on success, a new balance mutation.
    pub async fn transfer(
        &self,
        source: AccountId,
        destination: AccountId,
        amount: Decimal,
    ) -> Result<(), LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidInput("amount must be > 0".to_string()));
        }
        check_representable("amount", amount)?;

        // Self-transfer is a silent no-op: nothing is locked or recorded.
        if source == destination {
            debug!(account_id = source, "Same-account transfer ignored");
            return Ok(());
        }

        let result = self
            .bounded(self.run_transfer(source, destination, amount))
            .await;

        match &result {
            Ok(()) => info!(
                source_account_id = source,
                destination_account_id = destination,
                amount = %amount,
                "Transfer committed"
            ),
            Err(e) if e.is_internal() => error!(
                source_account_id = source,
                destination_account_id = destination,
                amount = %amount,
                code = e.code(),
                error = %e,
                "Transfer aborted"
            ),
            Err(e) => warn!(
                source_account_id = source,
                destination_account_id = destination,
                amount = %amount,
                code = e.code(),
                error = %e,
                "Transfer rejected"
            ),
        }
        result
    }

    async fn run_transfer(
        &self,
        source: AccountId,
        destination: AccountId,
        amount: Decimal,
    ) -> Result<(), LedgerError> {
        let mut tx = self.store.begin().await?;

        let mut source_balance = Decimal::ZERO;
        let mut destination_balance = Decimal::ZERO;

        for account_id in lock_order(source, destination) {
            let locked = tx.read_balance_for_update(account_id).await;
            let balance = match locked {
                Ok(b) => b,
                Err(StorageError::AccountNotFound(missing)) => {
                    Self::reject(tx, source, destination, amount, REASON_ACCOUNT_NOT_FOUND)
                        .await?;
                    return Err(LedgerError::AccountNotFound(missing));
                }
                Err(e) => return Err(Self::abort(tx, e).await),
            };
            if account_id == source {
                source_balance = balance;
            } else {
                destination_balance = balance;
            }
        }

        if source_balance < amount {
            Self::reject(tx, source, destination, amount, REASON_INSUFFICIENT_FUNDS).await?;
            return Err(LedgerError::InsufficientFunds);
        }

        let (new_source, new_destination) = match (
            source_balance.checked_sub(amount),
            destination_balance.checked_add(amount),
        ) {
            (Some(s), Some(d)) if d < balance_limit() => (s, d),
            (Some(_), Some(_)) => {
                Self::reject(tx, source, destination, amount, REASON_BALANCE_LIMIT).await?;
                return Err(LedgerError::InvalidInput(format!(
                    "destination balance would reach {}",
                    balance_limit()
                )));
            }
            _ => {
                let e = StorageError::InvalidState(format!(
                    "balance overflow crediting account {}",
                    destination
                ));
                return Err(Self::abort(tx, e).await);
            }
        };

        let written = match tx.write_balance(source, new_source).await {
            Ok(()) => tx.write_balance(destination, new_destination).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            return Err(Self::abort(tx, e).await);
        }

        let record = NewTransactionRecord::succeeded(source, destination, amount);
        let appended = tx.append_record(&record).await;
        let record_id = match appended {
            Ok(id) => id,
            Err(e) => return Err(Self::abort(tx, e).await),
        };

        tx.commit().await?;
        debug!(record_id, "Transfer record appended");
        Ok(())
    }

    /// Record a rejected attempt and commit it. No balance was written, so
    /// committing only persists the audit record and releases the row locks.
    async fn reject(
        mut tx: S::Tx,
        source: AccountId,
        destination: AccountId,
        amount: Decimal,
        reason: &str,
    ) -> Result<(), LedgerError> {
        let record = NewTransactionRecord::failed(source, destination, amount, reason);
        let appended = tx.append_record(&record).await;
        if let Err(e) = appended {
            return Err(Self::abort(tx, e).await);
        }
        tx.commit().await?;
        Ok(())
    }

    /// Roll back and surface the underlying fault
    async fn abort(tx: S::Tx, cause: StorageError) -> LedgerError {
        if let Err(e) = tx.rollback().await {
            warn!(error = %e, "Rollback failed; connection discards the transaction");
        }
        LedgerError::from(cause)
    }
}

#[async_trait]
impl<S: LedgerStore> LedgerService for TransferEngine<S> {
    async fn create_account(
        &self,
        account_id: AccountId,
        initial_balance: Decimal,
    ) -> Result<(), LedgerError> {
        TransferEngine::create_account(self, account_id, initial_balance).await
    }

    async fn balance(&self, account_id: AccountId) -> Result<Decimal, LedgerError> {
        TransferEngine::balance(self, account_id).await
    }

    async fn transfer(
        &self,
        source: AccountId,
        destination: AccountId,
        amount: Decimal,
    ) -> Result<(), LedgerError> {
        TransferEngine::transfer(self, source, destination, amount).await
    }

    async fn transactions(
        &self,
        account_id: AccountId,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        TransferEngine::transactions(self, account_id, limit).await
    }

    async fn ping(&self) -> Result<(), LedgerError> {
        self.bounded(async { self.store.ping().await.map_err(LedgerError::from) })
            .await
    }
}

#[cfg(all(test, feature = "mock-store"))]
mod tests {
    use super::*;
    use crate::ledger::memory::MemoryLedgerStore;
    use crate::ledger::types::TransferStatus;
    use rust_decimal_macros::dec;

    fn engine() -> TransferEngine<MemoryLedgerStore> {
        TransferEngine::new(Arc::new(MemoryLedgerStore::new()), Duration::from_secs(5))
    }

    // =========================================================================
    // Account creation
    // =========================================================================

    #[tokio::test]
    async fn test_create_account_and_balance() {
        let engine = engine();
        engine.create_account(100, dec!(1000.00)).await.unwrap();
        assert_eq!(engine.balance(100).await.unwrap(), dec!(1000.00));
    }

    #[tokio::test]
    async fn test_create_account_rejects_bad_input() {
        let engine = engine();
        assert!(matches!(
            engine.create_account(0, dec!(1)).await,
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            engine.create_account(1, dec!(-1)).await,
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            engine.create_account(1, dec!(0.00000000001)).await,
            Err(LedgerError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_create_duplicate_account() {
        let engine = engine();
        engine.create_account(7, dec!(1)).await.unwrap();
        assert_eq!(
            engine.create_account(7, dec!(2)).await,
            Err(LedgerError::DuplicateAccount(7))
        );
        assert_eq!(engine.balance(7).await.unwrap(), dec!(1));
    }

    #[tokio::test]
    async fn test_balance_of_missing_account() {
        assert_eq!(
            engine().balance(42).await,
            Err(LedgerError::AccountNotFound(42))
        );
    }

    // =========================================================================
    // Transfer protocol
    // =========================================================================

    #[tokio::test]
    async fn test_transfer_moves_funds_and_records_success() {
        let engine = engine();
        engine.create_account(100, dec!(1000.00)).await.unwrap();
        engine.create_account(200, dec!(500.00)).await.unwrap();

        engine.transfer(100, 200, dec!(100.50)).await.unwrap();

        assert_eq!(engine.balance(100).await.unwrap(), dec!(899.50));
        assert_eq!(engine.balance(200).await.unwrap(), dec!(600.50));

        let records = engine.store().records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, TransferStatus::Succeeded);
        assert_eq!(records[0].error_message, None);
    }

    #[tokio::test]
    async fn test_transfer_of_exact_balance_empties_source() {
        let engine = engine();
        engine.create_account(1, dec!(10)).await.unwrap();
        engine.create_account(2, dec!(0)).await.unwrap();

        engine.transfer(1, 2, dec!(10)).await.unwrap();
        assert_eq!(engine.balance(1).await.unwrap(), Decimal::ZERO);
        assert_eq!(engine.balance(2).await.unwrap(), dec!(10));
    }

    #[tokio::test]
    async fn test_insufficient_funds_is_recorded() {
        let engine = engine();
        engine.create_account(1, dec!(5)).await.unwrap();
        engine.create_account(2, dec!(0)).await.unwrap();

        assert_eq!(
            engine.transfer(1, 2, dec!(5.01)).await,
            Err(LedgerError::InsufficientFunds)
        );
        assert_eq!(engine.balance(1).await.unwrap(), dec!(5));

        let records = engine.store().records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, TransferStatus::Failed);
        assert_eq!(records[0].error_message.as_deref(), Some("insufficient funds"));
    }

    #[tokio::test]
    async fn test_missing_destination_is_recorded() {
        let engine = engine();
        engine.create_account(1, dec!(5)).await.unwrap();

        assert_eq!(
            engine.transfer(1, 999, dec!(1)).await,
            Err(LedgerError::AccountNotFound(999))
        );
        assert_eq!(engine.balance(1).await.unwrap(), dec!(5));

        let records = engine.store().records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].error_message.as_deref(), Some("account not found"));
    }

    #[tokio::test]
    async fn test_rejected_attempt_releases_locks() {
        let engine = engine();
        engine.create_account(1, dec!(1)).await.unwrap();
        engine.create_account(2, dec!(1)).await.unwrap();

        assert!(engine.transfer(1, 2, dec!(100)).await.is_err());
        // A follow-up transfer over the same rows must not block
        engine.transfer(2, 1, dec!(1)).await.unwrap();
        assert_eq!(engine.balance(1).await.unwrap(), dec!(2));
    }

    #[tokio::test]
    async fn test_same_account_transfer_is_noop() {
        let engine = engine();
        engine.create_account(1, dec!(5)).await.unwrap();

        engine.transfer(1, 1, dec!(3)).await.unwrap();
        assert_eq!(engine.balance(1).await.unwrap(), dec!(5));
        assert!(engine.store().records().unwrap().is_empty());

        // Even for an unknown account nothing is touched
        engine.transfer(77, 77, dec!(3)).await.unwrap();
        assert!(engine.store().records().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_amount_writes_nothing() {
        let engine = engine();
        engine.create_account(1, dec!(5)).await.unwrap();
        engine.create_account(2, dec!(5)).await.unwrap();

        for amount in [dec!(0), dec!(-1), dec!(0.00000000001)] {
            assert!(matches!(
                engine.transfer(1, 2, amount).await,
                Err(LedgerError::InvalidInput(_))
            ));
        }
        assert!(engine.store().records().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_trailing_zeros_do_not_count_as_precision() {
        let engine = engine();
        engine.create_account(1, dec!(1.00000000000)).await.unwrap();
        engine.create_account(2, dec!(0)).await.unwrap();

        engine.transfer(1, 2, dec!(0.500000000000)).await.unwrap();

        assert_eq!(engine.balance(1).await.unwrap(), dec!(0.5));
        assert_eq!(engine.balance(2).await.unwrap(), dec!(0.5));
    }

    #[tokio::test]
    async fn test_values_beyond_column_range_are_invalid_input() {
        let engine = engine();
        assert!(matches!(
            engine.create_account(1, dec!(1000000000000000000)).await,
            Err(LedgerError::InvalidInput(_))
        ));
        engine
            .create_account(1, dec!(999999999999999999.9999999999))
            .await
            .unwrap();
        engine.create_account(2, dec!(1)).await.unwrap();

        assert!(matches!(
            engine.transfer(2, 1, dec!(1000000000000000000)).await,
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(engine.store().records().unwrap().is_empty());

        // The credit would overflow the destination column
        assert!(matches!(
            engine.transfer(2, 1, dec!(1)).await,
            Err(LedgerError::InvalidInput(_))
        ));
        assert_eq!(engine.balance(2).await.unwrap(), dec!(1));
        let records = engine.store().records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, TransferStatus::Failed);
        assert_eq!(
            records[0].error_message.as_deref(),
            Some("balance limit exceeded")
        );
    }

    #[tokio::test]
    async fn test_transactions_limit_is_clamped() {
        let engine = engine();
        engine.create_account(1, dec!(10)).await.unwrap();
        engine.create_account(2, dec!(0)).await.unwrap();
        engine.transfer(1, 2, dec!(1)).await.unwrap();
        engine.transfer(1, 2, dec!(1)).await.unwrap();

        assert_eq!(engine.transactions(1, 0).await.unwrap().len(), 1);
        assert_eq!(engine.transactions(2, 50).await.unwrap().len(), 2);
    }
}
