//! Storage adapter seam
//!
//! The engine talks to durable storage only through these two traits.
//! [`LedgerStore`] covers operations that run on their own, [`LedgerTx`]
//! covers operations inside one open storage transaction.
//!
//! Implementations guarantee durability and locking. They hold no business
//! rules beyond the defensive checks the schema also enforces.

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::error::StorageError;
use super::types::{AccountId, NewTransactionRecord, TransactionRecord};

/// Durable ledger storage
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    /// Transaction handle returned by [`begin`](Self::begin)
    type Tx: LedgerTx;

    /// Get backend name for logging
    fn name(&self) -> &'static str;

    /// Insert a new account.
    ///
    /// Fails with `DuplicateAccount` if the id exists and with `InvalidState`
    /// if `initial_balance` is negative.
    async fn insert_account(
        &self,
        account_id: AccountId,
        initial_balance: Decimal,
    ) -> Result<(), StorageError>;

    /// Read the last committed balance without taking any lock
    async fn read_balance(&self, account_id: AccountId) -> Result<Decimal, StorageError>;

    /// Open a storage transaction
    async fn begin(&self) -> Result<Self::Tx, StorageError>;

    /// Audit records where the account is source or destination, newest first
    async fn list_records(
        &self,
        account_id: AccountId,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>, StorageError>;

    /// Check that the backend is reachable
    async fn ping(&self) -> Result<(), StorageError>;
}

/// One open storage transaction.
///
/// Dropping a transaction without calling [`commit`](Self::commit) rolls it
/// back and releases every row lock it holds.
#[async_trait]
pub trait LedgerTx: Send {
    /// Read a balance and hold an exclusive lock on its row until the
    /// transaction ends. Blocks while another transaction holds that lock.
    async fn read_balance_for_update(
        &mut self,
        account_id: AccountId,
    ) -> Result<Decimal, StorageError>;

    /// Overwrite a balance. The caller must already hold the row lock.
    async fn write_balance(
        &mut self,
        account_id: AccountId,
        new_balance: Decimal,
    ) -> Result<(), StorageError>;

    /// Append one audit record, returns its sequence id
    async fn append_record(&mut self, record: &NewTransactionRecord) -> Result<i64, StorageError>;

    async fn commit(self) -> Result<(), StorageError>;

    async fn rollback(self) -> Result<(), StorageError>;
}
