//! In-process ledger store
//!
//! Mirrors the PostgreSQL store's transactional behavior for tests and local
//! runs: every account row carries its own async lock, writes stay private to
//! the transaction until commit, and dropping a transaction discards them.
//! Reads outside a transaction see only committed balances.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

use super::error::StorageError;
use super::store::{LedgerStore, LedgerTx};
use super::types::{AccountId, NewTransactionRecord, TransactionRecord};

struct AccountRow {
    committed: Mutex<Decimal>,
    lock: Arc<RowLock<()>>,
}

struct Inner {
    accounts: Mutex<HashMap<AccountId, Arc<AccountRow>>>,
    records: Mutex<Vec<TransactionRecord>>,
    next_record_id: AtomicI64,
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    m.lock()
        .map_err(|_| StorageError::InvalidState("memory store mutex poisoned".to_string()))
}

/// [`LedgerStore`] kept entirely in process memory
#[derive(Clone)]
pub struct MemoryLedgerStore {
    inner: Arc<Inner>,
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                accounts: Mutex::new(HashMap::new()),
                records: Mutex::new(Vec::new()),
                next_record_id: AtomicI64::new(1),
            }),
        }
    }

    /// Snapshot of every committed audit record in append order
    pub fn records(&self) -> Result<Vec<TransactionRecord>, StorageError> {
        Ok(lock(&self.inner.records)?.clone())
    }

    fn row(&self, account_id: AccountId) -> Result<Option<Arc<AccountRow>>, StorageError> {
        Ok(lock(&self.inner.accounts)?.get(&account_id).cloned())
    }
}

struct HeldRow {
    account_id: AccountId,
    row: Arc<AccountRow>,
    pending: Option<Decimal>,
    _guard: OwnedMutexGuard<()>,
}

/// Open in-memory transaction; holds row guards until commit or drop
pub struct MemoryLedgerTx {
    store: MemoryLedgerStore,
    held: Vec<HeldRow>,
    appended: Vec<TransactionRecord>,
}

impl MemoryLedgerTx {
    fn held_mut(&mut self, account_id: AccountId) -> Option<&mut HeldRow> {
        self.held.iter_mut().find(|h| h.account_id == account_id)
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    type Tx = MemoryLedgerTx;

    fn name(&self) -> &'static str {
        "memory"
    }

    async fn insert_account(
        &self,
        account_id: AccountId,
        initial_balance: Decimal,
    ) -> Result<(), StorageError> {
        if initial_balance < Decimal::ZERO {
            return Err(StorageError::InvalidState(format!(
                "negative initial balance for account {}",
                account_id
            )));
        }

        let mut accounts = lock(&self.inner.accounts)?;
        if accounts.contains_key(&account_id) {
            return Err(StorageError::DuplicateAccount(account_id));
        }
        accounts.insert(
            account_id,
            Arc::new(AccountRow {
                committed: Mutex::new(initial_balance),
                lock: Arc::new(RowLock::new(())),
            }),
        );
        Ok(())
    }

    async fn read_balance(&self, account_id: AccountId) -> Result<Decimal, StorageError> {
        let row = self
            .row(account_id)?
            .ok_or(StorageError::AccountNotFound(account_id))?;
        let balance = *lock(&row.committed)?;
        Ok(balance)
    }

    async fn begin(&self) -> Result<MemoryLedgerTx, StorageError> {
        Ok(MemoryLedgerTx {
            store: self.clone(),
            held: Vec::new(),
            appended: Vec::new(),
        })
    }

    async fn list_records(
        &self,
        account_id: AccountId,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>, StorageError> {
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        let records = lock(&self.inner.records)?;
        Ok(records
            .iter()
            .rev()
            .filter(|r| r.involves(account_id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[async_trait]
impl LedgerTx for MemoryLedgerTx {
    async fn read_balance_for_update(
        &mut self,
        account_id: AccountId,
    ) -> Result<Decimal, StorageError> {
        // Re-locking a row this transaction already owns does not block.
        if let Some(held) = self.held_mut(account_id) {
            return match held.pending {
                Some(b) => Ok(b),
                None => Ok(*lock(&held.row.committed)?),
            };
        }

        let row = self
            .store
            .row(account_id)?
            .ok_or(StorageError::AccountNotFound(account_id))?;
        let guard = row.lock.clone().lock_owned().await;
        let balance = *lock(&row.committed)?;

        self.held.push(HeldRow {
            account_id,
            row,
            pending: None,
            _guard: guard,
        });
        Ok(balance)
    }

    async fn write_balance(
        &mut self,
        account_id: AccountId,
        new_balance: Decimal,
    ) -> Result<(), StorageError> {
        if new_balance < Decimal::ZERO {
            return Err(StorageError::InvalidState(format!(
                "check constraint violated for account {}",
                account_id
            )));
        }
        let held = self.held_mut(account_id).ok_or_else(|| {
            StorageError::InvalidState(format!("row {} written without lock", account_id))
        })?;
        held.pending = Some(new_balance);
        Ok(())
    }

    async fn append_record(&mut self, record: &NewTransactionRecord) -> Result<i64, StorageError> {
        let id = self.store.inner.next_record_id.fetch_add(1, Ordering::SeqCst);
        self.appended
            .push(TransactionRecord::from_new(id, Utc::now(), record.clone()));
        Ok(id)
    }

    async fn commit(mut self) -> Result<(), StorageError> {
        {
            let mut records = lock(&self.store.inner.records)?;
            for held in &self.held {
                if let Some(balance) = held.pending {
                    *lock(&held.row.committed)? = balance;
                }
            }
            records.append(&mut self.appended);
        }
        // Row guards are released here, after the new values are visible.
        self.held.clear();
        Ok(())
    }

    async fn rollback(self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    #[tokio::test]
    async fn test_insert_and_read() {
        let store = MemoryLedgerStore::new();
        store.insert_account(1, dec!(10.5)).await.unwrap();
        assert_eq!(store.read_balance(1).await.unwrap(), dec!(10.5));
        assert!(matches!(
            store.read_balance(2).await,
            Err(StorageError::AccountNotFound(2))
        ));
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_and_negative() {
        let store = MemoryLedgerStore::new();
        store.insert_account(1, dec!(0)).await.unwrap();
        assert!(matches!(
            store.insert_account(1, dec!(5)).await,
            Err(StorageError::DuplicateAccount(1))
        ));
        assert!(matches!(
            store.insert_account(2, dec!(-0.01)).await,
            Err(StorageError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible_and_dropped() {
        let store = MemoryLedgerStore::new();
        store.insert_account(1, dec!(100)).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.read_balance_for_update(1).await.unwrap(), dec!(100));
        tx.write_balance(1, dec!(40)).await.unwrap();
        tx.append_record(&NewTransactionRecord::succeeded(1, 2, dec!(60)))
            .await
            .unwrap();

        // Plain reads only see committed state
        assert_eq!(store.read_balance(1).await.unwrap(), dec!(100));

        drop(tx);
        assert_eq!(store.read_balance(1).await.unwrap(), dec!(100));
        assert!(store.records().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_publishes_writes_and_records() {
        let store = MemoryLedgerStore::new();
        store.insert_account(1, dec!(100)).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.read_balance_for_update(1).await.unwrap();
        tx.write_balance(1, dec!(40)).await.unwrap();
        tx.append_record(&NewTransactionRecord::succeeded(1, 2, dec!(60)))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.read_balance(1).await.unwrap(), dec!(40));
        assert_eq!(store.records().unwrap().len(), 1);
        assert_eq!(store.list_records(2, 10).await.unwrap().len(), 1);
        assert!(store.list_records(3, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_requires_lock_and_non_negative() {
        let store = MemoryLedgerStore::new();
        store.insert_account(1, dec!(1)).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(matches!(
            tx.write_balance(1, dec!(2)).await,
            Err(StorageError::InvalidState(_))
        ));
        tx.read_balance_for_update(1).await.unwrap();
        assert!(matches!(
            tx.write_balance(1, dec!(-1)).await,
            Err(StorageError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_row_lock_blocks_second_transaction() {
        let store = MemoryLedgerStore::new();
        store.insert_account(1, dec!(5)).await.unwrap();

        let mut first = store.begin().await.unwrap();
        first.read_balance_for_update(1).await.unwrap();

        let mut second = store.begin().await.unwrap();
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), second.read_balance_for_update(1))
                .await;
        assert!(blocked.is_err(), "second locker must wait");

        first.write_balance(1, dec!(3)).await.unwrap();
        first.commit().await.unwrap();

        // Lock released; the waiter sees the committed value
        assert_eq!(second.read_balance_for_update(1).await.unwrap(), dec!(3));
    }

    #[tokio::test]
    async fn test_list_records_newest_first_with_limit() {
        let store = MemoryLedgerStore::new();
        for i in 1..=3 {
            let mut tx = store.begin().await.unwrap();
            tx.append_record(&NewTransactionRecord::succeeded(1, 2, Decimal::from(i)))
                .await
                .unwrap();
            tx.commit().await.unwrap();
        }

        let recs = store.list_records(1, 2).await.unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].amount, dec!(3));
        assert_eq!(recs[1].amount, dec!(2));
    }
}
