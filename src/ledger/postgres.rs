//! PostgreSQL ledger store
//!
//! Uses the `accounts` and `transactions` tables from
//! `migrations/0001_init.sql`. Row locks are taken with `SELECT ... FOR UPDATE`
//! and held until the surrounding transaction commits or rolls back.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::time::Duration;
use tracing::debug;

use super::error::StorageError;
use super::store::{LedgerStore, LedgerTx};
use super::types::{AccountId, NewTransactionRecord, TransactionRecord, TransferStatus};

/// PostgreSQL-backed [`LedgerStore`]
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
    /// Server-side cap on lock waits and statements inside a transaction
    wait_limit: Option<Duration>,
}

impl PgLedgerStore {
    /// Create a new store over an existing connection pool
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            wait_limit: None,
        }
    }

    /// Make the server abort lock waits and statements before a caller
    /// bounded by `request_timeout` gives up.
    ///
    /// A dropped client future cannot cancel a backend blocked in
    /// `SELECT ... FOR UPDATE`; that backend keeps every row lock it already
    /// holds until the wait ends. With this limit the wait ends first, the
    /// error surfaces as [`StorageError::Timeout`] and the engine rolls back.
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.wait_limit = Some(server_wait_limit(request_timeout));
        self
    }
}

/// Four fifths of the request timeout, at least 1ms
fn server_wait_limit(request_timeout: Duration) -> Duration {
    (request_timeout * 4 / 5).max(Duration::from_millis(1))
}

/// Open transaction on a pooled connection
pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

/// Translate constraint violations into adapter errors
fn map_write_error(e: sqlx::Error, account_id: AccountId) -> StorageError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StorageError::DuplicateAccount(account_id);
        }
        if db.is_check_violation() {
            return StorageError::InvalidState(format!(
                "check constraint violated for account {}",
                account_id
            ));
        }
    }
    StorageError::from(e)
}

fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<TransactionRecord, StorageError> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<TransferStatus>()
        .map_err(StorageError::InvalidState)?;

    Ok(TransactionRecord {
        id: row.try_get("id")?,
        created_at: row.try_get("created_at")?,
        source_account_id: row.try_get("source_account_id")?,
        destination_account_id: row.try_get("destination_account_id")?,
        amount: row.try_get("amount")?,
        status,
        error_message: row.try_get("error_message")?,
    })
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    type Tx = PgLedgerTx;

    fn name(&self) -> &'static str {
        "postgres"
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

        sqlx::query("INSERT INTO accounts (account_id, balance) VALUES ($1, $2)")
            .bind(account_id)
            .bind(initial_balance)
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error(e, account_id))?;

        Ok(())
    }

    async fn read_balance(&self, account_id: AccountId) -> Result<Decimal, StorageError> {
        sqlx::query_scalar::<_, Decimal>("SELECT balance FROM accounts WHERE account_id = $1")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::AccountNotFound(account_id))
    }

    async fn begin(&self) -> Result<PgLedgerTx, StorageError> {
        let mut tx = self.pool.begin().await?;
        if let Some(limit) = self.wait_limit {
            // Transaction-scoped: reset at COMMIT or ROLLBACK
            let millis = format!("{}ms", limit.as_millis());
            sqlx::query(
                "SELECT set_config('lock_timeout', $1, true), \
                        set_config('statement_timeout', $1, true)",
            )
            .bind(millis)
            .execute(&mut *tx)
            .await?;
        }
        Ok(PgLedgerTx { tx })
    }

    async fn list_records(
        &self,
        account_id: AccountId,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT id, created_at, source_account_id, destination_account_id,
                   amount, status, error_message
            FROM transactions
            WHERE source_account_id = $1 OR destination_account_id = $1
            ORDER BY id DESC
            LIMIT $2
            "#,
        )
        .bind(account_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(row_to_record(row)?);
        }
        Ok(records)
    }

    async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn read_balance_for_update(
        &mut self,
        account_id: AccountId,
    ) -> Result<Decimal, StorageError> {
        let balance = sqlx::query_scalar::<_, Decimal>(
            "SELECT balance FROM accounts WHERE account_id = $1 FOR UPDATE",
        )
        .bind(account_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        debug!(account_id, locked = balance.is_some(), "Row lock acquired");
        balance.ok_or(StorageError::AccountNotFound(account_id))
    }

    async fn write_balance(
        &mut self,
        account_id: AccountId,
        new_balance: Decimal,
    ) -> Result<(), StorageError> {
        let result = sqlx::query("UPDATE accounts SET balance = $1 WHERE account_id = $2")
            .bind(new_balance)
            .bind(account_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_write_error(e, account_id))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::AccountNotFound(account_id));
        }
        Ok(())
    }

    async fn append_record(&mut self, record: &NewTransactionRecord) -> Result<i64, StorageError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO transactions
                (source_account_id, destination_account_id, amount, status, error_message)
            VALUES
                ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(record.source_account_id)
        .bind(record.destination_account_id)
        .bind(record.amount)
        .bind(record.status.as_str())
        .bind(record.error_message.as_deref())
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(id)
    }

    async fn commit(self) -> Result<(), StorageError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StorageError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
