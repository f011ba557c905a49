//! Ledger core
//!
//! Account balances plus the append-only audit log of transfer attempts.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐    ┌──────────────────┐    ┌─────────────────────┐
//! │   Gateway    │───▶│  TransferEngine  │───▶│ LedgerStore / Tx    │
//! │ (axum, JSON) │    │ (lock order,     │    │ (PostgreSQL rows,   │
//! └──────────────┘    │  funds, audit)   │    │  FOR UPDATE locks)  │
//!                     └──────────────────┘    └─────────────────────┘
//! ```
//!
//! Concurrency correctness lives in the store's row locks, not in process
//! memory, so several engine instances can share one database.

pub mod engine;
pub mod error;
#[cfg(feature = "mock-store")]
pub mod memory;
pub mod postgres;
pub mod store;
pub mod types;

// Re-exports for convenience
pub use engine::{LedgerService, MAX_HISTORY_LIMIT, TransferEngine};
pub use error::{LedgerError, StorageError};
#[cfg(feature = "mock-store")]
pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;
pub use store::{LedgerStore, LedgerTx};
pub use types::{AccountId, NewTransactionRecord, TransactionRecord, TransferStatus};
