//! Internal Transfers - account ledger with atomic transfers
//!
//! # Modules
//!
//! - [`ledger`] - Transfer engine, storage seam and audit records
//! - [`gateway`] - HTTP API (axum)
//! - [`db`] - PostgreSQL pool and schema
//! - [`config`] - YAML configuration with environment overrides
//! - [`logging`] - tracing subscriber setup

pub mod config;
pub mod db;
pub mod gateway;
pub mod ledger;
pub mod logging;

// Convenient re-exports at crate root
pub use config::AppConfig;
pub use ledger::{
    AccountId, LedgerError, LedgerService, LedgerStore, PgLedgerStore, TransactionRecord,
    TransferEngine, TransferStatus,
};
