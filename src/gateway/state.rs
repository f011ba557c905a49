use std::sync::Arc;

use crate::ledger::LedgerService;

/// Gateway shared state
#[derive(Clone)]
pub struct AppState {
    /// Transfer engine (or a test double)
    pub ledger: Arc<dyn LedgerService>,
    /// Default page size for `GET /accounts/{id}/transactions`
    pub history_limit: i64,
}

impl AppState {
    pub fn new(ledger: Arc<dyn LedgerService>, history_limit: i64) -> Self {
        Self {
            ledger,
            history_limit,
        }
    }
}
