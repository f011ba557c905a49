//! OpenAPI documentation
//!
//! - OpenAPI JSON: `http://localhost:8080/api-docs/openapi.json`

use utoipa::OpenApi;

use crate::gateway::types::{
    AccountResponse, CreateAccountRequest, HealthResponse, TransactionRequest, TransactionView,
    TransferResponse,
};

/// Main API Documentation struct
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Internal Transfers API",
        version = "1.0.0",
        description = "Account balances and atomic account-to-account transfers with a full audit log.",
        license(name = "MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Development"),
    ),
    paths(
        crate::gateway::handlers::create_account,
        crate::gateway::handlers::get_account,
        crate::gateway::handlers::create_transaction,
        crate::gateway::handlers::list_account_transactions,
        crate::gateway::handlers::healthz,
        crate::gateway::handlers::readyz,
    ),
    components(schemas(
        CreateAccountRequest,
        TransactionRequest,
        AccountResponse,
        TransferResponse,
        TransactionView,
        HealthResponse,
    )),
    tags(
        (name = "Accounts", description = "Account creation and balance queries"),
        (name = "Transactions", description = "Transfers and audit history"),
        (name = "System", description = "Liveness and readiness probes"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        for p in [
            "/accounts",
            "/accounts/{account_id}",
            "/transactions",
            "/accounts/{account_id}/transactions",
            "/healthz",
            "/readyz",
        ] {
            assert!(paths.iter().any(|k| k.as_str() == p), "missing {}", p);
        }
    }

    #[test]
    fn test_openapi_serializes() {
        let json = ApiDoc::openapi().to_json().unwrap();
        assert!(json.contains("Internal Transfers API"));
    }
}
