use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    response::{IntoResponse, Response},
    routing::get,
};

use backoffice_infra::{LedgerService, LedgerStore};

use crate::app::errors::ApiError;

pub fn router<S: LedgerStore>() -> Router {
    Router::new().route("/audit/balances", get(audit_balances::<S>))
}

/// Cached balance vs. entry sum for every customer.
pub async fn audit_balances<S: LedgerStore>(
    Extension(ledger): Extension<Arc<LedgerService<S>>>,
) -> Result<Response, ApiError> {
    let report = ledger.audit_all().await?;
    Ok(Json(serde_json::json!({
        "checked": report.checked,
        "consistent": report.is_consistent(),
        "drifts": report.drifts,
    }))
    .into_response())
}
