use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use backoffice_auth::Permission;
use backoffice_core::CustomerId;
use backoffice_infra::{LedgerService, LedgerStore};
use backoffice_ledger::{CustomerDraft, EntryFilter};

use crate::app::dto::parse_id;
use crate::app::errors::ApiError;
use crate::app::routes::common::CmdAuth;
use crate::authz::authorize_command;
use crate::context::PrincipalContext;

pub fn router<S: LedgerStore>() -> Router {
    Router::new()
        .route("/customers", post(create_customer::<S>).get(list_customers::<S>))
        .route(
            "/customers/:id",
            get(get_customer::<S>)
                .put(rename_customer::<S>)
                .delete(delete_customer::<S>),
        )
        .route("/customers/:id/entries", get(list_customer_entries::<S>))
        .route("/customers/:id/audit", get(audit_customer::<S>))
        .route("/customers/:id/rebuild-balance", post(rebuild_balance::<S>))
}

pub async fn create_customer<S: LedgerStore>(
    Extension(ledger): Extension<Arc<LedgerService<S>>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<CustomerDraft>,
) -> Result<Response, ApiError> {
    let cmd = CmdAuth::new(body, Permission::CUSTOMERS_WRITE);
    authorize_command(&principal, &cmd)?;

    let customer = ledger
        .create_customer(cmd.inner, Some(principal.user_id()))
        .await?;
    Ok((StatusCode::CREATED, Json(customer)).into_response())
}

pub async fn list_customers<S: LedgerStore>(
    Extension(ledger): Extension<Arc<LedgerService<S>>>,
) -> Result<Response, ApiError> {
    let items = ledger.list_customers().await?;
    Ok(Json(serde_json::json!({ "items": items })).into_response())
}

pub async fn get_customer<S: LedgerStore>(
    Extension(ledger): Extension<Arc<LedgerService<S>>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id: CustomerId = parse_id(&id, "customer")?;
    Ok(Json(ledger.get_customer(id).await?).into_response())
}

/// Only the name is writable; balance and status move through entries.
pub async fn rename_customer<S: LedgerStore>(
    Extension(ledger): Extension<Arc<LedgerService<S>>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<CustomerDraft>,
) -> Result<Response, ApiError> {
    let id: CustomerId = parse_id(&id, "customer")?;
    let cmd = CmdAuth::new(body, Permission::CUSTOMERS_WRITE);
    authorize_command(&principal, &cmd)?;

    Ok(Json(ledger.rename_customer(id, cmd.inner).await?).into_response())
}

pub async fn delete_customer<S: LedgerStore>(
    Extension(ledger): Extension<Arc<LedgerService<S>>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id: CustomerId = parse_id(&id, "customer")?;
    authorize_command(&principal, &CmdAuth::new(id, Permission::CUSTOMERS_WRITE))?;

    ledger.delete_customer(id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn list_customer_entries<S: LedgerStore>(
    Extension(ledger): Extension<Arc<LedgerService<S>>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id: CustomerId = parse_id(&id, "customer")?;
    // 404 for unknown customers rather than an empty list
    ledger.get_customer(id).await?;

    let items = ledger.list_entries(&EntryFilter::for_customer(id)).await?;
    Ok(Json(serde_json::json!({ "items": items })).into_response())
}

pub async fn audit_customer<S: LedgerStore>(
    Extension(ledger): Extension<Arc<LedgerService<S>>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id: CustomerId = parse_id(&id, "customer")?;
    let drift = ledger.audit_customer(id).await?;

    Ok(Json(serde_json::json!({
        "customer_id": id,
        "consistent": drift.is_none(),
        "drift": drift,
    }))
    .into_response())
}

pub async fn rebuild_balance<S: LedgerStore>(
    Extension(ledger): Extension<Arc<LedgerService<S>>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id: CustomerId = parse_id(&id, "customer")?;
    authorize_command(&principal, &CmdAuth::new(id, Permission::ENTRIES_WRITE))?;

    Ok(Json(ledger.rebuild_customer_balance(id).await?).into_response())
}
