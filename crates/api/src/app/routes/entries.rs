use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use backoffice_auth::Permission;
use backoffice_core::LedgerEntryId;
use backoffice_infra::{LedgerService, LedgerStore};
use backoffice_ledger::{EntryFilter, LedgerEntryDraft};

use crate::app::dto::{VersionQuery, parse_id};
use crate::app::errors::ApiError;
use crate::app::routes::common::CmdAuth;
use crate::authz::authorize_command;
use crate::context::PrincipalContext;

pub fn router<S: LedgerStore>() -> Router {
    Router::new()
        .route("/entries", post(create_entry::<S>).get(list_entries::<S>))
        .route(
            "/entries/:id",
            get(get_entry::<S>)
                .put(update_entry::<S>)
                .delete(delete_entry::<S>),
        )
}

/// Responds with the stored entry and its customer after the balance moved.
pub async fn create_entry<S: LedgerStore>(
    Extension(ledger): Extension<Arc<LedgerService<S>>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<LedgerEntryDraft>,
) -> Result<Response, ApiError> {
    let cmd = CmdAuth::new(body, Permission::ENTRIES_WRITE);
    authorize_command(&principal, &cmd)?;

    let written = ledger
        .create_entry(cmd.inner, Some(principal.user_id()))
        .await?;
    Ok((StatusCode::CREATED, Json(written)).into_response())
}

pub async fn list_entries<S: LedgerStore>(
    Extension(ledger): Extension<Arc<LedgerService<S>>>,
    Query(filter): Query<EntryFilter>,
) -> Result<Response, ApiError> {
    let items = ledger.list_entries(&filter).await?;
    Ok(Json(serde_json::json!({ "items": items })).into_response())
}

pub async fn get_entry<S: LedgerStore>(
    Extension(ledger): Extension<Arc<LedgerService<S>>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id: LedgerEntryId = parse_id(&id, "ledger entry")?;
    Ok(Json(ledger.get_entry(id).await?).into_response())
}

pub async fn update_entry<S: LedgerStore>(
    Extension(ledger): Extension<Arc<LedgerService<S>>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Query(version): Query<VersionQuery>,
    Json(body): Json<LedgerEntryDraft>,
) -> Result<Response, ApiError> {
    let id: LedgerEntryId = parse_id(&id, "ledger entry")?;
    let cmd = CmdAuth::new(body, Permission::ENTRIES_WRITE);
    authorize_command(&principal, &cmd)?;

    let written = ledger
        .update_entry(id, cmd.inner, version.expected())
        .await?;
    Ok(Json(written).into_response())
}

/// Responds with the former owner after the entry's contribution was removed.
pub async fn delete_entry<S: LedgerStore>(
    Extension(ledger): Extension<Arc<LedgerService<S>>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Query(version): Query<VersionQuery>,
) -> Result<Response, ApiError> {
    let id: LedgerEntryId = parse_id(&id, "ledger entry")?;
    authorize_command(&principal, &CmdAuth::new(id, Permission::ENTRIES_WRITE))?;

    let customer = ledger.delete_entry(id, version.expected()).await?;
    Ok(Json(serde_json::json!({ "customer": customer })).into_response())
}
