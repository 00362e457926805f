//! CRUD for directory records; one generic handler set per record kind.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use uuid::Uuid;

use backoffice_auth::Permission;
use backoffice_infra::{DirectoryKind, LedgerService, LedgerStore};

use crate::app::dto::parse_id;
use crate::app::errors::ApiError;
use crate::app::routes::common::CmdAuth;
use crate::authz::authorize_command;
use crate::context::PrincipalContext;

pub fn router<S: LedgerStore, R: DirectoryKind>(base: &str) -> Router {
    Router::new()
        .route(base, post(create::<S, R>).get(list::<S, R>))
        .route(
            &format!("{base}/:id"),
            get(get_one::<S, R>).put(update::<S, R>).delete(delete::<S, R>),
        )
}

fn record_id<R: DirectoryKind>(raw: &str) -> Result<R::Id, ApiError> {
    Ok(parse_id::<Uuid>(raw, R::KIND)?.into())
}

pub async fn create<S: LedgerStore, R: DirectoryKind>(
    Extension(ledger): Extension<Arc<LedgerService<S>>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<R::Draft>,
) -> Result<Response, ApiError> {
    let cmd = CmdAuth::new(body, Permission::DIRECTORY_WRITE);
    authorize_command(&principal, &cmd)?;

    let record: R = ledger
        .create_record(cmd.inner, Some(principal.user_id()))
        .await?;
    Ok((StatusCode::CREATED, Json(record)).into_response())
}

pub async fn list<S: LedgerStore, R: DirectoryKind>(
    Extension(ledger): Extension<Arc<LedgerService<S>>>,
) -> Result<Response, ApiError> {
    let items = ledger.list_records::<R>().await?;
    Ok(Json(serde_json::json!({ "items": items })).into_response())
}

pub async fn get_one<S: LedgerStore, R: DirectoryKind>(
    Extension(ledger): Extension<Arc<LedgerService<S>>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = record_id::<R>(&id)?;
    Ok(Json(ledger.get_record::<R>(id).await?).into_response())
}

pub async fn update<S: LedgerStore, R: DirectoryKind>(
    Extension(ledger): Extension<Arc<LedgerService<S>>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<R::Draft>,
) -> Result<Response, ApiError> {
    let id = record_id::<R>(&id)?;
    let cmd = CmdAuth::new(body, Permission::DIRECTORY_WRITE);
    authorize_command(&principal, &cmd)?;

    Ok(Json(ledger.update_record::<R>(id, cmd.inner).await?).into_response())
}

pub async fn delete<S: LedgerStore, R: DirectoryKind>(
    Extension(ledger): Extension<Arc<LedgerService<S>>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = record_id::<R>(&id)?;
    authorize_command(&principal, &CmdAuth::new(id, Permission::DIRECTORY_WRITE))?;

    ledger.delete_record::<R>(id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
