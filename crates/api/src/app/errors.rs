use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use backoffice_auth::AuthzError;
use backoffice_infra::LedgerServiceError;

pub fn service_error_to_response(err: LedgerServiceError) -> Response {
    match err {
        LedgerServiceError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        LedgerServiceError::InvalidAmount(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invalid_amount", msg)
        }
        LedgerServiceError::Validation(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        LedgerServiceError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        LedgerServiceError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        LedgerServiceError::ConcurrentModification(msg) | LedgerServiceError::VersionMismatch(msg) => {
            json_error(StatusCode::CONFLICT, "concurrent_modification", msg)
        }
        LedgerServiceError::Unauthorized => {
            json_error(StatusCode::FORBIDDEN, "unauthorized", "unauthorized")
        }
        LedgerServiceError::Store(e) => {
            tracing::error!(error = %e, "storage failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Handler error; every variant renders as `{error, message}` JSON.
#[derive(Debug)]
pub enum ApiError {
    Service(LedgerServiceError),
    Forbidden(AuthzError),
    InvalidId(String),
}

impl From<LedgerServiceError> for ApiError {
    fn from(value: LedgerServiceError) -> Self {
        ApiError::Service(value)
    }
}

impl From<AuthzError> for ApiError {
    fn from(value: AuthzError) -> Self {
        ApiError::Forbidden(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Service(e) => service_error_to_response(e),
            ApiError::Forbidden(e) => json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string()),
            ApiError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        }
    }
}
