use thiserror::Error;

use backoffice_core::DomainError;

use crate::store::StoreError;

/// Failure of a ledger or directory operation.
///
/// Unifies domain errors and storage errors so callers (the HTTP layer) map
/// one type to responses.
#[derive(Debug, Error)]
pub enum LedgerServiceError {
    /// A referenced customer, entry or directory record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// `debt`/`receivable` missing, negative or not a decimal.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// The write conflicts with existing data (e.g. deleting a referenced customer).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The storage layer aborted the transaction (serialization failure or
    /// deadlock). Retried internally up to the configured limit.
    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),

    /// The caller's `expected_version` is stale. Never retried.
    #[error("concurrent modification: {0}")]
    VersionMismatch(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("storage error: {0}")]
    Store(StoreError),
}

impl LedgerServiceError {
    /// Whether running the same operation again from scratch may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerServiceError::ConcurrentModification(_))
    }
}

impl From<StoreError> for LedgerServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(msg) => LedgerServiceError::NotFound(msg),
            StoreError::Conflict(msg) => LedgerServiceError::Conflict(msg),
            StoreError::ConcurrentModification(msg) => {
                LedgerServiceError::ConcurrentModification(msg)
            }
            other @ StoreError::Backend(_) => LedgerServiceError::Store(other),
        }
    }
}

impl From<DomainError> for LedgerServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => LedgerServiceError::Validation(msg),
            DomainError::InvalidAmount(msg) => LedgerServiceError::InvalidAmount(msg),
            DomainError::InvariantViolation(msg) => LedgerServiceError::InvariantViolation(msg),
            DomainError::InvalidId(msg) => LedgerServiceError::Validation(msg),
            DomainError::NotFound(what) => LedgerServiceError::NotFound(what),
            DomainError::Conflict(msg) => LedgerServiceError::Conflict(msg),
            DomainError::Unauthorized => LedgerServiceError::Unauthorized,
        }
    }
}
