use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use uuid::Uuid;

use backoffice_core::{DomainResult, Entity, UserId};

/// Common lifecycle for directory records.
///
/// Lets storage and HTTP layers handle every record kind with one generic
/// implementation. Ids are plain UUID newtypes so stores can key on them.
pub trait DirectoryRecord:
    Entity<Id: Copy + Into<Uuid> + From<Uuid> + core::fmt::Display + Send + Sync + 'static>
    + Clone
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Client-supplied fields for create and full replace.
    type Draft: DeserializeOwned + Send + 'static;

    /// Stable kind name (storage partition, log field, error messages).
    const KIND: &'static str;

    fn create(
        id: Self::Id,
        draft: Self::Draft,
        created_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self>;

    fn replace(&mut self, draft: Self::Draft, now: DateTime<Utc>) -> DomainResult<()>;

    fn created_at(&self) -> DateTime<Utc>;
}

pub(crate) fn required_name(name: &str) -> DomainResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(backoffice_core::DomainError::validation("name cannot be empty"));
    }
    Ok(trimmed.to_string())
}
