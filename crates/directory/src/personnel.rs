use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use backoffice_core::{DomainError, DomainResult, Entity, PersonnelId, UserId, WorksiteId};

use crate::record::{DirectoryRecord, required_name};

/// A person employed on a worksite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Personnel {
    pub id: PersonnelId,
    pub name: String,
    /// National identity number (digits only).
    pub identity_number: String,
    /// First working day.
    pub entry: Option<NaiveDate>,
    /// Last working day, if the person has left.
    pub exit: Option<NaiveDate>,
    pub worksite: Option<WorksiteId>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PersonnelDraft {
    pub name: String,
    pub identity_number: String,
    pub entry: Option<NaiveDate>,
    pub exit: Option<NaiveDate>,
    pub worksite: Option<WorksiteId>,
}

impl PersonnelDraft {
    fn validated(self) -> DomainResult<Self> {
        let name = required_name(&self.name)?;

        let identity_number = self.identity_number.trim().to_string();
        if identity_number.is_empty() || !identity_number.chars().all(|c| c.is_ascii_digit()) {
            return Err(DomainError::validation(
                "identity_number must be a non-empty string of digits",
            ));
        }

        if let (Some(entry), Some(exit)) = (self.entry, self.exit) {
            if exit < entry {
                return Err(DomainError::validation("exit date is before entry date"));
            }
        }

        Ok(Self {
            name,
            identity_number,
            ..self
        })
    }
}

impl Entity for Personnel {
    type Id = PersonnelId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl DirectoryRecord for Personnel {
    type Draft = PersonnelDraft;

    const KIND: &'static str = "personnel";

    fn create(
        id: Self::Id,
        draft: Self::Draft,
        created_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let draft = draft.validated()?;
        Ok(Self {
            id,
            name: draft.name,
            identity_number: draft.identity_number,
            entry: draft.entry,
            exit: draft.exit,
            worksite: draft.worksite,
            created_by,
            created_at: now,
            updated_at: now,
        })
    }

    fn replace(&mut self, draft: Self::Draft, now: DateTime<Utc>) -> DomainResult<()> {
        let draft = draft.validated()?;
        self.name = draft.name;
        self.identity_number = draft.identity_number;
        self.entry = draft.entry;
        self.exit = draft.exit;
        self.worksite = draft.worksite;
        self.updated_at = now;
        Ok(())
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
