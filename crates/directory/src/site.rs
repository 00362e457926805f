//! Name-only directory records: worksites, work groups and companies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use backoffice_core::{CompanyId, DomainResult, Entity, GroupId, UserId, WorksiteId};

use crate::record::{DirectoryRecord, required_name};

macro_rules! named_record {
    ($(#[$doc:meta])* $record:ident, $draft:ident, $id:ty, $kind:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $record {
            pub id: $id,
            pub name: String,
            pub created_by: Option<UserId>,
            pub created_at: DateTime<Utc>,
            pub updated_at: DateTime<Utc>,
        }

        #[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
        pub struct $draft {
            pub name: String,
        }

        impl Entity for $record {
            type Id = $id;

            fn id(&self) -> &Self::Id {
                &self.id
            }
        }

        impl DirectoryRecord for $record {
            type Draft = $draft;

            const KIND: &'static str = $kind;

            fn create(
                id: Self::Id,
                draft: Self::Draft,
                created_by: Option<UserId>,
                now: DateTime<Utc>,
            ) -> DomainResult<Self> {
                Ok(Self {
                    id,
                    name: required_name(&draft.name)?,
                    created_by,
                    created_at: now,
                    updated_at: now,
                })
            }

            fn replace(&mut self, draft: Self::Draft, now: DateTime<Utc>) -> DomainResult<()> {
                self.name = required_name(&draft.name)?;
                self.updated_at = now;
                Ok(())
            }

            fn created_at(&self) -> DateTime<Utc> {
                self.created_at
            }
        }
    };
}

named_record!(
    /// A construction site; entries and personnel can be attached to it.
    Worksite,
    WorksiteDraft,
    WorksiteId,
    "worksite"
);

named_record!(
    /// A work group (crew or cost group) used to classify entries.
    WorkGroup,
    WorkGroupDraft,
    GroupId,
    "group"
);

named_record!(
    /// A company an entry is booked under.
    Company,
    CompanyDraft,
    CompanyId,
    "company"
);

#[cfg(test)]
mod tests {
    use super::*;
    use backoffice_core::DomainError;

    #[test]
    fn names_are_trimmed_and_required() {
        let now = Utc::now();
        let ws = Worksite::create(
            WorksiteId::new(),
            WorksiteDraft { name: " Kadıköy Blok A ".to_string() },
            None,
            now,
        )
        .unwrap();
        assert_eq!(ws.name, "Kadıköy Blok A");

        let err = Company::create(
            CompanyId::new(),
            CompanyDraft { name: String::new() },
            None,
            now,
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn replace_keeps_creation_metadata() {
        let created = Utc::now();
        let mut group = WorkGroup::create(
            GroupId::new(),
            WorkGroupDraft { name: "Kaba inşaat".to_string() },
            Some(UserId::new()),
            created,
        )
        .unwrap();
        let author = group.created_by;

        group
            .replace(WorkGroupDraft { name: "İnce işler".to_string() }, Utc::now())
            .unwrap();
        assert_eq!(group.name, "İnce işler");
        assert_eq!(group.created_at, created);
        assert_eq!(group.created_by, author);
    }
}
