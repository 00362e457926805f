//! Directory records referenced by ledger entries: worksites, work groups,
//! companies, and site personnel.
//!
//! Pure domain logic only (validation and state transitions).

pub mod record;
pub mod site;
pub mod personnel;

pub use personnel::{Personnel, PersonnelDraft};
pub use record::DirectoryRecord;
pub use site::{Company, CompanyDraft, WorkGroup, WorkGroupDraft, Worksite, WorksiteDraft};
