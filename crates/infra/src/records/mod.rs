//! Storage for directory records (worksites, groups, companies, personnel).
//!
//! One generic store per record kind. Records are small and have no
//! cross-record invariants, so no transactions are needed here.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use uuid::Uuid;

use backoffice_core::{CompanyId, GroupId, WorksiteId};
use backoffice_directory::{
    Company, DirectoryRecord, Personnel, PersonnelDraft, WorkGroup, Worksite,
};
use backoffice_ledger::EntryFilter;

use crate::store::StoreError;

pub mod postgres;

pub use postgres::PostgresRecordStore;

#[async_trait]
pub trait RecordStore<R: DirectoryRecord>: Send + Sync {
    async fn get(&self, id: R::Id) -> Result<Option<R>, StoreError>;

    /// Insert or replace a record.
    async fn upsert(&self, record: &R) -> Result<(), StoreError>;

    /// All records, newest first.
    async fn list(&self) -> Result<Vec<R>, StoreError>;

    /// Returns `false` when the record did not exist.
    async fn delete(&self, id: R::Id) -> Result<bool, StoreError>;
}

#[async_trait]
impl<R, S> RecordStore<R> for Arc<S>
where
    R: DirectoryRecord,
    S: RecordStore<R> + ?Sized,
{
    async fn get(&self, id: R::Id) -> Result<Option<R>, StoreError> {
        (**self).get(id).await
    }

    async fn upsert(&self, record: &R) -> Result<(), StoreError> {
        (**self).upsert(record).await
    }

    async fn list(&self) -> Result<Vec<R>, StoreError> {
        (**self).list().await
    }

    async fn delete(&self, id: R::Id) -> Result<bool, StoreError> {
        (**self).delete(id).await
    }
}

/// In-memory record store for tests/dev.
#[derive(Debug)]
pub struct InMemoryRecordStore<R> {
    inner: RwLock<HashMap<Uuid, R>>,
}

impl<R> InMemoryRecordStore<R> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<R> Default for InMemoryRecordStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

fn key<R: DirectoryRecord>(id: R::Id) -> Uuid {
    id.into()
}

fn poisoned(kind: &str) -> StoreError {
    StoreError::Backend(format!("{kind} store lock poisoned"))
}

#[async_trait]
impl<R: DirectoryRecord> RecordStore<R> for InMemoryRecordStore<R> {
    async fn get(&self, id: R::Id) -> Result<Option<R>, StoreError> {
        let map = self.inner.read().map_err(|_| poisoned(R::KIND))?;
        Ok(map.get(&key::<R>(id)).cloned())
    }

    async fn upsert(&self, record: &R) -> Result<(), StoreError> {
        let mut map = self.inner.write().map_err(|_| poisoned(R::KIND))?;
        map.insert(key::<R>(*record.id()), record.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<R>, StoreError> {
        let map = self.inner.read().map_err(|_| poisoned(R::KIND))?;
        let mut records: Vec<R> = map.values().cloned().collect();
        records.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| key::<R>(*b.id()).cmp(&key::<R>(*a.id())))
        });
        Ok(records)
    }

    async fn delete(&self, id: R::Id) -> Result<bool, StoreError> {
        let mut map = self.inner.write().map_err(|_| poisoned(R::KIND))?;
        Ok(map.remove(&key::<R>(id)).is_some())
    }
}

/// The four directory stores, shared by the ledger service (reference checks)
/// and the HTTP layer (CRUD).
#[derive(Clone)]
pub struct DirectoryStores {
    pub worksites: Arc<dyn RecordStore<Worksite>>,
    pub groups: Arc<dyn RecordStore<WorkGroup>>,
    pub companies: Arc<dyn RecordStore<Company>>,
    pub personnel: Arc<dyn RecordStore<Personnel>>,
}

impl DirectoryStores {
    pub fn in_memory() -> Self {
        Self {
            worksites: Arc::new(InMemoryRecordStore::new()),
            groups: Arc::new(InMemoryRecordStore::new()),
            companies: Arc::new(InMemoryRecordStore::new()),
            personnel: Arc::new(InMemoryRecordStore::new()),
        }
    }

    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self {
            worksites: Arc::new(PostgresRecordStore::new(pool.clone())),
            groups: Arc::new(PostgresRecordStore::new(pool.clone())),
            companies: Arc::new(PostgresRecordStore::new(pool.clone())),
            personnel: Arc::new(PostgresRecordStore::new(pool)),
        }
    }
}

/// Access to the store for one record kind, plus how the kind relates to
/// ledger entries.
pub trait DirectoryKind: DirectoryRecord {
    fn store(stores: &DirectoryStores) -> &Arc<dyn RecordStore<Self>>;

    /// Worksite a draft points at; it must exist before the record is written.
    fn worksite_of(_draft: &Self::Draft) -> Option<WorksiteId> {
        None
    }

    /// Entries that keep a record of this kind alive. `None` for kinds that
    /// entries never reference.
    fn referencing_entries(_id: Self::Id) -> Option<EntryFilter> {
        None
    }
}

impl DirectoryKind for Worksite {
    fn store(stores: &DirectoryStores) -> &Arc<dyn RecordStore<Self>> {
        &stores.worksites
    }

    fn referencing_entries(id: WorksiteId) -> Option<EntryFilter> {
        Some(EntryFilter {
            worksite: Some(id),
            ..EntryFilter::default()
        })
    }
}

impl DirectoryKind for WorkGroup {
    fn store(stores: &DirectoryStores) -> &Arc<dyn RecordStore<Self>> {
        &stores.groups
    }

    fn referencing_entries(id: GroupId) -> Option<EntryFilter> {
        Some(EntryFilter {
            group: Some(id),
            ..EntryFilter::default()
        })
    }
}

impl DirectoryKind for Company {
    fn store(stores: &DirectoryStores) -> &Arc<dyn RecordStore<Self>> {
        &stores.companies
    }

    fn referencing_entries(id: CompanyId) -> Option<EntryFilter> {
        Some(EntryFilter {
            company: Some(id),
            ..EntryFilter::default()
        })
    }
}

impl DirectoryKind for Personnel {
    fn store(stores: &DirectoryStores) -> &Arc<dyn RecordStore<Self>> {
        &stores.personnel
    }

    fn worksite_of(draft: &PersonnelDraft) -> Option<WorksiteId> {
        draft.worksite
    }
}
