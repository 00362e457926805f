//! Ledger write pipeline.
//!
//! ```text
//! request
//!   -> validate draft + directory references (no transaction yet)
//!   -> begin serializable transaction
//!   -> lock entry / customers, optimistic version check
//!   -> balance engine hooks + entry write
//!   -> commit
//! ```
//!
//! A storage-level `ConcurrentModification` (serialization failure, deadlock)
//! restarts the whole transaction, up to `max_retries` times. A stale
//! `expected_version` from the caller is reported immediately.

use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use backoffice_core::{CustomerId, ExpectedVersion, LedgerEntryId, UserId, Versioned, WorksiteId};
use backoffice_ledger::{
    BalanceDrift, Customer, CustomerDraft, EntryFilter, LedgerEntry, LedgerEntryDraft,
};

use crate::audit::{BalanceAuditReport, audit_balances};
use crate::engine::BalanceEngine;
use crate::error::LedgerServiceError;
use crate::records::{DirectoryKind, DirectoryStores};
use crate::store::{LedgerStore, LedgerTransaction};

pub const DEFAULT_WRITE_RETRIES: u32 = 3;

/// Result of an entry write: the entry as stored and its owning customer
/// after the balance moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryWrite {
    pub entry: LedgerEntry,
    pub customer: Customer,
}

pub struct LedgerService<S> {
    store: S,
    directory: DirectoryStores,
    engine: BalanceEngine,
    max_retries: u32,
}

impl<S> LedgerService<S> {
    pub fn new(store: S, directory: DirectoryStores) -> Self {
        Self {
            store,
            directory,
            engine: BalanceEngine::new(),
            max_retries: DEFAULT_WRITE_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn directory(&self) -> &DirectoryStores {
        &self.directory
    }
}

impl<S: LedgerStore> LedgerService<S> {
    async fn retrying<T, F, Fut>(
        &self,
        operation: &'static str,
        mut attempt: F,
    ) -> Result<T, LedgerServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LedgerServiceError>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Err(e) if e.is_retryable() && retries < self.max_retries => {
                    retries += 1;
                    warn!(operation, attempt = retries, error = %e, "retrying ledger transaction");
                }
                other => return other,
            }
        }
    }

    // ── customers ──────────────────────────────────────────────────────────

    #[instrument(skip(self, draft), err)]
    pub async fn create_customer(
        &self,
        draft: CustomerDraft,
        actor: Option<UserId>,
    ) -> Result<Customer, LedgerServiceError> {
        let customer = Customer::register(CustomerId::new(), draft, actor, Utc::now())?;
        let customer = &customer;

        self.retrying("create_customer", move || async move {
            let mut tx = self.store.begin().await?;
            tx.insert_customer(customer).await?;
            tx.commit().await?;
            Ok(())
        })
        .await?;

        info!(customer_id = %customer.id_typed(), "customer created");
        Ok(customer.clone())
    }

    #[instrument(skip(self, draft), fields(customer_id = %id), err)]
    pub async fn rename_customer(
        &self,
        id: CustomerId,
        draft: CustomerDraft,
    ) -> Result<Customer, LedgerServiceError> {
        draft.validate()?;
        let draft = &draft;

        self.retrying("rename_customer", move || async move {
            let mut tx = self.store.begin().await?;
            let mut customer = tx
                .lock_customer(id)
                .await?
                .ok_or_else(|| LedgerServiceError::NotFound(format!("customer {id}")))?;
            customer.rename(draft.clone(), Utc::now())?;
            tx.save_customer(&customer).await?;
            tx.commit().await?;
            Ok(customer)
        })
        .await
    }

    pub async fn get_customer(&self, id: CustomerId) -> Result<Customer, LedgerServiceError> {
        self.store
            .get_customer(id)
            .await?
            .ok_or_else(|| LedgerServiceError::NotFound(format!("customer {id}")))
    }

    pub async fn list_customers(&self) -> Result<Vec<Customer>, LedgerServiceError> {
        Ok(self.store.list_customers().await?)
    }

    /// Delete a customer. Refused with `Conflict` while entries reference it.
    #[instrument(skip(self), fields(customer_id = %id), err)]
    pub async fn delete_customer(&self, id: CustomerId) -> Result<(), LedgerServiceError> {
        self.retrying("delete_customer", move || async move {
            let mut tx = self.store.begin().await?;
            if !tx.delete_customer(id).await? {
                return Err(LedgerServiceError::NotFound(format!("customer {id}")));
            }
            tx.commit().await?;
            Ok(())
        })
        .await?;

        info!(customer_id = %id, "customer deleted");
        Ok(())
    }

    // ── entries ────────────────────────────────────────────────────────────

    #[instrument(skip(self, draft), fields(customer_id = %draft.customer), err)]
    pub async fn create_entry(
        &self,
        draft: LedgerEntryDraft,
        actor: Option<UserId>,
    ) -> Result<EntryWrite, LedgerServiceError> {
        self.check_entry_references(&draft).await?;
        let entry = LedgerEntry::create(LedgerEntryId::new(), draft, actor, Utc::now())?;
        let entry = &entry;

        let customer = self
            .retrying("create_entry", move || async move {
                let mut tx = self.store.begin().await?;
                let customer = self
                    .engine
                    .apply_entry_change(&mut tx, None, entry, Utc::now())
                    .await?;
                tx.commit().await?;
                Ok(customer)
            })
            .await?;

        info!(
            entry_id = %entry.id,
            customer_id = %customer.id_typed(),
            balance = %customer.balance(),
            status = %customer.balance_status(),
            "ledger entry created"
        );
        Ok(EntryWrite {
            entry: entry.clone(),
            customer,
        })
    }

    /// Replace an entry. Updating an entry that does not exist is `NotFound`.
    #[instrument(skip(self, draft), fields(entry_id = %id), err)]
    pub async fn update_entry(
        &self,
        id: LedgerEntryId,
        draft: LedgerEntryDraft,
        expected: ExpectedVersion,
    ) -> Result<EntryWrite, LedgerServiceError> {
        draft.validate()?;
        self.check_entry_references(&draft).await?;
        let draft = &draft;

        let written = self
            .retrying("update_entry", move || async move {
                let mut tx = self.store.begin().await?;
                let old = load_for_write(&mut tx, id, expected).await?;
                let now = Utc::now();
                let new = old.revise(draft.clone(), now)?;
                let customer = self
                    .engine
                    .apply_entry_change(&mut tx, Some(&old), &new, now)
                    .await?;
                tx.commit().await?;
                Ok(EntryWrite { entry: new, customer })
            })
            .await?;

        info!(
            entry_id = %id,
            customer_id = %written.customer.id_typed(),
            balance = %written.customer.balance(),
            status = %written.customer.balance_status(),
            version = written.entry.version,
            "ledger entry updated"
        );
        Ok(written)
    }

    /// Delete an entry and return its former owner after the balance moved.
    #[instrument(skip(self), fields(entry_id = %id), err)]
    pub async fn delete_entry(
        &self,
        id: LedgerEntryId,
        expected: ExpectedVersion,
    ) -> Result<Customer, LedgerServiceError> {
        let customer = self
            .retrying("delete_entry", move || async move {
                let mut tx = self.store.begin().await?;
                let old = load_for_write(&mut tx, id, expected).await?;
                let customer = self
                    .engine
                    .remove_entry_contribution(&mut tx, &old, Utc::now())
                    .await?;
                tx.commit().await?;
                Ok(customer)
            })
            .await?;

        info!(
            entry_id = %id,
            customer_id = %customer.id_typed(),
            balance = %customer.balance(),
            status = %customer.balance_status(),
            "ledger entry deleted"
        );
        Ok(customer)
    }

    pub async fn get_entry(&self, id: LedgerEntryId) -> Result<LedgerEntry, LedgerServiceError> {
        self.store
            .get_entry(id)
            .await?
            .ok_or_else(|| LedgerServiceError::NotFound(format!("ledger entry {id}")))
    }

    pub async fn list_entries(
        &self,
        filter: &EntryFilter,
    ) -> Result<Vec<LedgerEntry>, LedgerServiceError> {
        Ok(self.store.list_entries(filter).await?)
    }

    /// Whether any entry matches `filter` (directory delete guard).
    pub async fn has_entries(&self, filter: &EntryFilter) -> Result<bool, LedgerServiceError> {
        Ok(!self.store.list_entries(filter).await?.is_empty())
    }

    /// Refuse drafts pointing at directory records that do not exist.
    async fn check_entry_references(
        &self,
        draft: &LedgerEntryDraft,
    ) -> Result<(), LedgerServiceError> {
        self.ensure_worksite(draft.worksite).await?;
        if let Some(id) = draft.group {
            if self.directory.groups.get(id).await?.is_none() {
                return Err(LedgerServiceError::Validation(format!("unknown group {id}")));
            }
        }
        if let Some(id) = draft.company {
            if self.directory.companies.get(id).await?.is_none() {
                return Err(LedgerServiceError::Validation(format!("unknown company {id}")));
            }
        }
        Ok(())
    }

    pub async fn ensure_worksite(&self, id: Option<WorksiteId>) -> Result<(), LedgerServiceError> {
        if let Some(id) = id {
            if self.directory.worksites.get(id).await?.is_none() {
                return Err(LedgerServiceError::Validation(format!("unknown worksite {id}")));
            }
        }
        Ok(())
    }

    // ── directory ──────────────────────────────────────────────────────────

    #[instrument(skip(self, draft), fields(kind = R::KIND), err)]
    pub async fn create_record<R: DirectoryKind>(
        &self,
        draft: R::Draft,
        actor: Option<UserId>,
    ) -> Result<R, LedgerServiceError> {
        self.ensure_worksite(R::worksite_of(&draft)).await?;
        let record = R::create(Uuid::now_v7().into(), draft, actor, Utc::now())?;
        R::store(&self.directory).upsert(&record).await?;

        info!(kind = R::KIND, id = %record.id(), "directory record created");
        Ok(record)
    }

    /// Full replace; creation metadata is kept.
    #[instrument(skip(self, draft), fields(kind = R::KIND), err)]
    pub async fn update_record<R: DirectoryKind>(
        &self,
        id: R::Id,
        draft: R::Draft,
    ) -> Result<R, LedgerServiceError> {
        self.ensure_worksite(R::worksite_of(&draft)).await?;
        let mut record = self.get_record::<R>(id).await?;
        record.replace(draft, Utc::now())?;
        R::store(&self.directory).upsert(&record).await?;

        info!(kind = R::KIND, id = %id, "directory record updated");
        Ok(record)
    }

    pub async fn get_record<R: DirectoryKind>(&self, id: R::Id) -> Result<R, LedgerServiceError> {
        R::store(&self.directory)
            .get(id)
            .await?
            .ok_or_else(|| LedgerServiceError::NotFound(format!("{} {id}", R::KIND)))
    }

    pub async fn list_records<R: DirectoryKind>(&self) -> Result<Vec<R>, LedgerServiceError> {
        Ok(R::store(&self.directory).list().await?)
    }

    /// Records still referenced by ledger entries cannot be deleted.
    #[instrument(skip(self), fields(kind = R::KIND), err)]
    pub async fn delete_record<R: DirectoryKind>(&self, id: R::Id) -> Result<(), LedgerServiceError> {
        if let Some(filter) = R::referencing_entries(id) {
            if self.has_entries(&filter).await? {
                return Err(LedgerServiceError::Conflict(format!(
                    "{} {id} is referenced by ledger entries",
                    R::KIND
                )));
            }
        }

        if !R::store(&self.directory).delete(id).await? {
            return Err(LedgerServiceError::NotFound(format!("{} {id}", R::KIND)));
        }
        info!(kind = R::KIND, id = %id, "directory record deleted");
        Ok(())
    }

    // ── audit ──────────────────────────────────────────────────────────────

    /// `None` when the cached balance matches the customer's entries.
    #[instrument(skip(self), fields(customer_id = %id), err)]
    pub async fn audit_customer(
        &self,
        id: CustomerId,
    ) -> Result<Option<BalanceDrift>, LedgerServiceError> {
        let customer = self.get_customer(id).await?;
        let entries = self.store.list_entries(&EntryFilter::for_customer(id)).await?;
        let drift = BalanceDrift::detect(id, customer.balance(), &entries)?;
        if let Some(d) = &drift {
            warn!(customer_id = %id, cached = %d.cached, expected = %d.expected, "balance drift detected");
        }
        Ok(drift)
    }

    #[instrument(skip(self), err)]
    pub async fn audit_all(&self) -> Result<BalanceAuditReport, LedgerServiceError> {
        let customers = self.store.list_customers().await?;
        let entries = self.store.list_entries(&EntryFilter::default()).await?;
        let report = audit_balances(&customers, &entries)?;

        for d in &report.drifts {
            warn!(customer_id = %d.customer_id, cached = %d.cached, expected = %d.expected, "balance drift detected");
        }
        info!(checked = report.checked, drifted = report.drifts.len(), "balance audit finished");
        Ok(report)
    }

    /// Recompute a customer's cached balance from its entries.
    #[instrument(skip(self), fields(customer_id = %id), err)]
    pub async fn rebuild_customer_balance(
        &self,
        id: CustomerId,
    ) -> Result<Customer, LedgerServiceError> {
        let customer = self
            .retrying("rebuild_customer_balance", move || async move {
                let mut tx = self.store.begin().await?;
                let customer = self.engine.rebuild_balance(&mut tx, id, Utc::now()).await?;
                tx.commit().await?;
                Ok(customer)
            })
            .await?;

        info!(customer_id = %id, balance = %customer.balance(), "customer balance rebuilt");
        Ok(customer)
    }
}

/// Lock an entry for update/delete and check the caller's expected version.
async fn load_for_write<T: LedgerTransaction>(
    tx: &mut T,
    id: LedgerEntryId,
    expected: ExpectedVersion,
) -> Result<LedgerEntry, LedgerServiceError> {
    let entry = tx
        .find_entry(id)
        .await?
        .ok_or_else(|| LedgerServiceError::NotFound(format!("ledger entry {id}")))?;

    if !expected.matches(entry.version()) {
        return Err(LedgerServiceError::VersionMismatch(format!(
            "ledger entry {id} is at version {}, expected {expected:?}",
            entry.version()
        )));
    }
    Ok(entry)
}
