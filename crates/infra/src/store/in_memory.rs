//! In-memory ledger store for tests and local development.
//!
//! One async mutex guards the whole state, so a transaction serializes with
//! every other transaction for its whole lifetime. Writes are staged inside
//! the transaction and applied to the shared state only on commit.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use backoffice_core::{CustomerId, LedgerEntryId};
use backoffice_ledger::{Customer, EntryFilter, LedgerEntry, sort_newest_first};

use super::{LedgerStore, LedgerTransaction, StoreError};

#[derive(Debug, Default)]
struct State {
    customers: HashMap<CustomerId, Customer>,
    entries: HashMap<LedgerEntryId, LedgerEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    state: Arc<Mutex<State>>,
    injected_conflicts: Arc<AtomicU32>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` commits fail with
    /// [`StoreError::ConcurrentModification`], as a serialization failure
    /// would on a real database.
    pub fn inject_commit_conflicts(&self, n: u32) {
        self.injected_conflicts.store(n, Ordering::SeqCst);
    }

    fn take_injected_conflict(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    type Tx = InMemoryLedgerTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        Ok(InMemoryLedgerTx {
            guard,
            customers: HashMap::new(),
            entries: HashMap::new(),
            fail_commit: self.take_injected_conflict(),
        })
    }

    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        Ok(self.state.lock().await.customers.get(&id).cloned())
    }

    async fn list_customers(&self) -> Result<Vec<Customer>, StoreError> {
        let state = self.state.lock().await;
        let mut customers: Vec<Customer> = state.customers.values().cloned().collect();
        customers.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.id_typed().cmp(&b.id_typed())));
        Ok(customers)
    }

    async fn get_entry(&self, id: LedgerEntryId) -> Result<Option<LedgerEntry>, StoreError> {
        Ok(self.state.lock().await.entries.get(&id).cloned())
    }

    async fn list_entries(&self, filter: &EntryFilter) -> Result<Vec<LedgerEntry>, StoreError> {
        let state = self.state.lock().await;
        let mut entries: Vec<LedgerEntry> = state
            .entries
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        sort_newest_first(&mut entries);
        Ok(entries)
    }
}

/// Transaction over [`InMemoryLedgerStore`].
///
/// `None` in a staged map marks a deletion.
pub struct InMemoryLedgerTx {
    guard: OwnedMutexGuard<State>,
    customers: HashMap<CustomerId, Option<Customer>>,
    entries: HashMap<LedgerEntryId, Option<LedgerEntry>>,
    fail_commit: bool,
}

impl InMemoryLedgerTx {
    fn customer(&self, id: CustomerId) -> Option<Customer> {
        match self.customers.get(&id) {
            Some(staged) => staged.clone(),
            None => self.guard.customers.get(&id).cloned(),
        }
    }

    fn entry(&self, id: LedgerEntryId) -> Option<LedgerEntry> {
        match self.entries.get(&id) {
            Some(staged) => staged.clone(),
            None => self.guard.entries.get(&id).cloned(),
        }
    }

    /// Committed entries overlaid with this transaction's staged changes.
    fn visible_entries(&self) -> impl Iterator<Item = LedgerEntry> + '_ {
        let committed = self
            .guard
            .entries
            .values()
            .filter(|e| !self.entries.contains_key(&e.id))
            .cloned();
        let staged = self.entries.values().flatten().cloned();
        committed.chain(staged)
    }
}

#[async_trait]
impl LedgerTransaction for InMemoryLedgerTx {
    async fn lock_customer(&mut self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        Ok(self.customer(id))
    }

    async fn insert_customer(&mut self, customer: &Customer) -> Result<(), StoreError> {
        let id = customer.id_typed();
        if self.customer(id).is_some() {
            return Err(StoreError::Conflict(format!("customer {id} already exists")));
        }
        self.customers.insert(id, Some(customer.clone()));
        Ok(())
    }

    async fn save_customer(&mut self, customer: &Customer) -> Result<(), StoreError> {
        let id = customer.id_typed();
        if self.customer(id).is_none() {
            return Err(StoreError::NotFound(format!("customer {id}")));
        }
        self.customers.insert(id, Some(customer.clone()));
        Ok(())
    }

    async fn delete_customer(&mut self, id: CustomerId) -> Result<bool, StoreError> {
        if self.customer(id).is_none() {
            return Ok(false);
        }
        if self.visible_entries().any(|e| e.customer_id == id) {
            return Err(StoreError::Conflict(format!(
                "customer {id} is still referenced by ledger entries"
            )));
        }
        self.customers.insert(id, None);
        Ok(true)
    }

    async fn find_entry(&mut self, id: LedgerEntryId) -> Result<Option<LedgerEntry>, StoreError> {
        Ok(self.entry(id))
    }

    async fn save_entry(&mut self, entry: &LedgerEntry) -> Result<(), StoreError> {
        if self.customer(entry.customer_id).is_none() {
            return Err(StoreError::Conflict(format!(
                "entry {} references missing customer {}",
                entry.id, entry.customer_id
            )));
        }
        self.entries.insert(entry.id, Some(entry.clone()));
        Ok(())
    }

    async fn delete_entry(&mut self, id: LedgerEntryId) -> Result<bool, StoreError> {
        if self.entry(id).is_none() {
            return Ok(false);
        }
        self.entries.insert(id, None);
        Ok(true)
    }

    async fn entries_of(&mut self, customer: CustomerId) -> Result<Vec<LedgerEntry>, StoreError> {
        Ok(self
            .visible_entries()
            .filter(|e| e.customer_id == customer)
            .collect())
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        if self.fail_commit {
            return Err(StoreError::ConcurrentModification(
                "could not serialize access due to concurrent update".to_string(),
            ));
        }

        let customers = std::mem::take(&mut self.customers);
        let entries = std::mem::take(&mut self.entries);
        let state = &mut *self.guard;

        for (id, staged) in customers {
            match staged {
                Some(c) => state.customers.insert(id, c),
                None => state.customers.remove(&id),
            };
        }
        for (id, staged) in entries {
            match staged {
                Some(e) => state.entries.insert(id, e),
                None => state.entries.remove(&id),
            };
        }
        Ok(())
    }
}
