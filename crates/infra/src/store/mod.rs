//! Ledger persistence: customers and their entries.
//!
//! Every write goes through a [`LedgerTransaction`]. A transaction holds an
//! exclusive lock on each customer row it reads with
//! [`LedgerTransaction::lock_customer`] until it is committed or dropped.
//! Dropping a transaction without committing discards all staged changes.

use async_trait::async_trait;
use thiserror::Error;

use backoffice_core::{CustomerId, LedgerEntryId};
use backoffice_ledger::{Customer, EntryFilter, LedgerEntry};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;

/// Storage-level failure.
///
/// These are infrastructure errors as opposed to domain errors (validation,
/// invariants).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    /// Integrity constraint refused the write (e.g. customer still referenced).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Serialization failure or deadlock; the transaction was rolled back and
    /// may be retried from the start.
    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Entry point to ledger storage.
///
/// Reads outside a transaction see the last committed state.
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    type Tx: LedgerTransaction;

    /// Start a serializable read-write transaction.
    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>, StoreError>;

    /// All customers ordered by name.
    async fn list_customers(&self) -> Result<Vec<Customer>, StoreError>;

    async fn get_entry(&self, id: LedgerEntryId) -> Result<Option<LedgerEntry>, StoreError>;

    /// Entries matching `filter`, newest first.
    async fn list_entries(&self, filter: &EntryFilter) -> Result<Vec<LedgerEntry>, StoreError>;
}

/// One unit of atomic work against ledger storage.
#[async_trait]
pub trait LedgerTransaction: Send + 'static {
    /// Read a customer and hold its row lock until commit or rollback.
    async fn lock_customer(&mut self, id: CustomerId) -> Result<Option<Customer>, StoreError>;

    async fn insert_customer(&mut self, customer: &Customer) -> Result<(), StoreError>;

    /// Persist a customer previously returned by [`Self::lock_customer`].
    async fn save_customer(&mut self, customer: &Customer) -> Result<(), StoreError>;

    /// Remove a customer. Fails with [`StoreError::Conflict`] while entries
    /// still reference it; returns `false` when it did not exist.
    async fn delete_customer(&mut self, id: CustomerId) -> Result<bool, StoreError>;

    /// Read an entry and hold its row lock.
    async fn find_entry(&mut self, id: LedgerEntryId) -> Result<Option<LedgerEntry>, StoreError>;

    /// Insert or replace an entry.
    async fn save_entry(&mut self, entry: &LedgerEntry) -> Result<(), StoreError>;

    /// Returns `false` when the entry did not exist.
    async fn delete_entry(&mut self, id: LedgerEntryId) -> Result<bool, StoreError>;

    /// Entries currently owned by a customer, as seen by this transaction.
    async fn entries_of(&mut self, customer: CustomerId) -> Result<Vec<LedgerEntry>, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;
}
