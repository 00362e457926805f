//! Balance ledger engine.
//!
//! Keeps `Customer.balance` equal to the sum of `debt - receivable` over the
//! customer's entries. Every entry write runs these hooks inside the same
//! transaction as the entry itself:
//!
//! ```text
//! create:  save entry -> on_after_write
//! update:  on_before_update -> save entry -> on_after_write
//! delete:  delete entry -> on_after_delete
//! ```
//!
//! A missing owning customer aborts the transaction with `NotFound`.

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use backoffice_core::{CustomerId, LedgerEntryId};
use backoffice_ledger::{Customer, LedgerEntry, expected_balance};

use crate::error::LedgerServiceError;
use crate::store::LedgerTransaction;

#[derive(Debug, Clone, Copy, Default)]
pub struct BalanceEngine;

impl BalanceEngine {
    pub fn new() -> Self {
        Self
    }

    /// Take the stored entry's contribution out of its customer's balance.
    ///
    /// Returns the pre-update entry, or `None` if it does not exist yet (the
    /// write is a create and there is nothing to subtract).
    #[instrument(skip_all, fields(entry_id = %entry_id), err)]
    pub async fn on_before_update<T: LedgerTransaction>(
        &self,
        tx: &mut T,
        entry_id: LedgerEntryId,
        now: DateTime<Utc>,
    ) -> Result<Option<LedgerEntry>, LedgerServiceError> {
        let Some(old) = tx.find_entry(entry_id).await? else {
            return Ok(None);
        };

        let mut customer = lock_existing(tx, old.customer_id).await?;
        customer.remove_contribution(old.contribution(), now)?;
        tx.save_customer(&customer).await?;

        debug!(
            customer_id = %old.customer_id,
            removed = %old.contribution(),
            balance = %customer.balance(),
            "old contribution removed"
        );
        Ok(Some(old))
    }

    /// Add a freshly persisted entry's contribution to its customer.
    ///
    /// The customer is re-read here so a copy modified by
    /// [`Self::on_before_update`] is never reused.
    #[instrument(skip_all, fields(entry_id = %entry.id, created = was_created), err)]
    pub async fn on_after_write<T: LedgerTransaction>(
        &self,
        tx: &mut T,
        entry: &LedgerEntry,
        was_created: bool,
        now: DateTime<Utc>,
    ) -> Result<Customer, LedgerServiceError> {
        let mut customer = lock_existing(tx, entry.customer_id).await?;
        customer.apply_contribution(entry.contribution(), now)?;
        tx.save_customer(&customer).await?;
        Ok(customer)
    }

    /// Take a deleted entry's contribution out of its customer's balance.
    #[instrument(skip_all, fields(entry_id = %entry.id), err)]
    pub async fn on_after_delete<T: LedgerTransaction>(
        &self,
        tx: &mut T,
        entry: &LedgerEntry,
        now: DateTime<Utc>,
    ) -> Result<Customer, LedgerServiceError> {
        let mut customer = lock_existing(tx, entry.customer_id).await?;
        customer.remove_contribution(entry.contribution(), now)?;
        tx.save_customer(&customer).await?;
        Ok(customer)
    }

    /// Persist `new` and move the balance by `new - old`.
    ///
    /// Customer rows are locked up front in ascending id order, so two updates
    /// moving entries between the same pair of customers cannot deadlock.
    /// Returns the customer owning `new` after the write.
    pub async fn apply_entry_change<T: LedgerTransaction>(
        &self,
        tx: &mut T,
        old: Option<&LedgerEntry>,
        new: &LedgerEntry,
        now: DateTime<Utc>,
    ) -> Result<Customer, LedgerServiceError> {
        lock_in_order(tx, old.map(|o| o.customer_id), new.customer_id).await?;

        if let Some(old) = old {
            self.on_before_update(tx, old.id, now).await?;
        }
        tx.save_entry(new).await?;
        self.on_after_write(tx, new, old.is_none(), now).await
    }

    /// Delete `entry` and take its contribution out of the owning customer.
    pub async fn remove_entry_contribution<T: LedgerTransaction>(
        &self,
        tx: &mut T,
        entry: &LedgerEntry,
        now: DateTime<Utc>,
    ) -> Result<Customer, LedgerServiceError> {
        lock_existing(tx, entry.customer_id).await?;
        if !tx.delete_entry(entry.id).await? {
            return Err(LedgerServiceError::NotFound(format!("ledger entry {}", entry.id)));
        }
        self.on_after_delete(tx, entry, now).await
    }

    /// Overwrite the cached balance with the sum over the customer's entries.
    #[instrument(skip_all, fields(customer_id = %customer_id), err)]
    pub async fn rebuild_balance<T: LedgerTransaction>(
        &self,
        tx: &mut T,
        customer_id: CustomerId,
        now: DateTime<Utc>,
    ) -> Result<Customer, LedgerServiceError> {
        let mut customer = lock_existing(tx, customer_id).await?;
        let entries = tx.entries_of(customer_id).await?;
        let expected = expected_balance(&entries)?;

        if expected != customer.balance() {
            customer.reset_balance(expected, now);
            tx.save_customer(&customer).await?;
        }
        Ok(customer)
    }
}

async fn lock_existing<T: LedgerTransaction>(
    tx: &mut T,
    customer_id: CustomerId,
) -> Result<Customer, LedgerServiceError> {
    tx.lock_customer(customer_id)
        .await?
        .ok_or_else(|| LedgerServiceError::NotFound(format!("customer {customer_id}")))
}

async fn lock_in_order<T: LedgerTransaction>(
    tx: &mut T,
    a: Option<CustomerId>,
    b: CustomerId,
) -> Result<(), LedgerServiceError> {
    let mut ids: Vec<CustomerId> = a.into_iter().chain(Some(b)).collect();
    ids.sort();
    ids.dedup();
    for id in ids {
        lock_existing(tx, id).await?;
    }
    Ok(())
}
