use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use backoffice_core::{CustomerId, DomainError, DomainResult, Entity, UserId, Versioned};

use crate::balance::{BalanceStatus, shift_balance};

/// Input for registering or renaming a customer.
///
/// Deliberately has no balance fields: the balance only moves through ledger
/// entry writes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CustomerDraft {
    pub name: String,
}

impl CustomerDraft {
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        Ok(())
    }
}

/// A customer and its cached running balance.
///
/// `balance_status` is always derived from `balance`; the pair is only ever
/// changed together through [`Customer::apply_contribution`] and
/// [`Customer::remove_contribution`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Customer {
    id: CustomerId,
    name: String,
    balance: Decimal,
    balance_status: BalanceStatus,
    created_by: Option<UserId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

impl Customer {
    /// Register a new customer with a settled (zero) balance.
    pub fn register(
        id: CustomerId,
        draft: CustomerDraft,
        created_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        draft.validate()?;
        Ok(Self {
            id,
            name: draft.name.trim().to_string(),
            balance: Decimal::ZERO,
            balance_status: BalanceStatus::Settled,
            created_by,
            created_at: now,
            updated_at: now,
            version: 1,
        })
    }

    /// Rebuild a customer from persisted columns.
    ///
    /// The status is re-derived from the balance rather than trusted from
    /// storage.
    pub fn restore(
        id: CustomerId,
        name: String,
        balance: Decimal,
        created_by: Option<UserId>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        version: u64,
    ) -> Self {
        Self {
            id,
            name,
            balance,
            balance_status: BalanceStatus::from_balance(balance),
            created_by,
            created_at,
            updated_at,
            version,
        }
    }

    pub fn id_typed(&self) -> CustomerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn balance_status(&self) -> BalanceStatus {
        self.balance_status
    }

    pub fn created_by(&self) -> Option<UserId> {
        self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn rename(&mut self, draft: CustomerDraft, now: DateTime<Utc>) -> DomainResult<()> {
        draft.validate()?;
        self.name = draft.name.trim().to_string();
        self.touch(now);
        Ok(())
    }

    /// Add an entry's contribution to the running balance.
    ///
    /// On overflow the customer is left untouched.
    pub fn apply_contribution(
        &mut self,
        contribution: Decimal,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        let balance = shift_balance(self.balance, contribution)?;
        self.set_balance(balance, now);
        Ok(())
    }

    /// Take an entry's contribution back out of the running balance.
    pub fn remove_contribution(
        &mut self,
        contribution: Decimal,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        let balance = shift_balance(self.balance, -contribution)?;
        self.set_balance(balance, now);
        Ok(())
    }

    /// Overwrite the balance with a recomputed total (audit repair path).
    pub fn reset_balance(&mut self, balance: Decimal, now: DateTime<Utc>) {
        self.set_balance(balance, now);
    }

    fn set_balance(&mut self, balance: Decimal, now: DateTime<Utc>) {
        self.balance = balance;
        self.balance_status = BalanceStatus::from_balance(balance);
        self.touch(now);
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.version += 1;
    }
}

impl Entity for Customer {
    type Id = CustomerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Versioned for Customer {
    fn version(&self) -> u64 {
        self.version
    }
}
