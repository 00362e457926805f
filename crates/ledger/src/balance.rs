//! Balance arithmetic shared by every ledger write path.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use backoffice_core::{Amount, CustomerId, DomainError, DomainResult};

use crate::entry::LedgerEntry;

/// Sign of a customer's running balance.
///
/// Wire codes are the single characters `B`, `A` and `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BalanceStatus {
    /// Balance > 0: the customer owes.
    #[serde(rename = "B")]
    Borrower,
    /// Balance < 0: the customer is owed.
    #[serde(rename = "A")]
    Creditor,
    /// Balance == 0.
    #[serde(rename = "0")]
    Settled,
}

impl BalanceStatus {
    /// Derive the status from a balance. Pure; calling it twice on the same
    /// balance always gives the same answer.
    pub fn from_balance(balance: Decimal) -> Self {
        if balance > Decimal::ZERO {
            BalanceStatus::Borrower
        } else if balance < Decimal::ZERO {
            BalanceStatus::Creditor
        } else {
            BalanceStatus::Settled
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            BalanceStatus::Borrower => "B",
            BalanceStatus::Creditor => "A",
            BalanceStatus::Settled => "0",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "B" => Some(BalanceStatus::Borrower),
            "A" => Some(BalanceStatus::Creditor),
            "0" => Some(BalanceStatus::Settled),
            _ => None,
        }
    }
}

impl core::fmt::Display for BalanceStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

/// Signed contribution of one entry: `(debt or 0) - (receivable or 0)`.
///
/// Both sides are non-negative, so the difference always fits in a `Decimal`.
pub fn contribution(debt: Option<Amount>, receivable: Option<Amount>) -> Decimal {
    Amount::or_zero(debt) - Amount::or_zero(receivable)
}

/// `balance + delta`, or `InvalidAmount` when the result leaves the `Decimal` range.
pub fn shift_balance(balance: Decimal, delta: Decimal) -> DomainResult<Decimal> {
    balance.checked_add(delta).ok_or_else(|| {
        DomainError::invalid_amount(format!(
            "balance {balance} cannot move by {delta} without overflowing"
        ))
    })
}

/// Balance a customer should have given the entries that currently belong to it.
pub fn expected_balance<'a>(
    entries: impl IntoIterator<Item = &'a LedgerEntry>,
) -> DomainResult<Decimal> {
    entries
        .into_iter()
        .map(LedgerEntry::contribution)
        .try_fold(Decimal::ZERO, shift_balance)
}

/// Mismatch between a customer's cached balance and the sum of its entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceDrift {
    pub customer_id: CustomerId,
    pub cached: Decimal,
    pub expected: Decimal,
}

impl BalanceDrift {
    /// Compare a cached balance against entries; `None` when consistent.
    pub fn detect<'a>(
        customer_id: CustomerId,
        cached: Decimal,
        entries: impl IntoIterator<Item = &'a LedgerEntry>,
    ) -> DomainResult<Option<Self>> {
        let expected = expected_balance(
            entries
                .into_iter()
                .filter(|e| e.customer_id == customer_id),
        )?;
        Ok((expected != cached).then_some(Self {
            customer_id,
            cached,
            expected,
        }))
    }
}
