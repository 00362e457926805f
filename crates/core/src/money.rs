//! Monetary amounts.
//!
//! Balances are signed and use `rust_decimal::Decimal` directly; individual
//! ledger fields (`debt`, `receivable`, prices, rates) are non-negative and go
//! through [`Amount`], which refuses negative values at construction and on
//! deserialization.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_object::ValueObject;

/// A non-negative decimal amount.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl ValueObject for Amount {}

impl Amount {
    pub const ZERO: Amount = Amount(Decimal::ZERO);

    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(DomainError::invalid_amount(format!(
                "amount must not be negative (got {value})"
            )));
        }
        // Normalize -0 to 0 so equality and display stay predictable.
        Ok(Self(value.abs()))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Value of an optional amount, with a missing amount counting as zero.
    pub fn or_zero(amount: Option<Amount>) -> Decimal {
        amount.map(|a| a.0).unwrap_or(Decimal::ZERO)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl core::fmt::Display for Amount {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for Amount {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str_exact(s.trim())
            .map_err(|e| DomainError::invalid_amount(format!("'{s}' is not a decimal: {e}")))?;
        Self::new(value)
    }
}
