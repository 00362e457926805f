//! Balance audit: compare cached customer balances with their entries.
//!
//! Read-only. Repair goes through [`crate::BalanceEngine::rebuild_balance`].

use std::collections::HashMap;

use serde::Serialize;

use backoffice_core::{CustomerId, DomainResult};
use backoffice_ledger::{BalanceDrift, Customer, LedgerEntry};

/// Outcome of auditing a set of customers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BalanceAuditReport {
    /// Number of customers checked.
    pub checked: usize,
    /// Customers whose cached balance differs from their entries.
    pub drifts: Vec<BalanceDrift>,
}

impl BalanceAuditReport {
    pub fn is_consistent(&self) -> bool {
        self.drifts.is_empty()
    }
}

/// Audit `customers` against `entries`; entries of customers not in the list
/// are ignored.
///
/// Fails with `InvalidAmount` when a customer's entries sum past the `Decimal`
/// range.
pub fn audit_balances(
    customers: &[Customer],
    entries: &[LedgerEntry],
) -> DomainResult<BalanceAuditReport> {
    let mut by_customer: HashMap<CustomerId, Vec<&LedgerEntry>> = HashMap::new();
    for entry in entries {
        by_customer.entry(entry.customer_id).or_default().push(entry);
    }

    let mut drifts = Vec::new();
    for c in customers {
        let own = by_customer.get(&c.id_typed()).map(Vec::as_slice).unwrap_or_default();
        if let Some(drift) = BalanceDrift::detect(c.id_typed(), c.balance(), own.iter().copied())? {
            drifts.push(drift);
        }
    }
    drifts.sort_by_key(|d| d.customer_id);

    Ok(BalanceAuditReport {
        checked: customers.len(),
        drifts,
    })
}
