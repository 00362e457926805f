//! Customer balance ledger (payments and invoices).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns. Storage and
//! transaction handling live in `backoffice-infra`, which drives the balance
//! arithmetic defined here.

pub mod balance;
pub mod customer;
pub mod entry;

pub use balance::{BalanceDrift, BalanceStatus, contribution, expected_balance};
pub use customer::{Customer, CustomerDraft};
pub use entry::{
    EntryDetails, EntryFilter, EntryKind, InvoiceDetails, LedgerEntry, LedgerEntryDraft,
    PaymentDetails, sort_newest_first,
};
