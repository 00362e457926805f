//! Infrastructure layer: configuration, storage, and the ledger write path.

pub mod audit;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger_service;
pub mod records;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use audit::{BalanceAuditReport, audit_balances};
pub use config::{AppConfig, ConfigError, StorageBackend};
pub use engine::BalanceEngine;
pub use error::LedgerServiceError;
pub use ledger_service::{EntryWrite, LedgerService};
pub use records::{DirectoryKind, DirectoryStores, InMemoryRecordStore, RecordStore};
pub use store::{InMemoryLedgerStore, LedgerStore, LedgerTransaction, PostgresLedgerStore, StoreError};
