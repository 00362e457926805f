use std::sync::Arc;

use anyhow::Context;

use backoffice_infra::{
    AppConfig, DirectoryStores, InMemoryLedgerStore, LedgerService, PostgresLedgerStore,
    StorageBackend,
};

/// The ledger service over the configured storage backend.
pub enum AppServices {
    InMemory(Arc<LedgerService<InMemoryLedgerStore>>),
    Postgres(Arc<LedgerService<PostgresLedgerStore>>),
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    match config.storage {
        StorageBackend::Memory => {
            tracing::info!("using in-memory storage");
            let ledger = LedgerService::new(InMemoryLedgerStore::new(), DirectoryStores::in_memory())
                .with_max_retries(config.ledger_write_retries);
            Ok(AppServices::InMemory(Arc::new(ledger)))
        }
        StorageBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set for the postgres backend")?;

            let store = PostgresLedgerStore::connect(url, config.db_max_connections)
                .await
                .context("failed to connect to postgres")?;
            store
                .ensure_schema()
                .await
                .context("failed to apply ledger schema")?;
            tracing::info!(max_connections = config.db_max_connections, "using postgres storage");

            let directory = DirectoryStores::postgres(store.pool().clone());
            let ledger = LedgerService::new(store, directory)
                .with_max_retries(config.ledger_write_retries);
            Ok(AppServices::Postgres(Arc::new(ledger)))
        }
    }
}
