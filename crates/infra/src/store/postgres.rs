//! Postgres-backed ledger store.
//!
//! Transactions run at `SERIALIZABLE` isolation and take row locks with
//! `SELECT ... FOR UPDATE`, so two writers touching the same customer queue up
//! behind each other instead of interleaving.
//!
//! ## Error Mapping
//!
//! | SQLSTATE | Meaning | StoreError |
//! |----------|---------|------------|
//! | `40001` | serialization failure | `ConcurrentModification` |
//! | `40P01` | deadlock detected | `ConcurrentModification` |
//! | `23503` | foreign key violation | `Conflict` |
//! | `23505` | unique violation | `Conflict` |
//! | other | | `Backend` |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{instrument, warn};
use uuid::Uuid;

use backoffice_core::{
    Amount, CompanyId, CustomerId, GroupId, LedgerEntryId, UserId, Versioned, WorksiteId,
};
use backoffice_ledger::{BalanceStatus, Customer, EntryDetails, EntryFilter, LedgerEntry};

use super::{LedgerStore, LedgerTransaction, StoreError};

/// Tables used by [`PostgresLedgerStore`] and the Postgres record store.
///
/// Idempotent; applied by [`PostgresLedgerStore::ensure_schema`].
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS customers (
    id              UUID PRIMARY KEY,
    name            TEXT NOT NULL,
    balance         NUMERIC NOT NULL DEFAULT 0,
    balance_status  CHAR(1) NOT NULL DEFAULT '0' CHECK (balance_status IN ('A', 'B', '0')),
    created_by      UUID NULL,
    created_at      TIMESTAMPTZ NOT NULL,
    updated_at      TIMESTAMPTZ NOT NULL,
    version         BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS ledger_entries (
    id              UUID PRIMARY KEY,
    customer_id     UUID NOT NULL REFERENCES customers (id) ON DELETE RESTRICT,
    entry_type      TEXT NOT NULL CHECK (entry_type IN ('payment', 'invoice')),
    details         JSONB NOT NULL,
    debt            NUMERIC NULL CHECK (debt >= 0),
    receivable      NUMERIC NULL CHECK (receivable >= 0),
    entry_date      TIMESTAMPTZ NOT NULL,
    worksite_id     UUID NULL,
    group_id        UUID NULL,
    company_id      UUID NULL,
    description     TEXT NULL,
    created_by      UUID NULL,
    created_at      TIMESTAMPTZ NOT NULL,
    updated_at      TIMESTAMPTZ NOT NULL,
    version         BIGINT NOT NULL
);

CREATE INDEX IF NOT EXISTS ledger_entries_customer_idx ON ledger_entries (customer_id);
CREATE INDEX IF NOT EXISTS ledger_entries_date_idx ON ledger_entries (entry_date DESC, id DESC);

CREATE TABLE IF NOT EXISTS directory_records (
    kind            TEXT NOT NULL,
    id              UUID NOT NULL,
    body            JSONB NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (kind, id)
);
"#;

const CUSTOMER_COLUMNS: &str =
    "id, name, balance, balance_status, created_by, created_at, updated_at, version";

const ENTRY_COLUMNS: &str = "id, customer_id, details, debt, receivable, entry_date, \
     worksite_id, group_id, company_id, description, created_by, created_at, updated_at, version";

#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool with at most `max_connections` connections.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    type Tx = PostgresLedgerTx;

    #[instrument(skip(self), err)]
    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;

        Ok(PostgresLedgerTx { tx })
    }

    #[instrument(skip(self), fields(customer_id = %id), err)]
    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        let row = sqlx::query(&format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1"))
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_customer", e))?;
        row.map(customer_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_customers(&self) -> Result<Vec<Customer>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers ORDER BY name ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_customers", e))?;
        rows.into_iter().map(customer_from_row).collect()
    }

    #[instrument(skip(self), fields(entry_id = %id), err)]
    async fn get_entry(&self, id: LedgerEntryId) -> Result<Option<LedgerEntry>, StoreError> {
        let row = sqlx::query(&format!("SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE id = $1"))
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_entry", e))?;
        row.map(entry_from_row).transpose()
    }

    #[instrument(skip(self, filter), err)]
    async fn list_entries(&self, filter: &EntryFilter) -> Result<Vec<LedgerEntry>, StoreError> {
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", escape_like(s)));

        let rows = sqlx::query(&format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM ledger_entries
            WHERE ($1::uuid IS NULL OR customer_id = $1)
              AND ($2::text IS NULL OR entry_type = $2)
              AND ($3::uuid IS NULL OR worksite_id = $3)
              AND ($4::uuid IS NULL OR group_id = $4)
              AND ($5::uuid IS NULL OR company_id = $5)
              AND ($6::timestamptz IS NULL OR entry_date >= $6)
              AND ($7::timestamptz IS NULL OR entry_date <= $7)
              AND ($8::text IS NULL
                   OR description ILIKE $8
                   OR details->>'material' ILIKE $8
                   OR details->>'bank' ILIKE $8
                   OR details->>'check_no' ILIKE $8)
            ORDER BY entry_date DESC, id DESC
            "#
        ))
        .bind(filter.customer.map(Uuid::from))
        .bind(filter.kind.map(|k| k.as_str()))
        .bind(filter.worksite.map(Uuid::from))
        .bind(filter.group.map(Uuid::from))
        .bind(filter.company.map(Uuid::from))
        .bind(filter.date_from)
        .bind(filter.date_to)
        .bind(search)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_entries", e))?;

        rows.into_iter().map(entry_from_row).collect()
    }
}

pub struct PostgresLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTransaction for PostgresLedgerTx {
    #[instrument(skip(self), fields(customer_id = %id), err)]
    async fn lock_customer(&mut self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1 FOR UPDATE"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_customer", e))?;
        row.map(customer_from_row).transpose()
    }

    async fn insert_customer(&mut self, customer: &Customer) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO customers (id, name, balance, balance_status, created_by, created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::from(customer.id_typed()))
        .bind(customer.name())
        .bind(customer.balance())
        .bind(customer.balance_status().code())
        .bind(customer.created_by().map(Uuid::from))
        .bind(customer.created_at())
        .bind(customer.updated_at())
        .bind(version_to_db(customer.version())?)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_customer", e))?;
        Ok(())
    }

    async fn save_customer(&mut self, customer: &Customer) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE customers
            SET name = $2, balance = $3, balance_status = $4, updated_at = $5, version = $6
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(customer.id_typed()))
        .bind(customer.name())
        .bind(customer.balance())
        .bind(customer.balance_status().code())
        .bind(customer.updated_at())
        .bind(version_to_db(customer.version())?)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("save_customer", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("customer {}", customer.id_typed())));
        }
        Ok(())
    }

    async fn delete_customer(&mut self, id: CustomerId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM customers WHERE id = $1")
            .bind(Uuid::from(id))
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_customer", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_entry(&mut self, id: LedgerEntryId) -> Result<Option<LedgerEntry>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE id = $1 FOR UPDATE"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("find_entry", e))?;
        row.map(entry_from_row).transpose()
    }

    async fn save_entry(&mut self, entry: &LedgerEntry) -> Result<(), StoreError> {
        let details = serde_json::to_value(&entry.details)
            .map_err(|e| StoreError::Backend(format!("failed to encode entry details: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO ledger_entries (
                id, customer_id, entry_type, details, debt, receivable, entry_date,
                worksite_id, group_id, company_id, description,
                created_by, created_at, updated_at, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (id) DO UPDATE SET
                customer_id = EXCLUDED.customer_id,
                entry_type = EXCLUDED.entry_type,
                details = EXCLUDED.details,
                debt = EXCLUDED.debt,
                receivable = EXCLUDED.receivable,
                entry_date = EXCLUDED.entry_date,
                worksite_id = EXCLUDED.worksite_id,
                group_id = EXCLUDED.group_id,
                company_id = EXCLUDED.company_id,
                description = EXCLUDED.description,
                updated_at = EXCLUDED.updated_at,
                version = EXCLUDED.version
            "#,
        )
        .bind(Uuid::from(entry.id))
        .bind(Uuid::from(entry.customer_id))
        .bind(entry.kind().as_str())
        .bind(details)
        .bind(entry.debt.map(Decimal::from))
        .bind(entry.receivable.map(Decimal::from))
        .bind(entry.date)
        .bind(entry.worksite.map(Uuid::from))
        .bind(entry.group.map(Uuid::from))
        .bind(entry.company.map(Uuid::from))
        .bind(entry.description.as_deref())
        .bind(entry.created_by.map(Uuid::from))
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .bind(version_to_db(entry.version)?)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("save_entry", e))?;
        Ok(())
    }

    async fn delete_entry(&mut self, id: LedgerEntryId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM ledger_entries WHERE id = $1")
            .bind(Uuid::from(id))
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_entry", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn entries_of(&mut self, customer: CustomerId) -> Result<Vec<LedgerEntry>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE customer_id = $1"
        ))
        .bind(Uuid::from(customer))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("entries_of", e))?;
        rows.into_iter().map(entry_from_row).collect()
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

#[derive(Debug)]
struct CustomerRow {
    id: Uuid,
    name: String,
    balance: Decimal,
    balance_status: String,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl<'r> sqlx::FromRow<'r, PgRow> for CustomerRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(CustomerRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            balance: row.try_get("balance")?,
            balance_status: row.try_get("balance_status")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            version: row.try_get("version")?,
        })
    }
}

fn customer_from_row(row: PgRow) -> Result<Customer, StoreError> {
    let r = CustomerRow::from_row(&row)
        .map_err(|e| StoreError::Backend(format!("failed to decode customer row: {e}")))?;
    let customer = Customer::restore(
        CustomerId::from_uuid(r.id),
        r.name,
        r.balance,
        r.created_by.map(UserId::from_uuid),
        r.created_at,
        r.updated_at,
        version_from_db(r.version)?,
    );
    check_stored_status(&r.balance_status, &customer)?;
    Ok(customer)
}

/// The status column is written alongside the balance but never trusted on
/// read; a mismatch is logged and the derived status wins.
fn check_stored_status(code: &str, customer: &Customer) -> Result<(), StoreError> {
    let stored = BalanceStatus::from_code(code.trim()).ok_or_else(|| {
        StoreError::Backend(format!(
            "customer {} has unknown balance_status {code:?}",
            customer.id_typed()
        ))
    })?;
    if stored != customer.balance_status() {
        warn!(
            customer_id = %customer.id_typed(),
            stored = %stored,
            derived = %customer.balance_status(),
            "stored balance status disagrees with balance"
        );
    }
    Ok(())
}

#[derive(Debug)]
struct EntryRow {
    id: Uuid,
    customer_id: Uuid,
    details: JsonValue,
    debt: Option<Decimal>,
    receivable: Option<Decimal>,
    entry_date: DateTime<Utc>,
    worksite_id: Option<Uuid>,
    group_id: Option<Uuid>,
    company_id: Option<Uuid>,
    description: Option<String>,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl<'r> sqlx::FromRow<'r, PgRow> for EntryRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(EntryRow {
            id: row.try_get("id")?,
            customer_id: row.try_get("customer_id")?,
            details: row.try_get("details")?,
            debt: row.try_get("debt")?,
            receivable: row.try_get("receivable")?,
            entry_date: row.try_get("entry_date")?,
            worksite_id: row.try_get("worksite_id")?,
            group_id: row.try_get("group_id")?,
            company_id: row.try_get("company_id")?,
            description: row.try_get("description")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            version: row.try_get("version")?,
        })
    }
}

fn entry_from_row(row: PgRow) -> Result<LedgerEntry, StoreError> {
    let r = EntryRow::from_row(&row)
        .map_err(|e| StoreError::Backend(format!("failed to decode entry row: {e}")))?;
    let details: EntryDetails = serde_json::from_value(r.details)
        .map_err(|e| StoreError::Backend(format!("failed to decode entry details: {e}")))?;

    Ok(LedgerEntry {
        id: LedgerEntryId::from_uuid(r.id),
        customer_id: CustomerId::from_uuid(r.customer_id),
        details,
        debt: amount_from_db(r.debt)?,
        receivable: amount_from_db(r.receivable)?,
        date: r.entry_date,
        worksite: r.worksite_id.map(WorksiteId::from_uuid),
        group: r.group_id.map(GroupId::from_uuid),
        company: r.company_id.map(CompanyId::from_uuid),
        description: r.description,
        created_by: r.created_by.map(UserId::from_uuid),
        created_at: r.created_at,
        updated_at: r.updated_at,
        version: version_from_db(r.version)?,
    })
}

fn amount_from_db(value: Option<Decimal>) -> Result<Option<Amount>, StoreError> {
    value
        .map(Amount::new)
        .transpose()
        .map_err(|e| StoreError::Backend(format!("stored amount is invalid: {e}")))
}

fn version_to_db(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version)
        .map_err(|_| StoreError::Backend(format!("version {version} does not fit in BIGINT")))
}

fn version_from_db(version: i64) -> Result<u64, StoreError> {
    u64::try_from(version).map_err(|_| StoreError::Backend(format!("negative version {version}")))
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Map SQLx errors to `StoreError`.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("40001") | Some("40P01") => StoreError::ConcurrentModification(msg),
                Some("23503") | Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::RowNotFound => {
            StoreError::NotFound(format!("unexpected row not found in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
