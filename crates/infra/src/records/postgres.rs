//! Postgres-backed directory record store.
//!
//! All kinds share the `directory_records` table, partitioned by
//! [`DirectoryRecord::KIND`]; the record body is stored as JSONB.

use std::marker::PhantomData;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use backoffice_directory::DirectoryRecord;

use super::RecordStore;
use crate::store::StoreError;
use crate::store::postgres::map_sqlx_error;

pub struct PostgresRecordStore<R> {
    pool: PgPool,
    _record: PhantomData<fn() -> R>,
}

impl<R> PostgresRecordStore<R> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _record: PhantomData,
        }
    }
}

fn decode<R: DirectoryRecord>(body: JsonValue) -> Result<R, StoreError> {
    serde_json::from_value(body)
        .map_err(|e| StoreError::Backend(format!("failed to decode {} record: {e}", R::KIND)))
}

#[async_trait]
impl<R: DirectoryRecord> RecordStore<R> for PostgresRecordStore<R> {
    #[instrument(skip(self), fields(kind = R::KIND), err)]
    async fn get(&self, id: R::Id) -> Result<Option<R>, StoreError> {
        let key: Uuid = id.into();
        let row = sqlx::query("SELECT body FROM directory_records WHERE kind = $1 AND id = $2")
            .bind(R::KIND)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_record", e))?;

        match row {
            Some(row) => {
                let body: JsonValue = row
                    .try_get("body")
                    .map_err(|e| map_sqlx_error("get_record", e))?;
                decode(body).map(Some)
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self, record), fields(kind = R::KIND, id = %record.id()), err)]
    async fn upsert(&self, record: &R) -> Result<(), StoreError> {
        let key: Uuid = (*record.id()).into();
        let body = serde_json::to_value(record)
            .map_err(|e| StoreError::Backend(format!("failed to encode {} record: {e}", R::KIND)))?;

        sqlx::query(
            r#"
            INSERT INTO directory_records (kind, id, body, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (kind, id) DO UPDATE SET body = EXCLUDED.body
            "#,
        )
        .bind(R::KIND)
        .bind(key)
        .bind(body)
        .bind(record.created_at())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_record", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(kind = R::KIND), err)]
    async fn list(&self) -> Result<Vec<R>, StoreError> {
        let rows = sqlx::query(
            "SELECT body FROM directory_records WHERE kind = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(R::KIND)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_records", e))?;

        rows.into_iter()
            .map(|row| {
                let body: JsonValue = row
                    .try_get("body")
                    .map_err(|e| map_sqlx_error("list_records", e))?;
                decode(body)
            })
            .collect()
    }

    #[instrument(skip(self), fields(kind = R::KIND), err)]
    async fn delete(&self, id: R::Id) -> Result<bool, StoreError> {
        let key: Uuid = id.into();
        let result = sqlx::query("DELETE FROM directory_records WHERE kind = $1 AND id = $2")
            .bind(R::KIND)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_record", e))?;
        Ok(result.rows_affected() > 0)
    }
}
