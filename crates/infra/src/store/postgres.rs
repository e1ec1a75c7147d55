//! Postgres-backed document store.
//!
//! Each SKU is one row holding the full record as JSONB next to a `version` column.
//! The version column carries the optimistic concurrency check:
//!
//! | Expected version | Statement | Zero rows affected means |
//! |------------------|-----------|--------------------------|
//! | `Exact(0)` | `INSERT ... ON CONFLICT DO NOTHING` | SKU already exists |
//! | `Exact(v)` | `UPDATE ... WHERE version = v` | stale or missing record |
//! | `Any` | `INSERT ... ON CONFLICT DO UPDATE` | n/a |

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::instrument;

use stockroom_core::{AggregateRoot, ExpectedVersion};
use stockroom_inventory::{Sku, StockRecord};

use super::{StockStore, StorageError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS stock_records (
    sku         TEXT PRIMARY KEY,
    version     BIGINT NOT NULL CHECK (version > 0),
    document    JSONB NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

#[derive(Debug, Clone)]
pub struct PostgresStockStore {
    pool: Arc<PgPool>,
}

impl PostgresStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the `stock_records` table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<(), StorageError> {
        sqlx::query(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(sku = %sku), err)]
    pub async fn load_record(&self, sku: &Sku) -> Result<Option<StockRecord>, StorageError> {
        let row = sqlx::query("SELECT document FROM stock_records WHERE sku = $1")
            .bind(sku.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load", e))?;

        row.map(|r| decode_document(&r)).transpose()
    }

    #[instrument(skip(self, record), fields(sku = %record.sku(), version = record.version()), err)]
    pub async fn store_record(
        &self,
        record: &StockRecord,
        expected: ExpectedVersion,
    ) -> Result<(), StorageError> {
        let version = i64::try_from(record.version()).map_err(|_| {
            StorageError::Backend(format!("version {} out of range", record.version()))
        })?;

        let result = match expected {
            ExpectedVersion::Exact(0) => {
                sqlx::query(
                    r#"
                    INSERT INTO stock_records (sku, version, document)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (sku) DO NOTHING
                    "#,
                )
                .bind(record.sku().as_str())
                .bind(version)
                .bind(Json(record))
                .execute(&*self.pool)
                .await
            }
            ExpectedVersion::Exact(prev) => {
                let prev = i64::try_from(prev)
                    .map_err(|_| StorageError::Backend(format!("version {prev} out of range")))?;
                sqlx::query(
                    r#"
                    UPDATE stock_records
                    SET version = $2, document = $3, updated_at = NOW()
                    WHERE sku = $1 AND version = $4
                    "#,
                )
                .bind(record.sku().as_str())
                .bind(version)
                .bind(Json(record))
                .bind(prev)
                .execute(&*self.pool)
                .await
            }
            ExpectedVersion::Any => {
                sqlx::query(
                    r#"
                    INSERT INTO stock_records (sku, version, document)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (sku)
                    DO UPDATE SET
                        version = EXCLUDED.version,
                        document = EXCLUDED.document,
                        updated_at = NOW()
                    "#,
                )
                .bind(record.sku().as_str())
                .bind(version)
                .bind(Json(record))
                .execute(&*self.pool)
                .await
            }
        }
        .map_err(|e| map_sqlx_error("store", e))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Concurrency(format!(
                "{}: expected {expected:?} did not match the stored version",
                record.sku()
            )));
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    pub async fn list_records(&self) -> Result<Vec<StockRecord>, StorageError> {
        let rows = sqlx::query("SELECT document FROM stock_records ORDER BY sku ASC")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list", e))?;

        rows.iter().map(decode_document).collect()
    }
}

#[async_trait]
impl StockStore for PostgresStockStore {
    async fn load(&self, sku: &Sku) -> Result<Option<StockRecord>, StorageError> {
        self.load_record(sku).await
    }

    async fn store(
        &self,
        record: &StockRecord,
        expected: ExpectedVersion,
    ) -> Result<(), StorageError> {
        self.store_record(record, expected).await
    }

    async fn list(&self) -> Result<Vec<StockRecord>, StorageError> {
        self.list_records().await
    }
}

fn decode_document(row: &sqlx::postgres::PgRow) -> Result<StockRecord, StorageError> {
    row.try_get::<Json<StockRecord>, _>("document")
        .map(|Json(record)| record)
        .map_err(|e| StorageError::Decode(e.to_string()))
}

/// Map SQLx errors onto [`StorageError`].
///
/// A unique violation (`23505`) can only come from two writers racing to register the
/// same SKU, so it is reported as a concurrency failure.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StorageError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StorageError::Concurrency(msg),
                _ => StorageError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StorageError::Backend(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StorageError::Decode(format!("{operation}: {err}"))
        }
        _ => StorageError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}
