//! Persistence gateway for stock records.
//!
//! Records are stored as whole documents keyed by SKU. Writes carry an
//! [`ExpectedVersion`]; a store rejects the write with [`StorageError::Concurrency`]
//! when the persisted version differs, so concurrent read-modify-write cycles
//! cannot silently lose updates.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use stockroom_core::ExpectedVersion;
use stockroom_inventory::{Sku, StockRecord};

pub use in_memory::InMemoryStockStore;
pub use postgres::PostgresStockStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("storage backend failure: {0}")]
    Backend(String),

    #[error("stored record could not be decoded: {0}")]
    Decode(String),
}

/// Document store for [`StockRecord`]s.
///
/// `store` must persist the record only if the currently stored version (0 when the
/// SKU is absent) matches `expected`.
#[async_trait]
pub trait StockStore: Send + Sync {
    async fn load(&self, sku: &Sku) -> Result<Option<StockRecord>, StorageError>;

    async fn store(
        &self,
        record: &StockRecord,
        expected: ExpectedVersion,
    ) -> Result<(), StorageError>;

    /// All records, ordered by SKU.
    async fn list(&self) -> Result<Vec<StockRecord>, StorageError>;
}

#[async_trait]
impl<S> StockStore for Arc<S>
where
    S: StockStore + ?Sized,
{
    async fn load(&self, sku: &Sku) -> Result<Option<StockRecord>, StorageError> {
        (**self).load(sku).await
    }

    async fn store(
        &self,
        record: &StockRecord,
        expected: ExpectedVersion,
    ) -> Result<(), StorageError> {
        (**self).store(record, expected).await
    }

    async fn list(&self) -> Result<Vec<StockRecord>, StorageError> {
        (**self).list().await
    }
}
