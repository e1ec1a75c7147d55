use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use stockroom_core::{AggregateRoot, ExpectedVersion};
use stockroom_inventory::{Sku, StockRecord};

use super::{StockStore, StorageError};

/// In-memory document store.
///
/// Intended for tests, dev and the file-driven CLI commands.
#[derive(Debug, Default)]
pub struct InMemoryStockStore {
    records: RwLock<BTreeMap<Sku, StockRecord>>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with `records`, overwriting duplicates.
    pub fn seeded(records: impl IntoIterator<Item = StockRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|r| (r.sku().clone(), r))
            .collect();
        Self {
            records: RwLock::new(records),
        }
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    async fn load(&self, sku: &Sku) -> Result<Option<StockRecord>, StorageError> {
        let records = self
            .records
            .read()
            .map_err(|_| StorageError::Backend("lock poisoned".to_string()))?;
        Ok(records.get(sku).cloned())
    }

    async fn store(
        &self,
        record: &StockRecord,
        expected: ExpectedVersion,
    ) -> Result<(), StorageError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StorageError::Backend("lock poisoned".to_string()))?;

        let current = records.get(record.sku()).map(|r| r.version()).unwrap_or(0);
        expected
            .check(current)
            .map_err(|e| StorageError::Concurrency(format!("{}: {e}", record.sku())))?;

        records.insert(record.sku().clone(), record.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<StockRecord>, StorageError> {
        let records = self
            .records
            .read()
            .map_err(|_| StorageError::Backend("lock poisoned".to_string()))?;
        Ok(records.values().cloned().collect())
    }
}
