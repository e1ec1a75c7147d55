//! Infrastructure layer: configuration, stock record stores, and the stock service
//! that ties the inventory domain to a store.

pub mod config;
pub mod service;
pub mod store;

pub use config::{PolicySettings, Settings, StoreBackend, StoreSettings};
pub use service::{AlertLine, ReorderLine, StockService, StockServiceError};
pub use store::{InMemoryStockStore, PostgresStockStore, StockStore, StorageError};
