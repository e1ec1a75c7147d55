//! Inventory domain module: per-SKU stock ledger and stock alerting.
//!
//! This crate contains business rules only, implemented as deterministic
//! in-memory logic (no IO, no HTTP, no storage). Callers own persistence.

pub mod alert;
pub mod ledger;
pub mod movement;
pub mod record;
pub mod sku;

pub use alert::{AlertKind, AlertRecord, Severity};
pub use ledger::MovementOutcome;
pub use movement::{Movement, MovementKind, MovementRecord, MovementRequest};
pub use record::{NewStockRecord, StockPolicy, StockRecord, StockStatus};
pub use sku::Sku;
