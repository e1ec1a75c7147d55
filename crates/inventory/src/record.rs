use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{AggregateRoot, DomainError, DomainResult};

use crate::alert::{AlertKind, AlertRecord};
use crate::movement::{MovementKind, MovementRecord};
use crate::sku::Sku;

/// Restocking thresholds for one SKU.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockPolicy {
    pub min_stock_level: u64,
    pub max_stock_level: u64,
    pub reorder_point: u64,
    pub reorder_quantity: u64,
}

impl StockPolicy {
    /// Checks `min_stock_level <= reorder_point <= max_stock_level`.
    ///
    /// Nothing in the ledger or the evaluator depends on this ordering; callers
    /// decide whether to enforce it.
    pub fn check_ordering(&self) -> Result<(), DomainError> {
        if self.min_stock_level > self.reorder_point {
            return Err(DomainError::validation(format!(
                "minStockLevel ({}) must not exceed reorderPoint ({})",
                self.min_stock_level, self.reorder_point
            )));
        }
        if self.reorder_point > self.max_stock_level {
            return Err(DomainError::validation(format!(
                "reorderPoint ({}) must not exceed maxStockLevel ({})",
                self.reorder_point, self.max_stock_level
            )));
        }
        Ok(())
    }
}

/// Soft lifecycle status. Records are never hard-deleted.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    #[default]
    Active,
    Discontinued,
}

/// Input for registering a new SKU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStockRecord {
    pub sku: Sku,
    pub name: String,
    #[serde(flatten)]
    pub policy: StockPolicy,
}

/// Aggregate root: the stock document for one SKU.
///
/// Deserializes through [`StockDocument`], so `availableStock` is always derived
/// from the counters rather than trusted from the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StockDocument")]
pub struct StockRecord {
    pub(crate) sku: Sku,
    pub(crate) name: String,
    pub(crate) current_stock: u64,
    pub(crate) reserved_stock: u64,
    pub(crate) available_stock: u64,
    #[serde(flatten)]
    pub(crate) policy: StockPolicy,
    pub(crate) status: StockStatus,
    pub(crate) movements: Vec<MovementRecord>,
    pub(crate) alerts: Vec<AlertRecord>,
    pub(crate) last_sold: Option<DateTime<Utc>>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) version: u64,
}

/// Persisted shape of a [`StockRecord`]. A stored `availableStock` is ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StockDocument {
    sku: Sku,
    name: String,
    current_stock: u64,
    reserved_stock: u64,
    #[serde(flatten)]
    policy: StockPolicy,
    #[serde(default)]
    status: StockStatus,
    #[serde(default)]
    movements: Vec<MovementRecord>,
    #[serde(default)]
    alerts: Vec<AlertRecord>,
    #[serde(default)]
    last_sold: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    version: u64,
}

impl From<StockDocument> for StockRecord {
    fn from(doc: StockDocument) -> Self {
        let mut record = Self {
            sku: doc.sku,
            name: doc.name,
            current_stock: doc.current_stock,
            reserved_stock: doc.reserved_stock,
            available_stock: 0,
            policy: doc.policy,
            status: doc.status,
            movements: doc.movements,
            alerts: doc.alerts,
            last_sold: doc.last_sold,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
            version: doc.version,
        };
        record.recompute_available();
        record
    }
}

impl StockRecord {
    /// Register a new SKU with zero stock.
    ///
    /// The record starts at version 1 and already carries whatever alerts its
    /// initial state fires (a fresh record is out of stock).
    pub fn register(new: NewStockRecord, at: DateTime<Utc>) -> DomainResult<Self> {
        let name = new.name.trim().to_string();
        if name.is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        let mut record = Self {
            sku: new.sku,
            name,
            current_stock: 0,
            reserved_stock: 0,
            available_stock: 0,
            policy: new.policy,
            status: StockStatus::Active,
            movements: Vec::new(),
            alerts: Vec::new(),
            last_sold: None,
            created_at: at,
            updated_at: at,
            version: 0,
        };
        let version = record.next_version()?;
        record.merge_alerts(at);
        record.touch(version, at);
        Ok(record)
    }

    pub fn sku(&self) -> &Sku {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn current_stock(&self) -> u64 {
        self.current_stock
    }

    pub fn reserved_stock(&self) -> u64 {
        self.reserved_stock
    }

    pub fn available_stock(&self) -> u64 {
        self.available_stock
    }

    pub fn policy(&self) -> &StockPolicy {
        &self.policy
    }

    pub fn status(&self) -> StockStatus {
        self.status
    }

    pub fn movements(&self) -> &[MovementRecord] {
        &self.movements
    }

    pub fn alerts(&self) -> &[AlertRecord] {
        &self.alerts
    }

    pub fn last_sold(&self) -> Option<DateTime<Utc>> {
        self.last_sold
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Alerts that have not been resolved yet.
    pub fn active_alerts(&self) -> impl Iterator<Item = &AlertRecord> {
        self.alerts.iter().filter(|a| !a.resolved)
    }

    pub fn has_open_alert(&self, kind: AlertKind) -> bool {
        self.active_alerts().any(|a| a.kind == kind)
    }

    /// Whether restocking should be triggered.
    pub fn needs_reorder(&self) -> bool {
        self.current_stock <= self.policy.reorder_point
    }

    /// The last `n` movements, most recent first.
    pub fn recent_movements(&self, n: usize) -> impl Iterator<Item = &MovementRecord> {
        self.movements.iter().rev().take(n)
    }

    pub fn movements_of(&self, kind: MovementKind) -> impl Iterator<Item = &MovementRecord> {
        self.movements.iter().filter(move |m| m.kind == kind)
    }

    /// Replace restocking thresholds and re-evaluate alerts against them.
    ///
    /// Returns the kinds of alerts newly raised by the change.
    pub fn update_policy(
        &mut self,
        policy: StockPolicy,
        at: DateTime<Utc>,
    ) -> DomainResult<Vec<AlertKind>> {
        let version = self.next_version()?;
        self.policy = policy;
        let raised = self.merge_alerts(at);
        self.touch(version, at);
        Ok(raised)
    }

    pub fn discontinue(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        if self.status == StockStatus::Discontinued {
            return Err(DomainError::conflict(format!("{} is already discontinued", self.sku)));
        }
        let version = self.next_version()?;
        self.status = StockStatus::Discontinued;
        self.touch(version, at);
        Ok(())
    }

    pub fn reactivate(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        if self.status == StockStatus::Active {
            return Err(DomainError::conflict(format!("{} is already active", self.sku)));
        }
        let version = self.next_version()?;
        self.status = StockStatus::Active;
        self.touch(version, at);
        Ok(())
    }

    pub(crate) fn recompute_available(&mut self) {
        self.available_stock = self.current_stock.saturating_sub(self.reserved_stock);
    }

    /// The version the next mutation will carry.
    ///
    /// Mutators call this before changing anything, so a record whose version
    /// cannot advance is rejected untouched.
    pub(crate) fn next_version(&self) -> DomainResult<u64> {
        self.version.checked_add(1).ok_or_else(|| {
            DomainError::invariant(format!("{} has exhausted its version counter", self.sku))
        })
    }

    /// Record a successful mutation.
    pub(crate) fn touch(&mut self, version: u64, at: DateTime<Utc>) {
        self.updated_at = at;
        self.version = version;
    }
}

impl AggregateRoot for StockRecord {
    type Id = Sku;

    fn id(&self) -> &Self::Id {
        &self.sku
    }

    fn version(&self) -> u64 {
        self.version
    }
}
