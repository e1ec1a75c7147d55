//! Stock service: load → mutate → store for one SKU at a time.
//!
//! ```text
//! request
//!   ↓
//! 1. validate input (no IO yet; rejected input never touches the store)
//!   ↓
//! 2. load the record (NotFound if absent)
//!   ↓
//! 3. mutate in memory (ledger + alert evaluation)
//!   ↓
//! 4. store with ExpectedVersion::Exact(loaded version)
//! ```
//!
//! The store call is the only suspension point. Nothing is retried: a version
//! conflict or storage failure is returned to the caller unchanged.

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use stockroom_core::{AggregateRoot, DomainError, ExpectedVersion};
use stockroom_inventory::{
    AlertKind, AlertRecord, Movement, MovementRequest, NewStockRecord, Sku, StockPolicy,
    StockRecord, StockStatus,
};

use crate::config::PolicySettings;
use crate::store::{StockStore, StorageError};

#[derive(Debug, Error)]
pub enum StockServiceError {
    #[error("invalid movement: {0}")]
    InvalidMovement(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Stale version, duplicate registration, or an invalid state transition.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The record cannot be mutated any further (e.g. its version is exhausted).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Storage(StorageError),
}

impl From<DomainError> for StockServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::InvalidMovement(msg) => StockServiceError::InvalidMovement(msg),
            DomainError::Validation(msg) => StockServiceError::Validation(msg),
            DomainError::InvalidId(msg) => StockServiceError::Validation(msg),
            DomainError::InvariantViolation(msg) => StockServiceError::InvariantViolation(msg),
            DomainError::NotFound(msg) => StockServiceError::NotFound(msg),
            DomainError::Conflict(msg) => StockServiceError::Conflict(msg),
        }
    }
}

impl From<StorageError> for StockServiceError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::Concurrency(msg) => StockServiceError::Conflict(msg),
            other => StockServiceError::Storage(other),
        }
    }
}

/// One line of the reorder report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderLine {
    pub sku: Sku,
    pub name: String,
    pub current_stock: u64,
    pub available_stock: u64,
    pub reorder_point: u64,
    pub reorder_quantity: u64,
}

/// Open alerts of one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertLine {
    pub sku: Sku,
    pub name: String,
    pub alerts: Vec<AlertRecord>,
}

#[derive(Debug)]
pub struct StockService<S> {
    store: S,
    policy: PolicySettings,
}

impl<S> StockService<S> {
    pub fn new(store: S, policy: PolicySettings) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn check_policy(&self, policy: &StockPolicy) -> Result<(), StockServiceError> {
        if self.policy.enforce_ordering {
            policy.check_ordering()?;
        }
        Ok(())
    }
}

impl<S> StockService<S>
where
    S: StockStore,
{
    #[instrument(skip_all, fields(sku = %new.sku), err)]
    pub async fn register(&self, new: NewStockRecord) -> Result<StockRecord, StockServiceError> {
        self.check_policy(&new.policy)?;

        let record = StockRecord::register(new, Utc::now())?;
        self.store
            .store(&record, ExpectedVersion::Exact(0))
            .await
            .map_err(|e| match e {
                StorageError::Concurrency(_) => {
                    StockServiceError::Conflict(format!("{} is already registered", record.sku()))
                }
                other => StockServiceError::Storage(other),
            })?;

        info!(sku = %record.sku(), "stock record registered");
        Ok(record)
    }

    pub async fn get(&self, sku: &Sku) -> Result<StockRecord, StockServiceError> {
        self.store
            .load(sku)
            .await?
            .ok_or_else(|| StockServiceError::NotFound(format!("stock record {sku}")))
    }

    /// Apply one movement and persist the result.
    #[instrument(skip_all, fields(sku = %sku), err)]
    pub async fn apply_movement(
        &self,
        sku: &Sku,
        request: MovementRequest,
    ) -> Result<StockRecord, StockServiceError> {
        let movement = Movement::try_from(request)?;
        let kind = movement.kind();
        let quantity = movement.quantity();

        let (record, outcome) = self
            .mutate(sku, |record| record.apply_movement(movement, Utc::now()))
            .await?;

        if outcome.clamped > 0 {
            warn!(
                sku = %sku,
                kind = %kind,
                requested = quantity,
                clamped = outcome.clamped,
                "movement exceeded stock on hand; clamped at zero"
            );
        }
        for alert in &outcome.raised {
            warn!(sku = %sku, alert = %alert, "stock alert raised");
        }
        info!(
            sku = %sku,
            kind = %kind,
            quantity,
            current = record.current_stock(),
            reserved = record.reserved_stock(),
            available = record.available_stock(),
            version = record.version(),
            "movement applied"
        );

        Ok(record)
    }

    /// Re-run alert evaluation; stores only if something was raised.
    #[instrument(skip_all, fields(sku = %sku), err)]
    pub async fn evaluate(&self, sku: &Sku) -> Result<StockRecord, StockServiceError> {
        let mut record = self.get(sku).await?;
        let loaded = record.version();

        let raised = record.evaluate_alerts(Utc::now())?;
        if raised.is_empty() {
            return Ok(record);
        }

        self.store.store(&record, ExpectedVersion::Exact(loaded)).await?;
        for alert in raised {
            warn!(sku = %sku, alert = %alert, "stock alert raised");
        }
        Ok(record)
    }

    #[instrument(skip_all, fields(sku = %sku), err)]
    pub async fn update_policy(
        &self,
        sku: &Sku,
        policy: StockPolicy,
    ) -> Result<StockRecord, StockServiceError> {
        self.check_policy(&policy)?;

        let (record, raised) = self
            .mutate(sku, |record| record.update_policy(policy, Utc::now()))
            .await?;
        for alert in raised {
            warn!(sku = %sku, alert = %alert, "stock alert raised");
        }
        Ok(record)
    }

    #[instrument(skip_all, fields(sku = %sku, alert = %kind), err)]
    pub async fn resolve_alert(
        &self,
        sku: &Sku,
        kind: AlertKind,
        resolved_by: &str,
    ) -> Result<AlertRecord, StockServiceError> {
        let (_, alert) = self
            .mutate(sku, |record| {
                record
                    .resolve_alert(kind, resolved_by, Utc::now())
                    .map(Clone::clone)
            })
            .await?;

        info!(sku = %sku, alert = %kind, resolved_by, "stock alert resolved");
        Ok(alert)
    }

    #[instrument(skip_all, fields(sku = %sku), err)]
    pub async fn discontinue(&self, sku: &Sku) -> Result<StockRecord, StockServiceError> {
        let (record, ()) = self
            .mutate(sku, |record| record.discontinue(Utc::now()))
            .await?;
        Ok(record)
    }

    #[instrument(skip_all, fields(sku = %sku), err)]
    pub async fn reactivate(&self, sku: &Sku) -> Result<StockRecord, StockServiceError> {
        let (record, ()) = self
            .mutate(sku, |record| record.reactivate(Utc::now()))
            .await?;
        Ok(record)
    }

    /// Active records at or below their reorder point.
    pub async fn reorder_report(&self) -> Result<Vec<ReorderLine>, StockServiceError> {
        let records = self.store.list().await?;
        Ok(records
            .into_iter()
            .filter(|r| r.status() == StockStatus::Active && r.needs_reorder())
            .map(|r| ReorderLine {
                sku: r.sku().clone(),
                name: r.name().to_string(),
                current_stock: r.current_stock(),
                available_stock: r.available_stock(),
                reorder_point: r.policy().reorder_point,
                reorder_quantity: r.policy().reorder_quantity,
            })
            .collect())
    }

    /// Records with at least one unresolved alert.
    pub async fn alert_report(&self) -> Result<Vec<AlertLine>, StockServiceError> {
        let records = self.store.list().await?;
        Ok(records
            .into_iter()
            .filter_map(|r| {
                let alerts: Vec<_> = r.active_alerts().cloned().collect();
                (!alerts.is_empty()).then(|| AlertLine {
                    sku: r.sku().clone(),
                    name: r.name().to_string(),
                    alerts,
                })
            })
            .collect())
    }

    /// Load, apply `f`, and store against the loaded version.
    ///
    /// If `f` fails nothing is stored.
    async fn mutate<T>(
        &self,
        sku: &Sku,
        f: impl FnOnce(&mut StockRecord) -> Result<T, DomainError>,
    ) -> Result<(StockRecord, T), StockServiceError> {
        let mut record = self.get(sku).await?;
        let loaded = record.version();

        let out = f(&mut record)?;
        self.store.store(&record, ExpectedVersion::Exact(loaded)).await?;

        Ok((record, out))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::store::InMemoryStockStore;
    use stockroom_inventory::MovementKind;

    fn sku(s: &str) -> Sku {
        Sku::parse(s).unwrap()
    }

    fn policy() -> StockPolicy {
        StockPolicy {
            min_stock_level: 2,
            max_stock_level: 40,
            reorder_point: 5,
            reorder_quantity: 25,
        }
    }

    fn new_record(s: &str) -> NewStockRecord {
        NewStockRecord {
            sku: sku(s),
            name: format!("Item {s}"),
            policy: policy(),
        }
    }

    fn request(kind: &str, quantity: i64) -> MovementRequest {
        MovementRequest::new(kind, quantity, "test", "tester")
    }

    fn service() -> StockService<Arc<InMemoryStockStore>> {
        StockService::new(Arc::new(InMemoryStockStore::new()), PolicySettings::default())
    }

    #[tokio::test]
    async fn movement_is_applied_and_persisted() {
        let svc = service();
        svc.register(new_record("TEE-M")).await.unwrap();

        let returned = svc.apply_movement(&sku("TEE-M"), request("in", 12)).await.unwrap();
        let persisted = svc.get(&sku("TEE-M")).await.unwrap();

        assert_eq!(returned, persisted);
        assert_eq!(persisted.current_stock(), 12);
        assert_eq!(persisted.movements().len(), 1);
        assert_eq!(persisted.movements()[0].kind, MovementKind::In);
    }

    #[tokio::test]
    async fn duplicate_registration_is_conflict() {
        let svc = service();
        svc.register(new_record("TEE-M")).await.unwrap();
        let err = svc.register(new_record("TEE-M")).await.unwrap_err();
        assert!(matches!(
            err,
            StockServiceError::Conflict(msg) if msg.contains("already registered")
        ));
    }

    #[tokio::test]
    async fn policy_ordering_is_enforced_by_default() {
        let svc = service();
        let mut new = new_record("TEE-M");
        new.policy.reorder_point = 100;
        let err = svc.register(new).await.unwrap_err();
        assert!(matches!(err, StockServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn policy_ordering_can_be_relaxed() {
        let svc = StockService::new(
            InMemoryStockStore::new(),
            PolicySettings {
                enforce_ordering: false,
            },
        );
        let mut new = new_record("TEE-M");
        new.policy.reorder_point = 100;
        svc.register(new).await.unwrap();
    }

    #[tokio::test]
    async fn invalid_movement_never_reaches_the_store() {
        let svc = service();
        let registered = svc.register(new_record("TEE-M")).await.unwrap();

        for bad in [request("in", 0), request("bogus", 1)] {
            let err = svc.apply_movement(&sku("TEE-M"), bad).await.unwrap_err();
            assert!(matches!(err, StockServiceError::InvalidMovement(_)));
        }

        assert_eq!(svc.get(&sku("TEE-M")).await.unwrap(), registered);
    }

    #[tokio::test]
    async fn unknown_sku_is_not_found() {
        let svc = service();
        let err = svc.apply_movement(&sku("GHOST"), request("in", 1)).await.unwrap_err();
        assert!(matches!(err, StockServiceError::NotFound(_)));
        assert!(svc.store().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stale_record_write_is_conflict() {
        let svc = service();
        svc.register(new_record("TEE-M")).await.unwrap();
        let stale = svc.get(&sku("TEE-M")).await.unwrap();

        svc.apply_movement(&sku("TEE-M"), request("in", 3)).await.unwrap();

        let err = svc
            .store()
            .store(&stale, ExpectedVersion::Exact(stale.version()))
            .await
            .unwrap_err();
        assert!(matches!(
            StockServiceError::from(err),
            StockServiceError::Conflict(_)
        ));
    }

    #[tokio::test]
    async fn resolve_alert_and_reports() {
        let svc = service();
        svc.register(new_record("A-1")).await.unwrap();
        svc.register(new_record("B-2")).await.unwrap();
        svc.apply_movement(&sku("B-2"), request("in", 30)).await.unwrap();

        // A-1 is empty: out of stock and below its reorder point.
        let reorder = svc.reorder_report().await.unwrap();
        assert_eq!(reorder.len(), 1);
        assert_eq!(reorder[0].sku, sku("A-1"));
        assert_eq!(reorder[0].reorder_quantity, 25);

        let alert = svc
            .resolve_alert(&sku("A-1"), AlertKind::OutOfStock, "buyer")
            .await
            .unwrap();
        assert!(alert.resolved);

        // B-2's out-of-stock alert from registration is still open.
        let alerts = svc.alert_report().await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].sku, sku("B-2"));

        let err = svc
            .resolve_alert(&sku("A-1"), AlertKind::OutOfStock, "buyer")
            .await
            .unwrap_err();
        assert!(matches!(err, StockServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn evaluate_only_stores_when_something_is_raised() {
        let svc = service();
        svc.register(new_record("A-1")).await.unwrap();
        let before = svc.get(&sku("A-1")).await.unwrap();

        let after = svc.evaluate(&sku("A-1")).await.unwrap();
        assert_eq!(after.version(), before.version());

        svc.resolve_alert(&sku("A-1"), AlertKind::OutOfStock, "ops").await.unwrap();
        let reraised = svc.evaluate(&sku("A-1")).await.unwrap();
        assert!(reraised.has_open_alert(AlertKind::OutOfStock));
        assert_eq!(svc.get(&sku("A-1")).await.unwrap(), reraised);
    }

    #[tokio::test]
    async fn discontinued_records_leave_the_reorder_report() {
        let svc = service();
        svc.register(new_record("A-1")).await.unwrap();
        svc.discontinue(&sku("A-1")).await.unwrap();

        assert!(svc.reorder_report().await.unwrap().is_empty());
        assert!(matches!(
            svc.discontinue(&sku("A-1")).await,
            Err(StockServiceError::Conflict(_))
        ));

        // Movements are still accepted on discontinued records.
        let record = svc.apply_movement(&sku("A-1"), request("in", 1)).await.unwrap();
        assert_eq!(record.status(), StockStatus::Discontinued);

        let record = svc.reactivate(&sku("A-1")).await.unwrap();
        assert_eq!(record.status(), StockStatus::Active);
    }

    #[tokio::test]
    async fn update_policy_reevaluates() {
        let svc = service();
        svc.register(new_record("A-1")).await.unwrap();
        svc.apply_movement(&sku("A-1"), request("in", 30)).await.unwrap();

        let mut tighter = policy();
        tighter.max_stock_level = 20;
        let record = svc.update_policy(&sku("A-1"), tighter).await.unwrap();
        assert!(record.has_open_alert(AlertKind::Overstock));
    }

    #[tokio::test]
    async fn exhausted_version_is_reported_and_not_stored() {
        let svc = service();
        let registered = svc.register(new_record("A-1")).await.unwrap();
        let mut doc = serde_json::to_value(&registered).unwrap();
        doc["version"] = serde_json::json!(u64::MAX);
        let record: StockRecord = serde_json::from_value(doc).unwrap();
        svc.store().store(&record, ExpectedVersion::Any).await.unwrap();

        let err = svc.apply_movement(&sku("A-1"), request("in", 1)).await.unwrap_err();
        assert!(matches!(err, StockServiceError::InvariantViolation(_)));
        assert_eq!(svc.get(&sku("A-1")).await.unwrap(), record);
    }

    #[tokio::test]
    async fn wrongly_typed_quantity_is_invalid_movement() {
        let svc = service();
        svc.register(new_record("A-1")).await.unwrap();

        let mut bad = request("in", 1);
        bad.quantity = Some(serde_json::json!("5"));
        let err = svc.apply_movement(&sku("A-1"), bad).await.unwrap_err();
        assert!(matches!(err, StockServiceError::InvalidMovement(_)));
    }

    /// A store whose backend is down.
    struct BrokenStore;

    #[async_trait]
    impl StockStore for BrokenStore {
        async fn load(&self, _sku: &Sku) -> Result<Option<StockRecord>, StorageError> {
            Err(StorageError::Backend("connection refused".to_string()))
        }

        async fn store(
            &self,
            _record: &StockRecord,
            _expected: ExpectedVersion,
        ) -> Result<(), StorageError> {
            Err(StorageError::Backend("connection refused".to_string()))
        }

        async fn list(&self) -> Result<Vec<StockRecord>, StorageError> {
            Err(StorageError::Backend("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn storage_failures_surface_unchanged() {
        let svc = StockService::new(BrokenStore, PolicySettings::default());

        let err = svc.apply_movement(&sku("A-1"), request("in", 1)).await.unwrap_err();
        assert!(matches!(
            err,
            StockServiceError::Storage(StorageError::Backend(msg)) if msg == "connection refused"
        ));

        let err = svc.register(new_record("A-1")).await.unwrap_err();
        assert!(matches!(err, StockServiceError::Storage(StorageError::Backend(_))));
    }
}
