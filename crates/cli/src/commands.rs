use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use stockroom_core::ExpectedVersion;
use stockroom_infra::{
    InMemoryStockStore, PolicySettings, PostgresStockStore, Settings, StockService, StockStore,
    StoreBackend, StoreSettings,
};
use stockroom_inventory::{MovementRequest, NewStockRecord, StockPolicy, StockRecord};

use crate::{Command, ReportKind};

pub async fn run(command: Command, settings: &Settings) -> anyhow::Result<()> {
    match command {
        Command::Apply { record, movements } => {
            let record: StockRecord = read_json(&record)?;
            let movements: Vec<MovementRequest> = read_json(&movements)?;
            print_json(&replay(record, movements, settings.policy).await?)
        }
        Command::Evaluate { record } => {
            let mut record: StockRecord = read_json(&record)?;
            let raised = record.evaluate_alerts(Utc::now())?;
            info!(sku = %record.sku(), raised = raised.len(), "alerts evaluated");
            print_json(&record)
        }
        Command::Register {
            sku,
            name,
            min,
            max,
            reorder_point,
            reorder_quantity,
        } => {
            let service = open_service(settings).await?;
            let record = service
                .register(NewStockRecord {
                    sku,
                    name,
                    policy: StockPolicy {
                        min_stock_level: min,
                        max_stock_level: max,
                        reorder_point,
                        reorder_quantity,
                    },
                })
                .await?;
            print_json(&record)
        }
        Command::Move {
            sku,
            kind,
            quantity,
            reason,
            performed_by,
            reference,
            notes,
        } => {
            let service = open_service(settings).await?;
            let request = MovementRequest::new(kind, quantity, reason, performed_by)
                .with_reference(reference)
                .with_notes(notes);
            print_json(&service.apply_movement(&sku, request).await?)
        }
        Command::Show { sku } => {
            let service = open_service(settings).await?;
            print_json(&service.get(&sku).await?)
        }
        Command::Resolve {
            sku,
            alert,
            resolved_by,
        } => {
            let service = open_service(settings).await?;
            print_json(&service.resolve_alert(&sku, alert.into(), &resolved_by).await?)
        }
        Command::Report { kind } => {
            let service = open_service(settings).await?;
            match kind {
                ReportKind::Reorder => print_json(&service.reorder_report().await?),
                ReportKind::Alerts => print_json(&service.alert_report().await?),
            }
        }
        Command::Check => {
            let store = open_store(&settings.store).await?;
            let count = store.list().await?.len();
            info!(backend = ?settings.store.backend, records = count, "store reachable");
            println!("ok: {count} stock records");
            Ok(())
        }
    }
}

/// Apply `movements` in order to `record` through an in-memory service.
///
/// Stops at the first rejected movement and reports its position.
async fn replay(
    record: StockRecord,
    movements: Vec<MovementRequest>,
    policy: PolicySettings,
) -> anyhow::Result<StockRecord> {
    let sku = record.sku().clone();
    let store = InMemoryStockStore::new();
    store.store(&record, ExpectedVersion::Any).await?;
    let service = StockService::new(store, policy);

    let mut current = record;
    for (idx, movement) in movements.into_iter().enumerate() {
        current = service
            .apply_movement(&sku, movement)
            .await
            .with_context(|| format!("movement #{idx} was rejected"))?;
    }
    Ok(current)
}

/// Open the configured store for a command that reads or writes persisted records.
///
/// The memory backend starts empty and is dropped on exit, so these commands
/// refuse it instead of silently losing writes.
async fn open_service(settings: &Settings) -> anyhow::Result<StockService<Arc<dyn StockStore>>> {
    if settings.store.backend == StoreBackend::Memory {
        bail!(
            "this command needs a persistent store; set store.backend = \"postgres\" \
             (or STOCKROOM__STORE__BACKEND=postgres) and store.database_url"
        );
    }
    let store = open_store(&settings.store).await?;
    Ok(StockService::new(store, settings.policy))
}

async fn open_store(settings: &StoreSettings) -> anyhow::Result<Arc<dyn StockStore>> {
    match settings.backend {
        StoreBackend::Memory => {
            warn!("using the in-memory store; changes are discarded on exit");
            Ok(Arc::new(InMemoryStockStore::new()))
        }
        StoreBackend::Postgres => {
            let Some(url) = settings.database_url.as_deref() else {
                bail!("store.database_url is required for the postgres backend");
            };
            let store = PostgresStockStore::connect(url, settings.max_connections)
                .await
                .context("failed to connect to postgres")?;
            store.ensure_schema().await?;
            Ok(Arc::new(store))
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_inventory::{MovementKind, Sku};

    fn record() -> StockRecord {
        StockRecord::register(
            NewStockRecord {
                sku: Sku::parse("KETTLE-1").unwrap(),
                name: "Kettle".to_string(),
                policy: StockPolicy {
                    min_stock_level: 1,
                    max_stock_level: 30,
                    reorder_point: 4,
                    reorder_quantity: 12,
                },
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn movements(json: serde_json::Value) -> Vec<MovementRequest> {
        serde_json::from_value(json).unwrap()
    }

    #[tokio::test]
    async fn replay_applies_in_file_order() {
        let result = replay(
            record(),
            movements(serde_json::json!([
                { "type": "in", "quantity": 10, "reason": "po-1", "performedBy": "dock" },
                { "type": "reserved", "quantity": 3, "reason": "SO-9", "performedBy": "web" },
                { "type": "out", "quantity": 2, "reason": "SO-8", "performedBy": "dock" }
            ])),
            PolicySettings::default(),
        )
        .await
        .unwrap();

        assert_eq!(result.current_stock(), 8);
        assert_eq!(result.available_stock(), 5);
        let kinds: Vec<_> = result.movements().iter().map(|m| m.kind).collect();
        assert_eq!(kinds, vec![MovementKind::In, MovementKind::Reserved, MovementKind::Out]);
    }

    #[tokio::test]
    async fn store_commands_refuse_the_memory_backend() {
        let settings = Settings::default();
        assert_eq!(settings.store.backend, StoreBackend::Memory);

        let err = run(
            Command::Show {
                sku: Sku::parse("KETTLE-1").unwrap(),
            },
            &settings,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("persistent store"), "{err}");

        let err = run(Command::Report { kind: ReportKind::Reorder }, &settings)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("persistent store"), "{err}");
    }

    #[tokio::test]
    async fn check_accepts_the_memory_backend() {
        run(Command::Check, &Settings::default()).await.unwrap();
    }

    #[tokio::test]
    async fn replay_reports_the_rejected_position() {
        let err = replay(
            record(),
            movements(serde_json::json!([
                { "type": "in", "quantity": 1, "reason": "po", "performedBy": "dock" },
                { "type": "sideways", "quantity": 1, "reason": "?", "performedBy": "dock" }
            ])),
            PolicySettings::default(),
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("movement #1"));
    }
}
