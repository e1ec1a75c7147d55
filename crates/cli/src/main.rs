use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};

use stockroom_infra::Settings;
use stockroom_inventory::{AlertKind, Sku};

mod commands;

#[derive(Debug, Parser)]
#[command(name = "stockroom", version, about = "Inventory stock ledger and alerting")]
struct Cli {
    /// Configuration file (defaults to ./stockroom.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay movements from a JSON file against a record document and print the result.
    Apply {
        #[arg(long)]
        record: PathBuf,
        #[arg(long)]
        movements: PathBuf,
    },
    /// Merge current alert conditions into a record document and print it.
    Evaluate {
        #[arg(long)]
        record: PathBuf,
    },
    /// Register a new SKU in the configured store.
    Register {
        #[arg(long)]
        sku: Sku,
        #[arg(long)]
        name: String,
        #[arg(long)]
        min: u64,
        #[arg(long)]
        max: u64,
        #[arg(long)]
        reorder_point: u64,
        #[arg(long)]
        reorder_quantity: u64,
    },
    /// Apply one movement to a SKU in the configured store.
    Move {
        #[arg(long)]
        sku: Sku,
        #[arg(long = "type")]
        kind: String,
        #[arg(long, allow_negative_numbers = true)]
        quantity: i64,
        #[arg(long)]
        reason: String,
        #[arg(long = "by")]
        performed_by: String,
        #[arg(long)]
        reference: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Print a stock record from the configured store.
    Show {
        #[arg(long)]
        sku: Sku,
    },
    /// Mark the open alert of a kind as resolved.
    Resolve {
        #[arg(long)]
        sku: Sku,
        #[arg(long, value_enum)]
        alert: AlertArg,
        #[arg(long = "by")]
        resolved_by: String,
    },
    /// Print a report over every record in the configured store.
    Report {
        #[arg(value_enum)]
        kind: ReportKind,
    },
    /// Load configuration and verify the store is reachable.
    Check,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum AlertArg {
    LowStock,
    OutOfStock,
    Overstock,
}

impl From<AlertArg> for AlertKind {
    fn from(value: AlertArg) -> Self {
        match value {
            AlertArg::LowStock => AlertKind::LowStock,
            AlertArg::OutOfStock => AlertKind::OutOfStock,
            AlertArg::Overstock => AlertKind::Overstock,
        }
    }
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum ReportKind {
    Reorder,
    Alerts,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref()).context("failed to load configuration")?;
    stockroom_observability::init(&settings.log);

    commands::run(cli.command, &settings).await
}
