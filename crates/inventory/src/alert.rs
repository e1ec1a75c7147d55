//! Stock alert evaluation.
//!
//! Alerts are derived from the current counters and merged into the record's alert
//! list. At most one unresolved alert exists per [`AlertKind`]; an open alert is never
//! updated in place and never resolved automatically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{AlertId, DomainError, DomainResult};

use crate::record::StockRecord;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    LowStock,
    OutOfStock,
    Overstock,
}

impl AlertKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertKind::LowStock => "low_stock",
            AlertKind::OutOfStock => "out_of_stock",
            AlertKind::Overstock => "overstock",
        }
    }
}

impl core::str::FromStr for AlertKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low_stock" => Ok(AlertKind::LowStock),
            "out_of_stock" => Ok(AlertKind::OutOfStock),
            "overstock" => Ok(AlertKind::Overstock),
            other => Err(DomainError::validation(format!("unknown alert type {other:?}"))),
        }
    }
}

impl core::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    pub id: AlertId,
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    pub triggered_at: DateTime<Utc>,
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
}

/// A condition that currently holds for a record.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Firing {
    kind: AlertKind,
    severity: Severity,
    message: String,
}

/// Compute which alert conditions hold. Conditions are independent.
fn firing_conditions(record: &StockRecord) -> Vec<Firing> {
    let current = record.current_stock;
    let policy = &record.policy;
    let mut fired = Vec::new();

    if current > 0 && current <= policy.reorder_point {
        let severity = if current <= policy.min_stock_level {
            Severity::Critical
        } else {
            Severity::High
        };
        fired.push(Firing {
            kind: AlertKind::LowStock,
            severity,
            message: format!(
                "Low stock for {}: {current} units on hand (reorder point {})",
                record.sku, policy.reorder_point
            ),
        });
    }

    if current == 0 {
        fired.push(Firing {
            kind: AlertKind::OutOfStock,
            severity: Severity::Critical,
            message: format!("{} is out of stock", record.sku),
        });
    }

    if current > policy.max_stock_level {
        fired.push(Firing {
            kind: AlertKind::Overstock,
            severity: Severity::Medium,
            message: format!(
                "Overstock for {}: {current} units on hand (maximum {})",
                record.sku, policy.max_stock_level
            ),
        });
    }

    fired
}

impl StockRecord {
    /// Evaluate alert conditions and merge them into the alert list.
    ///
    /// Returns the kinds that were newly raised; bumps the version only when
    /// something was raised. Repeated calls on an unchanged record raise nothing.
    pub fn evaluate_alerts(&mut self, at: DateTime<Utc>) -> DomainResult<Vec<AlertKind>> {
        let version = self.next_version()?;
        let raised = self.merge_alerts(at);
        if !raised.is_empty() {
            self.touch(version, at);
        }
        Ok(raised)
    }

    /// Mark the open alert of `kind` as resolved.
    ///
    /// Once resolved, the same condition may raise a fresh alert on the next evaluation.
    pub fn resolve_alert(
        &mut self,
        kind: AlertKind,
        resolved_by: impl Into<String>,
        at: DateTime<Utc>,
    ) -> DomainResult<&AlertRecord> {
        let resolved_by = resolved_by.into().trim().to_string();
        if resolved_by.is_empty() {
            return Err(DomainError::validation("resolvedBy cannot be empty"));
        }

        let idx = self
            .alerts
            .iter()
            .position(|a| a.kind == kind && !a.resolved)
            .ok_or_else(|| DomainError::not_found(format!("open {kind} alert for {}", self.sku)))?;
        let version = self.next_version()?;

        let alert = &mut self.alerts[idx];
        alert.resolved = true;
        alert.resolved_at = Some(at);
        alert.resolved_by = Some(resolved_by);
        self.touch(version, at);

        Ok(&self.alerts[idx])
    }

    /// Append an alert for every firing condition with no open alert of its kind.
    pub(crate) fn merge_alerts(&mut self, at: DateTime<Utc>) -> Vec<AlertKind> {
        let mut raised = Vec::new();
        for firing in firing_conditions(self) {
            if self.has_open_alert(firing.kind) {
                continue;
            }
            self.alerts.push(AlertRecord {
                id: AlertId::new(),
                kind: firing.kind,
                severity: firing.severity,
                message: firing.message,
                triggered_at: at,
                resolved: false,
                resolved_at: None,
                resolved_by: None,
            });
            raised.push(firing.kind);
        }
        raised
    }
}
