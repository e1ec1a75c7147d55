use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use stockroom_core::{DomainError, MovementId};

/// The four kinds of stock movement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// Units received into physical stock.
    In,
    /// Units removed from physical stock (sold, shipped, written off).
    Out,
    /// Units allocated to a pending order.
    Reserved,
    /// A previous allocation released.
    Unreserved,
}

impl MovementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementKind::In => "in",
            MovementKind::Out => "out",
            MovementKind::Reserved => "reserved",
            MovementKind::Unreserved => "unreserved",
        }
    }
}

impl core::str::FromStr for MovementKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(MovementKind::In),
            "out" => Ok(MovementKind::Out),
            "reserved" => Ok(MovementKind::Reserved),
            "unreserved" => Ok(MovementKind::Unreserved),
            other => Err(DomainError::invalid_movement(format!(
                "unknown movement type {other:?} (expected in, out, reserved or unreserved)"
            ))),
        }
    }
}

impl core::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Untrusted movement input as it arrives from a caller.
///
/// Every field is an optional raw JSON value so that malformed input (a missing
/// field, `null`, a string quantity, a fractional quantity) is reported as
/// [`DomainError::InvalidMovement`] instead of a decode failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementRequest {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performed_by: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<Value>,
}

impl MovementRequest {
    pub fn new(
        kind: impl Into<String>,
        quantity: i64,
        reason: impl Into<String>,
        performed_by: impl Into<String>,
    ) -> Self {
        Self {
            kind: Some(Value::String(kind.into())),
            quantity: Some(Value::from(quantity)),
            reason: Some(Value::String(reason.into())),
            reference: None,
            performed_by: Some(Value::String(performed_by.into())),
            notes: None,
        }
    }

    pub fn with_reference(mut self, reference: Option<String>) -> Self {
        self.reference = reference.map(Value::String);
        self
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes.map(Value::String);
        self
    }
}

/// A validated movement, ready to be applied to a stock record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Movement {
    kind: MovementKind,
    quantity: u64,
    reason: String,
    reference: Option<String>,
    performed_by: String,
    notes: Option<String>,
}

impl Movement {
    pub fn new(
        kind: MovementKind,
        quantity: u64,
        reason: impl Into<String>,
        performed_by: impl Into<String>,
    ) -> Result<Self, DomainError> {
        if quantity == 0 {
            return Err(DomainError::invalid_movement("quantity must be greater than zero"));
        }

        let reason = reason.into().trim().to_string();
        if reason.is_empty() {
            return Err(DomainError::invalid_movement("reason cannot be empty"));
        }

        let performed_by = performed_by.into().trim().to_string();
        if performed_by.is_empty() {
            return Err(DomainError::invalid_movement("performedBy cannot be empty"));
        }

        Ok(Self {
            kind,
            quantity,
            reason,
            reference: None,
            performed_by,
            notes: None,
        })
    }

    pub fn kind(&self) -> MovementKind {
        self.kind
    }

    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    pub(crate) fn into_record(self, at: DateTime<Utc>) -> MovementRecord {
        MovementRecord {
            id: MovementId::new(),
            kind: self.kind,
            quantity: self.quantity,
            reason: self.reason,
            reference: self.reference,
            performed_by: self.performed_by,
            notes: self.notes,
            timestamp: at,
        }
    }
}

impl TryFrom<MovementRequest> for Movement {
    type Error = DomainError;

    fn try_from(req: MovementRequest) -> Result<Self, Self::Error> {
        let kind: MovementKind = text("type", req.kind)?
            .ok_or_else(|| DomainError::invalid_movement("type is required"))?
            .parse()?;
        let quantity = quantity(req.quantity)?;
        let reason = text("reason", req.reason)?.unwrap_or_default();
        let performed_by = text("performedBy", req.performed_by)?.unwrap_or_default();

        let mut movement = Movement::new(kind, quantity, reason, performed_by)?;
        movement.reference = text("reference", req.reference)?;
        movement.notes = text("notes", req.notes)?;
        Ok(movement)
    }
}

/// A trimmed string field; absent, `null` and blank all read as `None`.
fn text(field: &str, value: Option<Value>) -> Result<Option<String>, DomainError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            Ok((!s.is_empty()).then(|| s.to_string()))
        }
        Some(other) => Err(DomainError::invalid_movement(format!(
            "{field} must be a string (got {other})"
        ))),
    }
}

fn quantity(value: Option<Value>) -> Result<u64, DomainError> {
    let n = match value {
        None | Some(Value::Null) => {
            return Err(DomainError::invalid_movement("quantity is required"));
        }
        Some(Value::Number(n)) => n,
        Some(other) => {
            return Err(DomainError::invalid_movement(format!(
                "quantity must be a number (got {other})"
            )));
        }
    };

    match n.as_u64() {
        Some(q) if q > 0 => Ok(q),
        _ if n.is_f64() => Err(DomainError::invalid_movement(format!(
            "quantity must be a whole number (got {n})"
        ))),
        _ => Err(DomainError::invalid_movement(format!(
            "quantity must be greater than zero (got {n})"
        ))),
    }
}

/// An applied movement. Immutable once appended to a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementRecord {
    pub id: MovementId,
    #[serde(rename = "type")]
    pub kind: MovementKind,
    pub quantity: u64,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub performed_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub timestamp: DateTime<Utc>,
}
