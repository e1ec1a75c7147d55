//! `stockroom-core`: shared domain primitives.
//!
//! Identifiers, the domain error model, and optimistic versioning. No IO lives here.

pub mod aggregate;
pub mod error;
pub mod id;

pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AlertId, MovementId};
