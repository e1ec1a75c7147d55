//! Aggregate root trait and optimistic version expectations.

use crate::error::{DomainError, DomainResult};

/// Aggregate root marker + minimal interface.
///
/// A stock record is the only aggregate today, but stores and services are written
/// against this trait so they only depend on identity and version.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Number of successful mutations applied to this aggregate.
    ///
    /// `0` means the aggregate has never been persisted.
    fn version(&self) -> u64;
}

/// Optimistic concurrency expectation checked by stores on write.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (last writer wins).
    Any,
    /// Require the persisted aggregate to be at an exact version.
    ///
    /// `Exact(0)` requires that nothing is persisted yet.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}
