//! Stock ledger: applying movements to a record.
//!
//! ```text
//! in          current  += q
//! out         current   = max(0, current - q)   (clamped, never rejected)
//! reserved    reserved += q
//! unreserved  reserved  = max(0, reserved - q)
//! ```
//!
//! After every movement `available = max(0, current - reserved)` is recomputed, the
//! movement is appended to the log and alerts are re-evaluated.

use chrono::{DateTime, Utc};

use stockroom_core::DomainResult;

use crate::alert::AlertKind;
use crate::movement::{Movement, MovementKind, MovementRecord, MovementRequest};
use crate::record::StockRecord;

/// What a single applied movement did to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementOutcome {
    pub movement: MovementRecord,
    /// Alerts newly raised by the movement.
    pub raised: Vec<AlertKind>,
    /// Units requested by an `out`/`unreserved` movement that exceeded the counter.
    pub clamped: u64,
}

impl StockRecord {
    /// Validate untrusted input, then apply it.
    ///
    /// A rejected request leaves the record untouched.
    pub fn apply_request(
        &mut self,
        request: MovementRequest,
        at: DateTime<Utc>,
    ) -> DomainResult<MovementOutcome> {
        let movement = Movement::try_from(request)?;
        self.apply_movement(movement, at)
    }

    /// Apply a validated movement.
    ///
    /// Fails only when the record's version cannot advance, in which case
    /// nothing is changed.
    pub fn apply_movement(
        &mut self,
        movement: Movement,
        at: DateTime<Utc>,
    ) -> DomainResult<MovementOutcome> {
        let version = self.next_version()?;
        let q = movement.quantity();
        let mut clamped = 0;

        match movement.kind() {
            MovementKind::In => {
                self.current_stock = self.current_stock.saturating_add(q);
            }
            MovementKind::Out => {
                clamped = q.saturating_sub(self.current_stock);
                self.current_stock = self.current_stock.saturating_sub(q);
                self.last_sold = Some(at);
            }
            MovementKind::Reserved => {
                self.reserved_stock = self.reserved_stock.saturating_add(q);
            }
            MovementKind::Unreserved => {
                clamped = q.saturating_sub(self.reserved_stock);
                self.reserved_stock = self.reserved_stock.saturating_sub(q);
            }
        }
        self.recompute_available();

        let record = movement.into_record(at);
        self.movements.push(record.clone());

        let raised = self.merge_alerts(at);
        self.touch(version, at);

        Ok(MovementOutcome {
            movement: record,
            raised,
            clamped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{NewStockRecord, StockPolicy};
    use stockroom_core::DomainError;
    use crate::sku::Sku;
    use proptest::prelude::*;
    use stockroom_core::AggregateRoot;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn test_record() -> StockRecord {
        StockRecord::register(
            NewStockRecord {
                sku: Sku::parse("SOCK-GRN-L").unwrap(),
                name: "Green socks, large".to_string(),
                policy: StockPolicy {
                    min_stock_level: 5,
                    max_stock_level: 200,
                    reorder_point: 20,
                    reorder_quantity: 100,
                },
            },
            test_time(),
        )
        .unwrap()
    }

    fn movement(kind: MovementKind, quantity: u64) -> Movement {
        Movement::new(kind, quantity, "test", "tester").unwrap()
    }

    fn request(kind: &str, quantity: i64) -> MovementRequest {
        MovementRequest::new(kind, quantity, "test", "tester")
    }

    #[test]
    fn out_is_clamped_at_zero() {
        let mut record = test_record();
        record.apply_movement(movement(MovementKind::In, 5), test_time()).unwrap();

        let outcome = record
            .apply_movement(movement(MovementKind::Out, 9), test_time())
            .unwrap();

        assert_eq!(record.current_stock(), 0);
        assert_eq!(outcome.clamped, 4);
        assert_eq!(outcome.movement.quantity, 9);
    }

    #[test]
    fn in_then_out_logs_both_in_order() {
        let mut record = test_record();
        record.apply_movement(movement(MovementKind::In, 30), test_time()).unwrap();
        let before = record.current_stock();
        let log_before = record.movements().len();

        record.apply_movement(movement(MovementKind::In, 5), test_time()).unwrap();
        record.apply_movement(movement(MovementKind::Out, 5), test_time()).unwrap();

        assert_eq!(record.current_stock(), before);
        let kinds: Vec<_> = record.movements()[log_before..].iter().map(|m| m.kind).collect();
        assert_eq!(kinds, vec![MovementKind::In, MovementKind::Out]);
    }

    #[test]
    fn in_five_out_three_leaves_two_entries() {
        let mut record = test_record();
        record.apply_movement(movement(MovementKind::In, 5), test_time()).unwrap();
        record.apply_movement(movement(MovementKind::Out, 3), test_time()).unwrap();

        assert_eq!(record.current_stock(), 2);
        assert_eq!(record.movements().len(), 2);
        assert_eq!(record.movements()[0].kind, MovementKind::In);
        assert_eq!(record.movements()[1].kind, MovementKind::Out);
        assert!(record.movements()[0].timestamp <= record.movements()[1].timestamp);
    }

    #[test]
    fn reservations_reduce_available_stock() {
        let mut record = test_record();
        record.apply_movement(movement(MovementKind::In, 10), test_time()).unwrap();
        record.apply_movement(movement(MovementKind::Reserved, 4), test_time()).unwrap();
        assert_eq!(record.available_stock(), 6);

        record.apply_movement(movement(MovementKind::Reserved, 10), test_time()).unwrap();
        assert_eq!(record.reserved_stock(), 14);
        assert_eq!(record.available_stock(), 0);

        let outcome = record
            .apply_movement(movement(MovementKind::Unreserved, 20), test_time())
            .unwrap();
        assert_eq!(outcome.clamped, 6);
        assert_eq!(record.reserved_stock(), 0);
        assert_eq!(record.available_stock(), 10);
    }

    #[test]
    fn last_sold_only_moves_on_out() {
        let mut record = test_record();
        record.apply_movement(movement(MovementKind::In, 10), test_time()).unwrap();
        record.apply_movement(movement(MovementKind::Reserved, 1), test_time()).unwrap();
        assert_eq!(record.last_sold(), None);

        let at = test_time();
        record.apply_movement(movement(MovementKind::Out, 1), at).unwrap();
        assert_eq!(record.last_sold(), Some(at));
    }

    #[test]
    fn movement_raises_alerts() {
        let mut record = test_record();
        let outcome = record.apply_movement(movement(MovementKind::In, 15), test_time()).unwrap();
        assert_eq!(outcome.raised, vec![AlertKind::LowStock]);

        let outcome = record.apply_movement(movement(MovementKind::In, 300), test_time()).unwrap();
        assert_eq!(outcome.raised, vec![AlertKind::Overstock]);
    }

    #[test]
    fn invalid_request_leaves_record_unchanged() {
        let mut record = test_record();
        record.apply_movement(movement(MovementKind::In, 7), test_time()).unwrap();
        let snapshot = record.clone();

        for bad in [request("in", 0), request("bogus", 3)] {
            let err = record.apply_request(bad, test_time()).unwrap_err();
            assert!(matches!(err, DomainError::InvalidMovement(_)));
        }

        assert_eq!(record, snapshot);
        assert_eq!(record.movements().len(), 1);
    }

    #[test]
    fn each_movement_bumps_version_once() {
        let mut record = test_record();
        let v = record.version();
        record.apply_request(request("in", 3), test_time()).unwrap();
        record.apply_request(request("reserved", 1), test_time()).unwrap();
        assert_eq!(record.version(), v + 2);
    }

    #[test]
    fn movement_history_queries() {
        let mut record = test_record();
        record.apply_movement(movement(MovementKind::In, 40), test_time()).unwrap();
        record.apply_movement(movement(MovementKind::Out, 3), test_time()).unwrap();
        record.apply_movement(movement(MovementKind::Out, 4), test_time()).unwrap();
        record.apply_movement(movement(MovementKind::Reserved, 2), test_time()).unwrap();

        let outs: Vec<_> = record.movements_of(MovementKind::Out).map(|m| m.quantity).collect();
        assert_eq!(outs, vec![3, 4]);

        let recent: Vec<_> = record.recent_movements(2).map(|m| m.kind).collect();
        assert_eq!(recent, vec![MovementKind::Reserved, MovementKind::Out]);
        assert_eq!(record.recent_movements(10).count(), 4);
    }

    #[test]
    fn exhausted_version_leaves_record_unchanged() {
        let mut record = test_record();
        record.version = u64::MAX;
        let snapshot = record.clone();

        let err = record
            .apply_movement(movement(MovementKind::In, 1), test_time())
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(record, snapshot);
    }

    #[test]
    fn counters_saturate_instead_of_overflowing() {
        let mut record = test_record();
        record.apply_movement(movement(MovementKind::In, u64::MAX), test_time()).unwrap();
        record.apply_movement(movement(MovementKind::In, 1), test_time()).unwrap();
        assert_eq!(record.current_stock(), u64::MAX);
    }

    fn arb_kind() -> impl Strategy<Value = MovementKind> {
        prop_oneof![
            Just(MovementKind::In),
            Just(MovementKind::Out),
            Just(MovementKind::Reserved),
            Just(MovementKind::Unreserved),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: available stock is always max(0, current - reserved).
        #[test]
        fn available_is_always_derived(
            moves in prop::collection::vec((arb_kind(), 1u64..500u64), 1..40)
        ) {
            let mut record = test_record();
            for (kind, q) in moves {
                record.apply_movement(movement(kind, q), test_time()).unwrap();
                prop_assert_eq!(
                    record.available_stock(),
                    record.current_stock().saturating_sub(record.reserved_stock())
                );
            }
        }

        /// Property: the log grows by exactly one entry per movement and keeps order.
        #[test]
        fn log_is_append_only(
            moves in prop::collection::vec((arb_kind(), 1u64..500u64), 1..40)
        ) {
            let mut record = test_record();
            for (i, (kind, q)) in moves.iter().enumerate() {
                record.apply_movement(movement(*kind, *q), test_time()).unwrap();
                prop_assert_eq!(record.movements().len(), i + 1);
                prop_assert_eq!(record.movements()[i].kind, *kind);
            }
        }

        /// Property: at most one unresolved alert per kind, whatever the history.
        #[test]
        fn one_open_alert_per_kind(
            moves in prop::collection::vec((arb_kind(), 1u64..500u64), 1..40)
        ) {
            let mut record = test_record();
            for (kind, q) in moves {
                record.apply_movement(movement(kind, q), test_time()).unwrap();
                record.evaluate_alerts(test_time()).unwrap();
            }
            for kind in [AlertKind::LowStock, AlertKind::OutOfStock, AlertKind::Overstock] {
                prop_assert!(record.active_alerts().filter(|a| a.kind == kind).count() <= 1);
            }
        }
    }
}
