//! Incoming receipt tests
//!
//! Tests for receipt lines and their corrections including:
//! - Short derived from total and received
//! - Corrections move stock by exactly the difference
//! - Moving short units to rejected leaves stock alone
//! - Line invariants hold after every accepted correction

use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    apply_stock_delta, receipt_transition_delta, GstBreakdown, ItemQuantities, LedgerError,
    StatusTransition,
};
use std::str::FromStr;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// Receipt of 100 with 80 received, then short is corrected twice
    #[test]
    fn test_short_arrival_walkthrough() {
        let line = ItemQuantities::resolve(80, None, Some(100)).unwrap();
        assert_eq!(line.short, 20);

        let mut stock = 0;
        stock = apply_stock_delta(
            stock,
            receipt_transition_delta(StatusTransition::Complete, &line),
        )
        .stock_after;
        assert_eq!(stock, 80);

        // 15 of the 20 missing units turn up
        let arrived = line.correct(None, Some(5)).unwrap();
        assert_eq!(arrived.after.arrived_short(), 15);
        assert_eq!(arrived.stock_delta(), 15);
        stock = apply_stock_delta(stock, arrived.stock_delta()).stock_after;
        assert_eq!(stock, 95);

        // The last five never come and are booked as rejected
        let moved = arrived.after.move_short_to_rejected(5).unwrap();
        assert_eq!(moved.after.short, 0);
        assert_eq!(moved.after.rejected, 5);
        assert_eq!(moved.stock_delta(), 0);
        assert_eq!(moved.after.available(), 95);
        assert_eq!(
            receipt_transition_delta(StatusTransition::Revert, &moved.after),
            -95
        );
    }

    /// A rejection booked while the receipt is a draft is not counted on completion
    #[test]
    fn test_draft_rejection_is_excluded_on_completion() {
        let line = ItemQuantities::receipt(10, 0).unwrap();
        let rejected = line.move_received_to_rejected(4).unwrap().after;
        let stock = apply_stock_delta(
            0,
            receipt_transition_delta(StatusTransition::Complete, &rejected),
        )
        .stock_after;
        assert_eq!(stock, 6);
        assert_eq!(i64::from(stock), rejected.available());
    }

    #[test]
    fn test_rejection_leaves_stock() {
        let line = ItemQuantities::receipt(50, 0).unwrap();
        let correction = line.correct(Some(8), None).unwrap();
        assert_eq!(correction.rejected_diff, 8);
        assert_eq!(correction.stock_delta(), -8);
        assert_eq!(correction.after.available(), 42);
    }

    #[test]
    fn test_reducing_rejection_returns_stock() {
        let line = ItemQuantities::receipt(50, 0).unwrap();
        let rejected = line.correct(Some(8), None).unwrap().after;
        let back = rejected.correct(Some(3), None).unwrap();
        assert_eq!(back.stock_delta(), 5);
        assert_eq!(back.after.available(), 47);
    }

    #[test]
    fn test_rejected_cannot_exceed_received() {
        let line = ItemQuantities::receipt(10, 5).unwrap();
        assert!(matches!(
            line.correct(Some(11), None),
            Err(LedgerError::RejectedExceedsReceived { .. })
        ));
        assert!(matches!(
            line.move_received_to_rejected(11),
            Err(LedgerError::InsufficientUnits { field: "received", .. })
        ));
    }

    #[test]
    fn test_move_short_requires_outstanding_short() {
        let line = ItemQuantities::receipt(10, 2).unwrap();
        assert!(matches!(
            line.move_short_to_rejected(3),
            Err(LedgerError::InsufficientUnits { field: "short", .. })
        ));
    }

    #[test]
    fn test_same_values_are_a_noop() {
        let line = ItemQuantities::receipt(10, 2).unwrap();
        let correction = line.correct(Some(0), Some(2)).unwrap();
        assert!(correction.is_noop());
        assert_eq!(correction.stock_delta(), 0);
    }

    #[test]
    fn test_total_mismatch() {
        assert!(matches!(
            ItemQuantities::resolve(80, Some(10), Some(100)),
            Err(LedgerError::TotalMismatch { .. })
        ));
        assert!(matches!(
            ItemQuantities::resolve(120, None, Some(100)),
            Err(LedgerError::TotalMismatch { .. })
        ));
    }

    /// Line value is priced on the invoiced quantity
    #[test]
    fn test_line_value_uses_total_quantity() {
        let line = ItemQuantities::resolve(80, None, Some(100)).unwrap();
        let value = GstBreakdown::compute(line.total_quantity, dec("10.00"), dec("18")).unwrap();
        assert_eq!(value.total_value_excl_gst, dec("1000.00"));
        assert_eq!(value.gst_amount, dec("180.00"));
        assert_eq!(value.total_value_incl_gst, dec("1180.00"));
        assert!(value.verify_claimed_total(Some(dec("1180.01"))).is_ok());
        assert!(value.verify_claimed_total(Some(dec("1181.00"))).is_err());
    }
}

// ============================================================================
// Property Tests
// ============================================================================

fn line_strategy() -> impl Strategy<Value = ItemQuantities> {
    (0i32..1_000, 0i32..1_000)
        .prop_map(|(received, short)| ItemQuantities::receipt(received, short).unwrap())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Accepted corrections keep every line invariant and, while short stays
    /// within its initial value, move stock by the change in available units
    #[test]
    fn prop_correction_matches_available(
        (line, short) in line_strategy().prop_flat_map(|l| (Just(l), 0..=l.short)),
        rejected in 0i32..1_200,
    ) {
        if let Ok(correction) = line.correct(Some(rejected), Some(short)) {
            let after = correction.after;
            prop_assert!(after.rejected <= after.received);
            prop_assert!(after.available() >= 0);
            prop_assert_eq!(
                i64::from(correction.stock_delta()),
                after.available() - line.available()
            );
        }
    }

    /// Applying a correction and then its inverse restores the line
    #[test]
    fn prop_correction_is_reversible(
        line in line_strategy(),
        rejected in 0i32..1_000,
    ) {
        if let Ok(forward) = line.correct(Some(rejected), None) {
            let back = forward.after.correct(Some(line.rejected), None).unwrap();
            prop_assert_eq!(back.after, line);
            prop_assert_eq!(forward.stock_delta() + back.stock_delta(), 0);
        }
    }

    /// Corrections on a completed line move stock by the change in its contribution,
    /// so reverting afterwards takes back exactly what is in stock
    #[test]
    fn prop_corrections_keep_revert_exact(
        line in line_strategy(),
        rejected in 0i32..1_200,
        short in 0i32..1_200,
    ) {
        if let Ok(correction) = line.correct(Some(rejected), Some(short)) {
            let completed = receipt_transition_delta(StatusTransition::Complete, &line);
            let stock = i64::from(completed) + i64::from(correction.stock_delta());
            prop_assert!(stock >= 0);
            prop_assert_eq!(
                stock,
                -i64::from(receipt_transition_delta(StatusTransition::Revert, &correction.after))
            );
        }
    }

    /// Moving short to rejected never changes available stock
    #[test]
    fn prop_short_to_rejected_keeps_available(
        received in 1i32..1_000,
        short in 1i32..1_000,
        qty in 1i32..1_000,
    ) {
        let line = ItemQuantities::receipt(received, short).unwrap();
        if let Ok(moved) = line.move_short_to_rejected(qty) {
            prop_assert_eq!(moved.stock_delta(), 0);
            prop_assert_eq!(moved.after.available(), line.available());
        }
    }
}
