//! Receipt line quantities and their corrections
//!
//! A receipt line is fixed at creation as `total = received + short`.
//! Afterwards only `short` and `rejected` move:
//!
//! ```text
//! arrived_short = max(0, initial_short - short)   initial_short = total - received
//! available     = received - rejected + arrived_short
//! contribution  = total - short - rejected
//! ```
//!
//! `contribution` is what a completed line has put into stock. Completing a
//! receipt adds it, reverting takes it back, and a correction on a completed
//! receipt moves stock by its change.

use serde::{Deserialize, Serialize};

use super::document::StatusTransition;
use crate::validation::{validate_non_negative, validate_positive, LedgerError, LedgerResult};

/// Quantity columns of one incoming item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemQuantities {
    pub total_quantity: i32,
    pub received: i32,
    pub short: i32,
    pub rejected: i32,
}

/// Before/after view of a corrected line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Correction {
    pub before: ItemQuantities,
    pub after: ItemQuantities,
    pub rejected_diff: i32,
    pub short_diff: i32,
}

impl Correction {
    fn between(before: ItemQuantities, after: ItemQuantities) -> Self {
        Self {
            before,
            after,
            rejected_diff: after.rejected - before.rejected,
            short_diff: after.short - before.short,
        }
    }

    /// Stock movement caused by the correction on a completed receipt.
    ///
    /// More rejected units leave stock; fewer short units means they arrived.
    /// Equal to the change in [`ItemQuantities::stock_contribution`].
    pub fn stock_delta(&self) -> i32 {
        -self.rejected_diff - self.short_diff
    }

    pub fn is_noop(&self) -> bool {
        self.rejected_diff == 0 && self.short_diff == 0
    }
}

impl ItemQuantities {
    /// Quantities of a freshly received line
    pub fn receipt(received: i32, short: i32) -> LedgerResult<Self> {
        validate_non_negative("received", received)?;
        validate_non_negative("short", short)?;
        let total_quantity = received
            .checked_add(short)
            .ok_or(LedgerError::TooLarge { field: "total_quantity" })?;
        Ok(Self {
            total_quantity,
            received,
            short,
            rejected: 0,
        })
    }

    /// Quantities of a receipt line given `short`, `total_quantity`, or both
    pub fn resolve(
        received: i32,
        short: Option<i32>,
        total_quantity: Option<i32>,
    ) -> LedgerResult<Self> {
        validate_non_negative("received", received)?;
        let short = match (short, total_quantity) {
            (Some(short), None) => short,
            (None, None) => 0,
            (short, Some(total)) => {
                let derived = i64::from(total) - i64::from(received);
                if derived < 0 {
                    return Err(LedgerError::TotalMismatch {
                        total_quantity: total.into(),
                        received: received.into(),
                        short: derived,
                    });
                }
                match short {
                    Some(short) if i64::from(short) != derived => {
                        return Err(LedgerError::TotalMismatch {
                            total_quantity: total.into(),
                            received: received.into(),
                            short: short.into(),
                        })
                    }
                    _ => derived as i32,
                }
            }
        };
        Self::receipt(received, short)
    }

    pub fn initial_short(&self) -> i64 {
        i64::from(self.total_quantity) - i64::from(self.received)
    }

    pub fn arrived_short(&self) -> i64 {
        (self.initial_short() - i64::from(self.short)).max(0)
    }

    pub fn available(&self) -> i64 {
        i64::from(self.received) - i64::from(self.rejected) + self.arrived_short()
    }

    /// Units a completed line has put into stock
    pub fn stock_contribution(&self) -> i64 {
        i64::from(self.total_quantity) - i64::from(self.short) - i64::from(self.rejected)
    }

    /// Units that can still be pulled out of the received quantity
    pub fn rejectable(&self) -> i64 {
        i64::from(self.received) - i64::from(self.rejected)
    }

    /// Check every line invariant
    pub fn check(&self) -> LedgerResult<()> {
        validate_non_negative("received", self.received)?;
        validate_non_negative("short", self.short)?;
        validate_non_negative("rejected", self.rejected)?;
        if self.rejected > self.received {
            return Err(LedgerError::RejectedExceedsReceived {
                rejected: self.rejected.into(),
                received: self.received.into(),
            });
        }
        let available = self.available();
        if available < 0 {
            return Err(LedgerError::AvailableNegative { available });
        }
        if self.stock_contribution() < 0 {
            return Err(LedgerError::ShortExceedsTotal {
                total_quantity: self.total_quantity.into(),
                short: self.short.into(),
                rejected: self.rejected.into(),
            });
        }
        Ok(())
    }

    /// Set new rejected and/or short values
    pub fn correct(&self, rejected: Option<i32>, short: Option<i32>) -> LedgerResult<Correction> {
        let after = ItemQuantities {
            rejected: rejected.unwrap_or(self.rejected),
            short: short.unwrap_or(self.short),
            ..*self
        };
        after.check()?;
        Ok(Correction::between(*self, after))
    }

    /// Pull `qty` healthy received units out as rejected
    pub fn move_received_to_rejected(&self, qty: i32) -> LedgerResult<Correction> {
        validate_positive("quantity", qty)?;
        if self.rejectable() < i64::from(qty) {
            return Err(LedgerError::InsufficientUnits {
                field: "received",
                requested: qty.into(),
                available: self.rejectable(),
            });
        }
        let after = ItemQuantities {
            rejected: self.rejected + qty,
            ..*self
        };
        after.check()?;
        Ok(Correction::between(*self, after))
    }

    /// Book `qty` outstanding short units as rejected; stock is unaffected
    pub fn move_short_to_rejected(&self, qty: i32) -> LedgerResult<Correction> {
        validate_positive("quantity", qty)?;
        if self.short < qty {
            return Err(LedgerError::InsufficientUnits {
                field: "short",
                requested: qty.into(),
                available: self.short.into(),
            });
        }
        let after = ItemQuantities {
            short: self.short - qty,
            rejected: self.rejected + qty,
            ..*self
        };
        after.check()?;
        Ok(Correction::between(*self, after))
    }
}

/// Stock delta for one receipt line when its record changes status
pub fn receipt_transition_delta(transition: StatusTransition, line: &ItemQuantities) -> i32 {
    let contribution = line.stock_contribution().clamp(0, i64::from(i32::MAX)) as i32;
    match transition {
        StatusTransition::Complete => contribution,
        StatusTransition::Revert => -contribution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_totals() {
        let q = ItemQuantities::receipt(80, 20).unwrap();
        assert_eq!(q.total_quantity, 100);
        assert_eq!(q.initial_short(), 20);
        assert_eq!(q.arrived_short(), 0);
        assert_eq!(q.available(), 80);
    }

    #[test]
    fn test_resolve_from_total() {
        let q = ItemQuantities::resolve(80, None, Some(100)).unwrap();
        assert_eq!(q.short, 20);
        assert_eq!(q.total_quantity, 100);

        assert_eq!(ItemQuantities::resolve(80, Some(20), Some(100)).unwrap(), q);
        assert_eq!(ItemQuantities::resolve(80, Some(20), None).unwrap(), q);
        assert_eq!(ItemQuantities::resolve(80, None, None).unwrap().short, 0);
    }

    #[test]
    fn test_resolve_mismatch() {
        let err = ItemQuantities::resolve(80, Some(10), Some(100)).unwrap_err();
        assert_eq!(err.field(), "total_quantity");
        assert!(ItemQuantities::resolve(120, None, Some(100)).is_err());
    }

    #[test]
    fn test_receipt_rejects_negative() {
        assert!(ItemQuantities::receipt(-1, 0).is_err());
        assert!(ItemQuantities::receipt(1, -1).is_err());
    }

    #[test]
    fn test_short_decrease_means_arrival() {
        let q = ItemQuantities::receipt(80, 20).unwrap();
        let c = q.correct(None, Some(5)).unwrap();
        assert_eq!(c.short_diff, -15);
        assert_eq!(c.stock_delta(), 15);
        assert_eq!(c.after.arrived_short(), 15);
        assert_eq!(c.after.available(), 95);
    }

    #[test]
    fn test_short_increase_reduces_stock() {
        let q = ItemQuantities::receipt(80, 20).unwrap();
        let c = q.correct(None, Some(25)).unwrap();
        assert_eq!(c.stock_delta(), -5);
        assert_eq!(c.after.arrived_short(), 0);
    }

    #[test]
    fn test_rejected_cannot_exceed_received() {
        let q = ItemQuantities::receipt(10, 0).unwrap();
        let err = q.correct(Some(11), None).unwrap_err();
        assert_eq!(
            err,
            LedgerError::RejectedExceedsReceived {
                rejected: 11,
                received: 10
            }
        );
    }

    #[test]
    fn test_rejection_reduces_stock() {
        let q = ItemQuantities::receipt(10, 0).unwrap();
        let c = q.correct(Some(4), None).unwrap();
        assert_eq!(c.stock_delta(), -4);
        let back = c.after.correct(Some(1), None).unwrap();
        assert_eq!(back.stock_delta(), 3);
    }

    #[test]
    fn test_move_received_to_rejected() {
        let q = ItemQuantities::receipt(10, 0).unwrap();
        let c = q.move_received_to_rejected(6).unwrap();
        assert_eq!(c.after.rejected, 6);
        assert_eq!(c.stock_delta(), -6);

        let err = c.after.move_received_to_rejected(5).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientUnits {
                field: "received",
                requested: 5,
                available: 4
            }
        );
    }

    #[test]
    fn test_move_short_to_rejected_has_no_stock_effect() {
        let q = ItemQuantities::receipt(80, 20).unwrap();
        let c = q.move_short_to_rejected(5).unwrap();
        assert_eq!(c.after.short, 15);
        assert_eq!(c.after.rejected, 5);
        assert_eq!(c.stock_delta(), 0);
        assert!(q.move_short_to_rejected(21).is_err());
    }

    #[test]
    fn test_moves_require_positive_quantity() {
        let q = ItemQuantities::receipt(5, 5).unwrap();
        assert!(q.move_short_to_rejected(0).is_err());
        assert!(q.move_received_to_rejected(-2).is_err());
    }

    #[test]
    fn test_transition_delta() {
        let q = ItemQuantities::receipt(7, 3).unwrap();
        assert_eq!(receipt_transition_delta(StatusTransition::Complete, &q), 7);
        assert_eq!(receipt_transition_delta(StatusTransition::Revert, &q), -7);
    }

    #[test]
    fn test_transition_delta_follows_corrections() {
        let q = ItemQuantities::receipt(10, 0).unwrap();
        let rejected = q.move_received_to_rejected(4).unwrap().after;
        assert_eq!(rejected.available(), 6);
        assert_eq!(receipt_transition_delta(StatusTransition::Complete, &rejected), 6);

        let line = ItemQuantities::receipt(80, 20).unwrap();
        let arrived = line.correct(None, Some(5)).unwrap().after;
        let moved = arrived.move_short_to_rejected(5).unwrap().after;
        assert_eq!(receipt_transition_delta(StatusTransition::Complete, &moved), 95);
        assert_eq!(receipt_transition_delta(StatusTransition::Revert, &moved), -95);
    }

    #[test]
    fn test_contribution_tracks_stock_delta() {
        let q = ItemQuantities::receipt(80, 20).unwrap();
        let c = q.correct(Some(10), Some(25)).unwrap();
        assert_eq!(
            i64::from(c.stock_delta()),
            c.after.stock_contribution() - q.stock_contribution()
        );
    }

    #[test]
    fn test_short_cannot_outgrow_the_line() {
        let q = ItemQuantities::receipt(10, 0).unwrap();
        let err = q.correct(Some(4), Some(7)).unwrap_err();
        assert_eq!(
            err,
            LedgerError::ShortExceedsTotal {
                total_quantity: 10,
                short: 7,
                rejected: 4
            }
        );
        assert_eq!(err.field(), "short");
    }
}
