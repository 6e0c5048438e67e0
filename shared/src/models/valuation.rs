//! GST-aware line valuation

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::validation::{
    validate_gst_percentage, validate_unit_price, LedgerError, LedgerResult, MAX_VALUE,
};

/// Tolerance when comparing client-supplied totals with computed ones
pub const VALUE_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Stored value columns of a line item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GstBreakdown {
    pub unit_price: Decimal,
    pub gst_percentage: Decimal,
    pub total_value_excl_gst: Decimal,
    pub gst_amount: Decimal,
    pub total_value_incl_gst: Decimal,
}

fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Values must fit the stored NUMERIC(16, 2) columns
fn bounded(field: &'static str, value: Option<Decimal>) -> LedgerResult<Decimal> {
    match value {
        Some(v) if v.abs() <= MAX_VALUE => Ok(v),
        _ => Err(LedgerError::TooLarge { field }),
    }
}

impl GstBreakdown {
    /// Value `quantity` units at `unit_price` plus GST
    pub fn compute(quantity: i32, unit_price: Decimal, gst_percentage: Decimal) -> LedgerResult<Self> {
        validate_unit_price(unit_price)?;
        validate_gst_percentage(gst_percentage)?;

        let total_value_excl_gst = bounded(
            "total_value_excl_gst",
            unit_price.checked_mul(Decimal::from(quantity)).map(round_money),
        )?;
        let gst_amount = bounded(
            "gst_amount",
            total_value_excl_gst
                .checked_mul(gst_percentage)
                .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
                .map(round_money),
        )?;
        let total_value_incl_gst = bounded(
            "total_value_incl_gst",
            total_value_excl_gst.checked_add(gst_amount),
        )?;

        Ok(Self {
            unit_price,
            gst_percentage,
            total_value_excl_gst,
            gst_amount,
            total_value_incl_gst,
        })
    }

    /// Compare a client-supplied GST-inclusive total against the computed one
    pub fn verify_claimed_total(&self, claimed: Option<Decimal>) -> LedgerResult<()> {
        let Some(claimed) = claimed else {
            return Ok(());
        };
        let within = claimed
            .checked_sub(self.total_value_incl_gst)
            .map_or(false, |diff| diff.abs() <= VALUE_TOLERANCE);
        if within {
            Ok(())
        } else {
            Err(LedgerError::ValueMismatch {
                field: "total_value_incl_gst",
                claimed,
                computed: self.total_value_incl_gst,
            })
        }
    }
}

/// Sum of GST-inclusive values across lines
pub fn record_total<'a>(lines: impl IntoIterator<Item = &'a GstBreakdown>) -> LedgerResult<Decimal> {
    let mut total = Decimal::ZERO;
    for line in lines {
        total = bounded("total_value", total.checked_add(line.total_value_incl_gst))?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::MAX_UNIT_PRICE;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_compute_breakdown() {
        let b = GstBreakdown::compute(100, dec("12.50"), dec("18")).unwrap();
        assert_eq!(b.total_value_excl_gst, dec("1250.00"));
        assert_eq!(b.gst_amount, dec("225.00"));
        assert_eq!(b.total_value_incl_gst, dec("1475.00"));
    }

    #[test]
    fn test_rounding() {
        let b = GstBreakdown::compute(3, dec("0.333"), dec("5")).unwrap();
        assert_eq!(b.total_value_excl_gst, dec("1.00"));
        assert_eq!(b.gst_amount, dec("0.05"));
    }

    #[test]
    fn test_claimed_total_tolerance() {
        let b = GstBreakdown::compute(10, dec("10"), dec("12")).unwrap();
        assert!(b.verify_claimed_total(None).is_ok());
        assert!(b.verify_claimed_total(Some(dec("112.01"))).is_ok());
        assert!(b.verify_claimed_total(Some(dec("113"))).is_err());
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(GstBreakdown::compute(1, dec("-1"), dec("18")).is_err());
        assert!(GstBreakdown::compute(1, dec("1"), dec("120")).is_err());
    }

    #[test]
    fn test_record_total() {
        let a = GstBreakdown::compute(1, dec("100"), dec("18")).unwrap();
        let b = GstBreakdown::compute(2, dec("50"), dec("5")).unwrap();
        assert_eq!(record_total([&a, &b]).unwrap(), dec("223.00"));
    }

    #[test]
    fn test_huge_prices_are_rejected_not_panicking() {
        assert!(matches!(
            GstBreakdown::compute(2, Decimal::MAX, Decimal::ZERO),
            Err(LedgerError::OutOfRange { field: "unit_price", .. })
        ));
        assert_eq!(
            GstBreakdown::compute(i32::MAX, MAX_UNIT_PRICE, dec("18")),
            Err(LedgerError::TooLarge { field: "total_value_excl_gst" })
        );
    }

    #[test]
    fn test_extreme_claimed_total_is_a_mismatch() {
        let b = GstBreakdown::compute(10, dec("10"), dec("12")).unwrap();
        assert!(matches!(
            b.verify_claimed_total(Some(Decimal::MIN)),
            Err(LedgerError::ValueMismatch { .. })
        ));
        assert!(b.verify_claimed_total(Some(Decimal::MAX)).is_err());
    }

    #[test]
    fn test_record_total_is_bounded() {
        let big = GstBreakdown::compute(60, MAX_UNIT_PRICE, Decimal::ZERO).unwrap();
        assert_eq!(
            record_total([&big, &big]),
            Err(LedgerError::TooLarge { field: "total_value" })
        );
    }
}
