//! Stock-on-hand arithmetic for SKUs

use serde::{Deserialize, Serialize};

/// Outcome of applying one delta to a SKU's stock counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub stock_before: i32,
    pub delta: i32,
    pub stock_after: i32,
}

impl StockAdjustment {
    /// Part of the delta that could not be applied because of the zero floor
    pub fn clamped_by(&self) -> i64 {
        i64::from(self.stock_before) + i64::from(self.delta) - i64::from(self.stock_after)
    }

    pub fn was_clamped(&self) -> bool {
        self.clamped_by() != 0
    }
}

/// Apply `delta` to `current`, flooring the result at zero.
///
/// Underflow is clamped rather than rejected; the clamped remainder is
/// reported through [`StockAdjustment::clamped_by`] so callers can log it.
pub fn apply_stock_delta(current: i32, delta: i32) -> StockAdjustment {
    let raw = i64::from(current) + i64::from(delta);
    let stock_after = raw.clamp(0, i64::from(i32::MAX)) as i32;
    StockAdjustment {
        stock_before: current,
        delta,
        stock_after,
    }
}

/// Check whether a dispatch of `quantity` can be served from `on_hand`
pub fn has_sufficient_stock(on_hand: i32, quantity: i32) -> bool {
    on_hand >= quantity
}
