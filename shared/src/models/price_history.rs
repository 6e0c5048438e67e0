//! Three-slot price history (current / previous / lowest)
//!
//! Each SKU keeps at most one active row per [`PriceTag`]. Completing a
//! receipt rotates the slots; older rows stay in the table as inactive
//! history.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::validation::LedgerError;

/// Slot a price history row occupies while active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceTag {
    Current,
    Previous,
    Lowest,
}

impl PriceTag {
    pub const ALL: [PriceTag; 3] = [PriceTag::Current, PriceTag::Previous, PriceTag::Lowest];

    pub fn as_str(&self) -> &'static str {
        match self {
            PriceTag::Current => "current",
            PriceTag::Previous => "previous",
            PriceTag::Lowest => "lowest",
        }
    }
}

impl FromStr for PriceTag {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "current" => Ok(PriceTag::Current),
            "previous" => Ok(PriceTag::Previous),
            "lowest" => Ok(PriceTag::Lowest),
            other => Err(LedgerError::UnknownValue {
                field: "tag",
                value: other.to_string(),
            }),
        }
    }
}

/// A price seen on a completed receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub price: Decimal,
    pub vendor_id: Option<Uuid>,
    pub invoice_number: Option<String>,
    pub incoming_record_id: Option<Uuid>,
    pub effective_date: NaiveDate,
}

impl PriceObservation {
    /// Same price from the same vendor
    pub fn is_equivalent(&self, other: &PriceObservation) -> bool {
        self.price == other.price && self.vendor_id == other.vendor_id
    }
}

/// Currently active slots of one SKU
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSlots {
    pub current: Option<PriceObservation>,
    pub previous: Option<PriceObservation>,
    pub lowest: Option<PriceObservation>,
}

/// What happens to one slot during a rotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotChange {
    Keep,
    /// Deactivate the active row (if any) and insert this one
    Replace(PriceObservation),
}

impl SlotChange {
    pub fn is_keep(&self) -> bool {
        matches!(self, SlotChange::Keep)
    }
}

/// Slot changes for one observation, in application order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationPlan {
    pub previous: SlotChange,
    pub current: SlotChange,
    pub lowest: SlotChange,
}

impl RotationPlan {
    pub fn unchanged() -> Self {
        Self {
            previous: SlotChange::Keep,
            current: SlotChange::Keep,
            lowest: SlotChange::Keep,
        }
    }

    pub fn is_unchanged(&self) -> bool {
        self.previous.is_keep() && self.current.is_keep() && self.lowest.is_keep()
    }

    /// Changes paired with their tag
    pub fn changes(&self) -> [(PriceTag, &SlotChange); 3] {
        [
            (PriceTag::Previous, &self.previous),
            (PriceTag::Current, &self.current),
            (PriceTag::Lowest, &self.lowest),
        ]
    }
}

impl ActiveSlots {
    /// Plan the rotation caused by `observed`.
    ///
    /// Non-positive prices leave every slot alone, as does completing the
    /// same receipt again when it already owns the `current` slot.
    pub fn plan(&self, observed: &PriceObservation) -> RotationPlan {
        if observed.price <= Decimal::ZERO {
            return RotationPlan::unchanged();
        }

        if let Some(current) = &self.current {
            if current.incoming_record_id.is_some()
                && current.incoming_record_id == observed.incoming_record_id
                && current.is_equivalent(observed)
            {
                return RotationPlan::unchanged();
            }
        }

        let previous = match (&self.current, &self.previous) {
            (Some(current), Some(previous)) if previous.is_equivalent(current) => SlotChange::Keep,
            (Some(current), _) => SlotChange::Replace(current.clone()),
            (None, _) => SlotChange::Keep,
        };

        let lowest = match &self.lowest {
            Some(lowest) if observed.price >= lowest.price => SlotChange::Keep,
            _ => SlotChange::Replace(observed.clone()),
        };

        RotationPlan {
            previous,
            current: SlotChange::Replace(observed.clone()),
            lowest,
        }
    }

    /// Apply a plan to an in-memory copy of the slots
    pub fn apply(&mut self, plan: &RotationPlan) {
        for (tag, change) in plan.changes() {
            if let SlotChange::Replace(obs) = change {
                let slot = match tag {
                    PriceTag::Current => &mut self.current,
                    PriceTag::Previous => &mut self.previous,
                    PriceTag::Lowest => &mut self.lowest,
                };
                *slot = Some(obs.clone());
            }
        }
    }

    /// Plan and apply in one step, returning the plan
    pub fn rotate(&mut self, observed: &PriceObservation) -> RotationPlan {
        let plan = self.plan(observed);
        self.apply(&plan);
        plan
    }
}

/// One price per SKU for a receipt, ordered by SKU id.
///
/// A receipt listing the same SKU more than once rotates the slots once,
/// with its lowest positive line price. Unpriced lines are dropped.
pub fn receipt_prices(lines: impl IntoIterator<Item = (Uuid, Decimal)>) -> Vec<(Uuid, Decimal)> {
    let mut by_sku: BTreeMap<Uuid, Decimal> = BTreeMap::new();
    for (sku_id, price) in lines {
        if price <= Decimal::ZERO {
            continue;
        }
        by_sku
            .entry(sku_id)
            .and_modify(|p| *p = (*p).min(price))
            .or_insert(price);
    }
    by_sku.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(price: i64, record: Uuid) -> PriceObservation {
        PriceObservation {
            price: Decimal::from(price),
            vendor_id: None,
            invoice_number: None,
            incoming_record_id: Some(record),
            effective_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        }
    }

    #[test]
    fn test_first_receipt_fills_current_and_lowest() {
        let mut slots = ActiveSlots::default();
        let plan = slots.rotate(&obs(100, Uuid::new_v4()));
        assert!(plan.previous.is_keep());
        assert_eq!(slots.current.as_ref().unwrap().price, Decimal::from(100));
        assert_eq!(slots.lowest.as_ref().unwrap().price, Decimal::from(100));
        assert!(slots.previous.is_none());
    }

    #[test]
    fn test_rotation_sequence() {
        let mut slots = ActiveSlots::default();
        slots.rotate(&obs(100, Uuid::new_v4()));
        slots.rotate(&obs(80, Uuid::new_v4()));
        assert_eq!(slots.current.as_ref().unwrap().price, Decimal::from(80));
        assert_eq!(slots.previous.as_ref().unwrap().price, Decimal::from(100));
        assert_eq!(slots.lowest.as_ref().unwrap().price, Decimal::from(80));

        let plan = slots.rotate(&obs(90, Uuid::new_v4()));
        assert!(plan.lowest.is_keep());
        assert_eq!(slots.current.as_ref().unwrap().price, Decimal::from(90));
        assert_eq!(slots.previous.as_ref().unwrap().price, Decimal::from(80));
        assert_eq!(slots.lowest.as_ref().unwrap().price, Decimal::from(80));
    }

    #[test]
    fn test_equivalent_previous_is_kept() {
        let mut slots = ActiveSlots::default();
        slots.rotate(&obs(50, Uuid::new_v4()));
        slots.rotate(&obs(50, Uuid::new_v4()));
        let plan = slots.plan(&obs(60, Uuid::new_v4()));
        assert!(plan.previous.is_keep());
    }

    #[test]
    fn test_zero_price_is_ignored() {
        let mut slots = ActiveSlots::default();
        slots.rotate(&obs(40, Uuid::new_v4()));
        let plan = slots.rotate(&obs(0, Uuid::new_v4()));
        assert!(plan.is_unchanged());
        assert_eq!(slots.current.as_ref().unwrap().price, Decimal::from(40));
    }

    #[test]
    fn test_recompleting_same_receipt_is_idempotent() {
        let record = Uuid::new_v4();
        let mut slots = ActiveSlots::default();
        slots.rotate(&obs(100, Uuid::new_v4()));
        slots.rotate(&obs(80, record));
        let before = slots.clone();
        let plan = slots.rotate(&obs(80, record));
        assert!(plan.is_unchanged());
        assert_eq!(slots, before);
    }

    #[test]
    fn test_receipt_prices_one_per_sku() {
        let a = Uuid::from_u128(2);
        let b = Uuid::from_u128(1);
        let prices = receipt_prices([
            (a, Decimal::from(90)),
            (b, Decimal::ZERO),
            (a, Decimal::from(70)),
            (a, Decimal::from(80)),
        ]);
        assert_eq!(prices, vec![(a, Decimal::from(70))]);

        let mut slots = ActiveSlots::default();
        slots.rotate(&obs(100, Uuid::new_v4()));
        let record = Uuid::new_v4();
        for (_, price) in &prices {
            slots.rotate(&PriceObservation {
                price: *price,
                ..obs(0, record)
            });
        }
        assert_eq!(slots.previous.as_ref().unwrap().price, Decimal::from(100));
        assert_eq!(slots.current.as_ref().unwrap().price, Decimal::from(70));
    }

    #[test]
    fn test_tag_strings() {
        for tag in PriceTag::ALL {
            assert_eq!(tag.as_str().parse::<PriceTag>(), Ok(tag));
        }
    }
}
