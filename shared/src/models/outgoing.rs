//! Dispatch line rules

use serde::{Deserialize, Serialize};

use super::document::{DispatchClassification, StatusTransition};
use crate::validation::{validate_non_negative, validate_positive, LedgerError, LedgerResult};

/// Quantity columns of one outgoing item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchQuantities {
    pub outgoing_quantity: i32,
    pub rejected_quantity: i32,
}

impl DispatchQuantities {
    /// Resolve the stored quantities of a dispatch line.
    ///
    /// Rejected-return challans carry only rejected units, so their
    /// `rejected_quantity` is forced to the outgoing quantity.
    pub fn resolve(
        classification: &DispatchClassification,
        outgoing_quantity: i32,
        rejected_quantity: Option<i32>,
    ) -> LedgerResult<Self> {
        validate_positive("outgoing_quantity", outgoing_quantity)?;

        if classification.is_rejected_return() {
            return Ok(Self {
                outgoing_quantity,
                rejected_quantity: outgoing_quantity,
            });
        }

        let rejected_quantity = rejected_quantity.unwrap_or(0);
        validate_non_negative("rejected_quantity", rejected_quantity)?;
        if rejected_quantity > outgoing_quantity {
            return Err(LedgerError::RejectedExceedsOutgoing {
                rejected_quantity: rejected_quantity.into(),
                outgoing_quantity: outgoing_quantity.into(),
            });
        }

        Ok(Self {
            outgoing_quantity,
            rejected_quantity,
        })
    }
}

/// Stock delta for one dispatch line when its record changes status.
///
/// Returns zero for rejected-return challans.
pub fn dispatch_transition_delta(
    classification: &DispatchClassification,
    transition: StatusTransition,
    outgoing_quantity: i32,
) -> i32 {
    if !classification.moves_stock() {
        return 0;
    }
    match transition {
        StatusTransition::Complete => -outgoing_quantity,
        StatusTransition::Revert => outgoing_quantity,
    }
}
