//! Outgoing dispatch tests
//!
//! Tests for dispatch classification and quantities including:
//! - Rejected-return challans never touch stock
//! - Regular dispatches take stock on completion and give it back on revert
//! - Rejected quantity bounded by the outgoing quantity

use proptest::prelude::*;
use shared::{
    apply_stock_delta, dispatch_transition_delta, DeliveryChallanSubType, DispatchClassification,
    DispatchQuantities, DocumentSubType, DocumentType, LedgerError, StatusTransition,
};

fn invoice_sale() -> DispatchClassification {
    DispatchClassification {
        document_type: DocumentType::Invoice,
        document_sub_type: Some(DocumentSubType::Regular),
        delivery_challan_sub_type: None,
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// A replacement challan to a vendor carries only rejected units
    #[test]
    fn test_replacement_to_vendor_keeps_stock() {
        let classification = DispatchClassification {
            document_type: DocumentType::DeliveryChallan,
            document_sub_type: Some(DocumentSubType::Replacement),
            delivery_challan_sub_type: Some(DeliveryChallanSubType::ToVendor),
        };
        assert!(classification.is_rejected_return());

        let quantities = DispatchQuantities::resolve(&classification, 10, None).unwrap();
        assert_eq!(quantities.outgoing_quantity, 10);
        assert_eq!(quantities.rejected_quantity, 10);

        // Whatever the client claims, the challan is all rejected units
        let claimed = DispatchQuantities::resolve(&classification, 10, Some(2)).unwrap();
        assert_eq!(claimed.rejected_quantity, 10);

        let stock = 37;
        let delta = dispatch_transition_delta(&classification, StatusTransition::Complete, 10);
        assert_eq!(delta, 0);
        assert_eq!(apply_stock_delta(stock, delta).stock_after, 37);
    }

    #[test]
    fn test_replacement_to_customer_moves_stock() {
        let classification = DispatchClassification {
            document_type: DocumentType::DeliveryChallan,
            document_sub_type: Some(DocumentSubType::Replacement),
            delivery_challan_sub_type: Some(DeliveryChallanSubType::ToCustomer),
        };
        assert!(classification.moves_stock());
        assert_eq!(
            dispatch_transition_delta(&classification, StatusTransition::Complete, 4),
            -4
        );
    }

    #[test]
    fn test_sale_moves_stock_both_ways() {
        let sale = invoice_sale();
        assert_eq!(dispatch_transition_delta(&sale, StatusTransition::Complete, 6), -6);
        assert_eq!(dispatch_transition_delta(&sale, StatusTransition::Revert, 6), 6);
    }

    #[test]
    fn test_rejected_quantity_bounds() {
        let sale = invoice_sale();
        assert_eq!(
            DispatchQuantities::resolve(&sale, 5, None).unwrap().rejected_quantity,
            0
        );
        assert!(matches!(
            DispatchQuantities::resolve(&sale, 5, Some(6)),
            Err(LedgerError::RejectedExceedsOutgoing { .. })
        ));
        assert!(matches!(
            DispatchQuantities::resolve(&sale, 0, None),
            Err(LedgerError::NotPositive { field: "outgoing_quantity" })
        ));
    }

    #[test]
    fn test_stored_classification_parses() {
        let parsed =
            DispatchClassification::parse("delivery_challan", Some("replacement"), Some("to_vendor"))
                .unwrap();
        assert_eq!(parsed, DispatchClassification::rejected_return());
        assert!(DispatchClassification::parse("receipt", None, None).is_err());
    }
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    /// Only the rejected-return classification leaves stock untouched
    #[test]
    fn prop_stock_effect_follows_classification(
        doc_type in prop_oneof![Just(DocumentType::Invoice), Just(DocumentType::DeliveryChallan)],
        sub_type in prop_oneof![
            Just(None),
            Just(Some(DocumentSubType::Regular)),
            Just(Some(DocumentSubType::Replacement)),
            Just(Some(DocumentSubType::Sample)),
        ],
        dc_sub_type in prop_oneof![
            Just(None),
            Just(Some(DeliveryChallanSubType::ToVendor)),
            Just(Some(DeliveryChallanSubType::ToCustomer)),
            Just(Some(DeliveryChallanSubType::ToTeam)),
        ],
        qty in 1i32..10_000,
    ) {
        let classification = DispatchClassification {
            document_type: doc_type,
            document_sub_type: sub_type,
            delivery_challan_sub_type: dc_sub_type,
        };
        let delta = dispatch_transition_delta(&classification, StatusTransition::Complete, qty);
        if classification.is_rejected_return() {
            prop_assert_eq!(delta, 0);
        } else {
            prop_assert_eq!(delta, -qty);
        }
    }
}
