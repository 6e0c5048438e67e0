//! Document classification and record status
//!
//! The string forms of these enums are stored in the database and read by
//! export tooling, so they must not change.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::validation::LedgerError;

/// Lifecycle status shared by incoming and outgoing records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Draft,
    Completed,
}

/// Effect of a legal status change on stock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTransition {
    /// draft -> completed: quantities enter (or leave) stock
    Complete,
    /// completed -> draft: the earlier stock movement is undone
    Revert,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Draft => "draft",
            RecordStatus::Completed => "completed",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RecordStatus::Completed)
    }

    /// Resolve a requested status change against the prior status.
    ///
    /// Requesting the status a record already has is an error, so a repeated
    /// request can never apply the same stock movement twice.
    pub fn transition_to(self, next: RecordStatus) -> Result<StatusTransition, LedgerError> {
        match (self, next) {
            (RecordStatus::Draft, RecordStatus::Completed) => Ok(StatusTransition::Complete),
            (RecordStatus::Completed, RecordStatus::Draft) => Ok(StatusTransition::Revert),
            (from, to) => Err(LedgerError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(RecordStatus::Draft),
            "completed" => Ok(RecordStatus::Completed),
            other => Err(LedgerError::UnknownValue {
                field: "status",
                value: other.to_string(),
            }),
        }
    }
}

/// Kind of paperwork a stock movement is booked against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Invoice,
    DeliveryChallan,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "invoice",
            DocumentType::DeliveryChallan => "delivery_challan",
        }
    }
}

impl FromStr for DocumentType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invoice" => Ok(DocumentType::Invoice),
            "delivery_challan" => Ok(DocumentType::DeliveryChallan),
            other => Err(LedgerError::UnknownValue {
                field: "document_type",
                value: other.to_string(),
            }),
        }
    }
}

/// Purpose of the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentSubType {
    Regular,
    Replacement,
    Sample,
}

impl DocumentSubType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentSubType::Regular => "regular",
            DocumentSubType::Replacement => "replacement",
            DocumentSubType::Sample => "sample",
        }
    }
}

impl FromStr for DocumentSubType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "regular" => Ok(DocumentSubType::Regular),
            "replacement" => Ok(DocumentSubType::Replacement),
            "sample" => Ok(DocumentSubType::Sample),
            other => Err(LedgerError::UnknownValue {
                field: "document_sub_type",
                value: other.to_string(),
            }),
        }
    }
}

/// Destination of a delivery challan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryChallanSubType {
    ToVendor,
    ToCustomer,
    ToTeam,
}

impl DeliveryChallanSubType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryChallanSubType::ToVendor => "to_vendor",
            DeliveryChallanSubType::ToCustomer => "to_customer",
            DeliveryChallanSubType::ToTeam => "to_team",
        }
    }
}

impl FromStr for DeliveryChallanSubType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "to_vendor" => Ok(DeliveryChallanSubType::ToVendor),
            "to_customer" => Ok(DeliveryChallanSubType::ToCustomer),
            "to_team" => Ok(DeliveryChallanSubType::ToTeam),
            other => Err(LedgerError::UnknownValue {
                field: "delivery_challan_sub_type",
                value: other.to_string(),
            }),
        }
    }
}

/// Full classification of an outgoing document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchClassification {
    pub document_type: DocumentType,
    pub document_sub_type: Option<DocumentSubType>,
    pub delivery_challan_sub_type: Option<DeliveryChallanSubType>,
}

impl DispatchClassification {
    /// The classification used when rejected units go back to their vendor
    pub fn rejected_return() -> Self {
        Self {
            document_type: DocumentType::DeliveryChallan,
            document_sub_type: Some(DocumentSubType::Replacement),
            delivery_challan_sub_type: Some(DeliveryChallanSubType::ToVendor),
        }
    }

    /// True for replacement challans sent back to a vendor.
    ///
    /// Those units left stock when they were rejected, so dispatching them
    /// must not decrement stock again.
    pub fn is_rejected_return(&self) -> bool {
        self.document_type == DocumentType::DeliveryChallan
            && self.document_sub_type == Some(DocumentSubType::Replacement)
            && self.delivery_challan_sub_type == Some(DeliveryChallanSubType::ToVendor)
    }

    pub fn moves_stock(&self) -> bool {
        !self.is_rejected_return()
    }

    /// Parse the stored column values
    pub fn parse(
        document_type: &str,
        document_sub_type: Option<&str>,
        delivery_challan_sub_type: Option<&str>,
    ) -> Result<Self, LedgerError> {
        Ok(Self {
            document_type: document_type.parse()?,
            document_sub_type: document_sub_type.map(str::parse).transpose()?,
            delivery_challan_sub_type: delivery_challan_sub_type.map(str::parse).transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        assert_eq!(
            RecordStatus::Draft.transition_to(RecordStatus::Completed),
            Ok(StatusTransition::Complete)
        );
        assert_eq!(
            RecordStatus::Completed.transition_to(RecordStatus::Draft),
            Ok(StatusTransition::Revert)
        );
        assert!(RecordStatus::Draft
            .transition_to(RecordStatus::Draft)
            .is_err());
        assert!(RecordStatus::Completed
            .transition_to(RecordStatus::Completed)
            .is_err());
    }

    #[test]
    fn test_status_strings() {
        assert_eq!("draft".parse::<RecordStatus>(), Ok(RecordStatus::Draft));
        assert_eq!(RecordStatus::Completed.to_string(), "completed");
        assert!("done".parse::<RecordStatus>().is_err());
    }

    #[test]
    fn test_rejected_return_predicate() {
        assert!(DispatchClassification::rejected_return().is_rejected_return());

        let parsed =
            DispatchClassification::parse("delivery_challan", Some("replacement"), Some("to_vendor"))
                .unwrap();
        assert!(parsed.is_rejected_return());
        assert!(!parsed.moves_stock());
    }

    #[test]
    fn test_partial_classification_moves_stock() {
        let to_customer =
            DispatchClassification::parse("delivery_challan", Some("replacement"), Some("to_customer"))
                .unwrap();
        assert!(to_customer.moves_stock());

        let invoice = DispatchClassification::parse("invoice", Some("replacement"), None).unwrap();
        assert!(invoice.moves_stock());

        let no_sub_type = DispatchClassification::parse("delivery_challan", None, Some("to_vendor"))
            .unwrap();
        assert!(no_sub_type.moves_stock());
    }

    #[test]
    fn test_unknown_classification_rejected() {
        let err = DispatchClassification::parse("memo", None, None).unwrap_err();
        assert_eq!(err.field(), "document_type");
    }
}
