//! Validation rules for the stock ledger
//!
//! Every correction to a receipt line, a dispatch line, or a rejected-item
//! report is checked here before anything is written. The backend maps
//! [`LedgerError`] onto its HTTP error type using [`LedgerError::field`].

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised by the pure ledger rules
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("{field} cannot be negative (got {value})")]
    Negative { field: &'static str, value: i64 },

    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("{field} is too large")]
    TooLarge { field: &'static str },

    #[error("rejected quantity {rejected} exceeds received quantity {received}")]
    RejectedExceedsReceived { rejected: i64, received: i64 },

    #[error("available quantity would become negative ({available})")]
    AvailableNegative { available: i64 },

    #[error("short {short} and rejected {rejected} exceed the invoiced quantity {total_quantity}")]
    ShortExceedsTotal {
        total_quantity: i64,
        short: i64,
        rejected: i64,
    },

    #[error("only {available} units can be moved from {field}, requested {requested}")]
    InsufficientUnits {
        field: &'static str,
        requested: i64,
        available: i64,
    },

    #[error("cannot change status from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("{field} {claimed} does not match computed value {computed}")]
    ValueMismatch {
        field: &'static str,
        claimed: Decimal,
        computed: Decimal,
    },

    #[error("{field} cannot exceed {max} (got {value})")]
    OutOfRange {
        field: &'static str,
        value: Decimal,
        max: Decimal,
    },

    #[error("processed units {processed} exceed rejected quantity {quantity}")]
    CountersExceedQuantity { processed: i64, quantity: i64 },

    #[error("{field} cannot decrease from {current} to {requested}")]
    CounterDecrease {
        field: &'static str,
        current: i64,
        requested: i64,
    },

    #[error("{requested} rejected units cannot be withdrawn, only {unprocessed} are unprocessed")]
    AlreadyProcessed { requested: i64, unprocessed: i64 },

    #[error("rejected quantity {rejected_quantity} exceeds outgoing quantity {outgoing_quantity}")]
    RejectedExceedsOutgoing {
        rejected_quantity: i64,
        outgoing_quantity: i64,
    },

    #[error("total quantity {total_quantity} does not equal received {received} plus short {short}")]
    TotalMismatch {
        total_quantity: i64,
        received: i64,
        short: i64,
    },

    #[error("unknown {field} value '{value}'")]
    UnknownValue { field: &'static str, value: String },
}

impl LedgerError {
    /// Name of the input field the error refers to
    pub fn field(&self) -> &'static str {
        match self {
            LedgerError::Negative { field, .. }
            | LedgerError::NotPositive { field }
            | LedgerError::TooLarge { field }
            | LedgerError::InsufficientUnits { field, .. }
            | LedgerError::ValueMismatch { field, .. }
            | LedgerError::OutOfRange { field, .. }
            | LedgerError::CounterDecrease { field, .. }
            | LedgerError::UnknownValue { field, .. } => field,
            LedgerError::RejectedExceedsReceived { .. } => "rejected",
            LedgerError::AvailableNegative { .. } => "available",
            LedgerError::ShortExceedsTotal { .. } => "short",
            LedgerError::InvalidTransition { .. } => "status",
            LedgerError::CountersExceedQuantity { .. } => "quantity",
            LedgerError::AlreadyProcessed { .. } => "rejected",
            LedgerError::RejectedExceedsOutgoing { .. } => "rejected_quantity",
            LedgerError::TotalMismatch { .. } => "total_quantity",
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Reject negative quantities
pub fn validate_non_negative(field: &'static str, value: i32) -> LedgerResult<()> {
    if value < 0 {
        return Err(LedgerError::Negative {
            field,
            value: value.into(),
        });
    }
    Ok(())
}

/// Reject zero or negative quantities
pub fn validate_positive(field: &'static str, value: i32) -> LedgerResult<()> {
    if value <= 0 {
        return Err(LedgerError::NotPositive { field });
    }
    Ok(())
}

/// Largest unit price a NUMERIC(14, 2) column holds
pub const MAX_UNIT_PRICE: Decimal = Decimal::from_parts(276_447_231, 23_283, 0, false, 2);

/// Largest line or record value a NUMERIC(16, 2) column holds
pub const MAX_VALUE: Decimal = Decimal::from_parts(1_874_919_423, 2_328_306, 0, false, 2);

/// Validate a unit price (0 up to [`MAX_UNIT_PRICE`])
pub fn validate_unit_price(price: Decimal) -> LedgerResult<()> {
    if price < Decimal::ZERO || price > MAX_UNIT_PRICE {
        return Err(LedgerError::OutOfRange {
            field: "unit_price",
            value: price,
            max: MAX_UNIT_PRICE,
        });
    }
    Ok(())
}

/// Validate a GST rate in percent (0-100)
pub fn validate_gst_percentage(pct: Decimal) -> LedgerResult<()> {
    let max = Decimal::from(100);
    if pct < Decimal::ZERO || pct > max {
        return Err(LedgerError::OutOfRange {
            field: "gst_percentage",
            value: pct,
            max,
        });
    }
    Ok(())
}

/// Validate an invoice number can be embedded in a report number
pub fn validate_invoice_number(invoice: &str) -> LedgerResult<()> {
    let trimmed = invoice.trim();
    if trimmed.is_empty() || trimmed.len() > 64 || trimmed.contains('%') {
        return Err(LedgerError::UnknownValue {
            field: "invoice_number",
            value: invoice.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_non_negative() {
        assert!(validate_non_negative("short", 0).is_ok());
        assert!(validate_non_negative("short", 12).is_ok());
        assert_eq!(
            validate_non_negative("short", -1),
            Err(LedgerError::Negative {
                field: "short",
                value: -1
            })
        );
    }

    #[test]
    fn test_validate_positive() {
        assert!(validate_positive("quantity", 1).is_ok());
        assert!(validate_positive("quantity", 0).is_err());
    }

    #[test]
    fn test_validate_unit_price_bounds() {
        assert_eq!(MAX_UNIT_PRICE.to_string(), "999999999999.99");
        assert_eq!(MAX_VALUE.to_string(), "99999999999999.99");
        assert!(validate_unit_price(Decimal::ZERO).is_ok());
        assert!(validate_unit_price(MAX_UNIT_PRICE).is_ok());
        assert!(matches!(
            validate_unit_price(Decimal::MAX),
            Err(LedgerError::OutOfRange { field: "unit_price", .. })
        ));
        assert!(validate_unit_price(Decimal::NEGATIVE_ONE).is_err());
    }

    #[test]
    fn test_validate_gst_percentage() {
        assert!(validate_gst_percentage(Decimal::from(18)).is_ok());
        assert!(validate_gst_percentage(Decimal::ZERO).is_ok());
        assert!(validate_gst_percentage(Decimal::from(101)).is_err());
        assert!(validate_gst_percentage(Decimal::from(-5)).is_err());
    }

    #[test]
    fn test_validate_invoice_number() {
        assert!(validate_invoice_number("INV-2024-0042").is_ok());
        assert!(validate_invoice_number("   ").is_err());
        assert!(validate_invoice_number("INV%").is_err());
    }

    #[test]
    fn test_error_field_names() {
        let err = LedgerError::RejectedExceedsReceived {
            rejected: 5,
            received: 3,
        };
        assert_eq!(err.field(), "rejected");

        let err = LedgerError::InsufficientUnits {
            field: "short",
            requested: 4,
            available: 2,
        };
        assert_eq!(err.field(), "short");
        assert_eq!(
            err.to_string(),
            "only 2 units can be moved from short, requested 4"
        );
    }
}
