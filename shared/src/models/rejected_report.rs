//! Rejected-item report numbering and counters

use serde::{Deserialize, Serialize};

use crate::validation::{validate_non_negative, LedgerError, LedgerResult};

pub const REPORT_PREFIX: &str = "REJ";

/// Format `REJ/<invoice>/<seq>` with a three-digit minimum sequence
pub fn format_report_number(invoice_number: &str, sequence: u32) -> String {
    format!("{}/{}/{:03}", REPORT_PREFIX, invoice_number, sequence)
}

/// Trailing sequence of a report number issued for `invoice_number`
pub fn report_sequence(report_number: &str, invoice_number: &str) -> Option<u32> {
    let rest = report_number.strip_prefix(REPORT_PREFIX)?.strip_prefix('/')?;
    let rest = rest.strip_prefix(invoice_number)?.strip_prefix('/')?;
    if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok()
}

/// Next report number after the existing ones for the same invoice
pub fn next_report_number<'a>(
    invoice_number: &str,
    existing: impl IntoIterator<Item = &'a str>,
) -> String {
    let max = existing
        .into_iter()
        .filter_map(|n| report_sequence(n, invoice_number))
        .max()
        .unwrap_or(0);
    format_report_number(invoice_number, max + 1)
}

/// Disposition counters of one report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportCounters {
    pub quantity: i32,
    pub sent_to_vendor: i32,
    pub received_back: i32,
    pub scrapped: i32,
}

/// Requested new counter values; `None` keeps the current value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterUpdate {
    pub sent_to_vendor: Option<i32>,
    pub received_back: Option<i32>,
    pub scrapped: Option<i32>,
}

/// Result of applying a [`CounterUpdate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterChange {
    pub after: ReportCounters,
    pub sent_to_vendor_delta: i32,
    pub received_back_delta: i32,
    pub scrapped_delta: i32,
}

impl ReportCounters {
    pub fn opened(quantity: i32) -> Self {
        Self {
            quantity,
            sent_to_vendor: 0,
            received_back: 0,
            scrapped: 0,
        }
    }

    /// Units that have left the rejected pile one way or another
    pub fn processed(&self) -> i64 {
        i64::from(self.sent_to_vendor) + i64::from(self.received_back) + i64::from(self.scrapped)
    }

    pub fn net_rejected(&self) -> i32 {
        (i64::from(self.quantity) - self.processed()).max(0) as i32
    }

    pub fn check(&self) -> LedgerResult<()> {
        validate_non_negative("quantity", self.quantity)?;
        validate_non_negative("sent_to_vendor", self.sent_to_vendor)?;
        validate_non_negative("received_back", self.received_back)?;
        validate_non_negative("scrapped", self.scrapped)?;
        if self.processed() > i64::from(self.quantity) {
            return Err(LedgerError::CountersExceedQuantity {
                processed: self.processed(),
                quantity: self.quantity.into(),
            });
        }
        Ok(())
    }

    /// Apply new counter values; counters only move forward
    pub fn apply(&self, update: &CounterUpdate) -> LedgerResult<CounterChange> {
        fn forward(field: &'static str, current: i32, requested: Option<i32>) -> LedgerResult<i32> {
            match requested {
                Some(value) if value < current => Err(LedgerError::CounterDecrease {
                    field,
                    current: current.into(),
                    requested: value.into(),
                }),
                Some(value) => Ok(value),
                None => Ok(current),
            }
        }

        let after = ReportCounters {
            quantity: self.quantity,
            sent_to_vendor: forward("sent_to_vendor", self.sent_to_vendor, update.sent_to_vendor)?,
            received_back: forward("received_back", self.received_back, update.received_back)?,
            scrapped: forward("scrapped", self.scrapped, update.scrapped)?,
        };
        after.check()?;

        Ok(CounterChange {
            after,
            sent_to_vendor_delta: after.sent_to_vendor - self.sent_to_vendor,
            received_back_delta: after.received_back - self.received_back,
            scrapped_delta: after.scrapped - self.scrapped,
        })
    }
}

/// Spread a withdrawal of `amount` rejected units over open reports.
///
/// `reports` must be ordered newest first. Only unprocessed units can be
/// withdrawn. Returns `(report_id, new_quantity)` for every touched report.
pub fn plan_withdrawal<Id: Copy>(
    reports: &[(Id, ReportCounters)],
    amount: i32,
) -> LedgerResult<Vec<(Id, i32)>> {
    let unprocessed: i64 = reports.iter().map(|(_, c)| i64::from(c.net_rejected())).sum();
    if i64::from(amount) > unprocessed {
        return Err(LedgerError::AlreadyProcessed {
            requested: amount.into(),
            unprocessed,
        });
    }

    let mut remaining = amount;
    let mut changes = Vec::new();
    for (id, counters) in reports {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(counters.net_rejected());
        if take > 0 {
            changes.push((*id, counters.quantity - take));
            remaining -= take;
        }
    }
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_report_number() {
        assert_eq!(format_report_number("INV-7", 1), "REJ/INV-7/001");
        assert_eq!(format_report_number("INV-7", 1234), "REJ/INV-7/1234");
    }

    #[test]
    fn test_report_sequence_parsing() {
        assert_eq!(report_sequence("REJ/INV-7/004", "INV-7"), Some(4));
        assert_eq!(report_sequence("REJ/INV-7/004", "INV-8"), None);
        assert_eq!(report_sequence("REJ/INV-7/abc", "INV-7"), None);
        assert_eq!(report_sequence("REJ/INV-7/", "INV-7"), None);
    }

    #[test]
    fn test_invoice_containing_slashes() {
        let existing = ["REJ/A/B/001", "REJ/A/B/002"];
        assert_eq!(next_report_number("A/B", existing), "REJ/A/B/003");
        assert_eq!(next_report_number("A", existing), "REJ/A/001");
    }

    #[test]
    fn test_next_report_number() {
        assert_eq!(next_report_number("INV-1", []), "REJ/INV-1/001");
        let existing = ["REJ/INV-1/001", "REJ/INV-1/003", "REJ/INV-2/009"];
        assert_eq!(next_report_number("INV-1", existing), "REJ/INV-1/004");
    }

    #[test]
    fn test_net_rejected() {
        let c = ReportCounters {
            quantity: 10,
            sent_to_vendor: 3,
            received_back: 2,
            scrapped: 1,
        };
        assert_eq!(c.net_rejected(), 4);
    }

    #[test]
    fn test_counters_cannot_exceed_quantity() {
        let c = ReportCounters::opened(5);
        let err = c
            .apply(&CounterUpdate {
                sent_to_vendor: Some(4),
                scrapped: Some(2),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::CountersExceedQuantity {
                processed: 6,
                quantity: 5
            }
        );
    }

    #[test]
    fn test_counters_cannot_decrease() {
        let c = ReportCounters {
            sent_to_vendor: 2,
            ..ReportCounters::opened(5)
        };
        let err = c
            .apply(&CounterUpdate {
                sent_to_vendor: Some(1),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.field(), "sent_to_vendor");
    }

    #[test]
    fn test_counter_deltas() {
        let c = ReportCounters::opened(8);
        let change = c
            .apply(&CounterUpdate {
                sent_to_vendor: Some(3),
                received_back: Some(2),
                scrapped: None,
            })
            .unwrap();
        assert_eq!(change.sent_to_vendor_delta, 3);
        assert_eq!(change.received_back_delta, 2);
        assert_eq!(change.scrapped_delta, 0);
        assert_eq!(change.after.net_rejected(), 3);
    }

    #[test]
    fn test_plan_withdrawal_newest_first() {
        let reports = [
            (2, ReportCounters::opened(3)),
            (
                1,
                ReportCounters {
                    scrapped: 2,
                    ..ReportCounters::opened(5)
                },
            ),
        ];
        let plan = plan_withdrawal(&reports, 5).unwrap();
        assert_eq!(plan, vec![(2, 0), (1, 3)]);
        assert_eq!(plan_withdrawal(&reports, 2).unwrap(), vec![(2, 1)]);
        assert!(plan_withdrawal(&reports, 7).is_err());
    }
}
