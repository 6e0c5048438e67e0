//! Business logic services for the stock ledger

pub mod incoming;
pub mod outgoing;
pub mod price_history;
pub mod rejected_report;
pub mod stock_ledger;

pub use incoming::IncomingService;
pub use outgoing::OutgoingService;
pub use price_history::PriceHistoryService;
pub use rejected_report::RejectedReportService;
pub use stock_ledger::StockService;

use serde::Deserialize;
use shared::RecordStatus;

/// Body of the status endpoints of incoming and outgoing records
#[derive(Debug, Deserialize)]
pub struct UpdateStatusInput {
    pub status: RecordStatus,
}

/// `ILIKE` pattern matching `term` anywhere, with wildcards in `term` escaped
pub(crate) fn contains_pattern(term: &str) -> String {
    let escaped = term
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}
