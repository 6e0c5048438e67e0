//! Domain models for the stock ledger

mod document;
mod incoming;
mod outgoing;
mod price_history;
mod rejected_report;
mod sku;
mod valuation;

pub use document::*;
pub use incoming::*;
pub use outgoing::*;
pub use price_history::*;
pub use rejected_report::*;
pub use sku::*;
pub use valuation::*;
