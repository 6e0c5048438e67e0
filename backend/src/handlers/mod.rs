//! HTTP request handlers

pub mod health;
pub mod incoming;
pub mod outgoing;
pub mod rejected_report;
pub mod stock;

pub use health::*;
pub use incoming::*;
pub use outgoing::*;
pub use rejected_report::*;
pub use stock::*;
