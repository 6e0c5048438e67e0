//! Shared types and ledger rules for the Warehouse Inventory Tracker
//!
//! This crate holds the quantity arithmetic, classification predicates and
//! validation rules used by the backend and by the browser (via WASM). It
//! performs no I/O.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
