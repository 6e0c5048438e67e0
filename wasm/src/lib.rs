//! WebAssembly module for the Warehouse Inventory Tracker
//!
//! Lets the receipt and dispatch forms preview what the server will compute:
//! - Derived short and available quantities of a receipt line
//! - Stock effect of a rejected/short correction before it is submitted
//! - GST values of a line
//! - Whether a dispatch classification moves stock

use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;
use wasm_bindgen::prelude::*;

pub use shared::models::*;
pub use shared::types::*;
pub use shared::validation::*;

#[derive(Serialize)]
struct LinePreview {
    quantities: ItemQuantities,
    arrived_short: i64,
    available: i64,
}

#[derive(Serialize)]
struct CorrectionPreview {
    after: ItemQuantities,
    stock_delta: i32,
    available: i64,
}

fn to_js(message: String) -> JsValue {
    JsValue::from_str(&message)
}

fn parse_decimal(field: &str, value: &str) -> Result<Decimal, String> {
    Decimal::from_str(value.trim()).map_err(|e| format!("Invalid {}: {}", field, e))
}

fn line_preview(received: i32, short: Option<i32>, total: Option<i32>) -> Result<String, String> {
    let quantities =
        ItemQuantities::resolve(received, short, total).map_err(|e| e.to_string())?;
    serde_json::to_string(&LinePreview {
        arrived_short: quantities.arrived_short(),
        available: quantities.available(),
        quantities,
    })
    .map_err(|e| e.to_string())
}

fn correction_preview(
    quantities_json: &str,
    rejected: Option<i32>,
    short: Option<i32>,
) -> Result<String, String> {
    let current: ItemQuantities = serde_json::from_str(quantities_json)
        .map_err(|e| format!("Invalid quantities JSON: {}", e))?;
    let correction = current.correct(rejected, short).map_err(|e| e.to_string())?;
    serde_json::to_string(&CorrectionPreview {
        after: correction.after,
        stock_delta: correction.stock_delta(),
        available: correction.after.available(),
    })
    .map_err(|e| e.to_string())
}

fn gst_preview(quantity: i32, unit_price: &str, gst_percentage: &str) -> Result<String, String> {
    let value = GstBreakdown::compute(
        quantity,
        parse_decimal("unit_price", unit_price)?,
        parse_decimal("gst_percentage", gst_percentage)?,
    )
    .map_err(|e| e.to_string())?;
    serde_json::to_string(&value).map_err(|e| e.to_string())
}

fn classification_moves_stock(
    document_type: &str,
    document_sub_type: Option<String>,
    delivery_challan_sub_type: Option<String>,
) -> Result<bool, String> {
    DispatchClassification::parse(
        document_type,
        document_sub_type.as_deref(),
        delivery_challan_sub_type.as_deref(),
    )
    .map(|c| c.moves_stock())
    .map_err(|e| e.to_string())
}

/// Resolve a receipt line; returns JSON with quantities, arrived_short and available
#[wasm_bindgen]
pub fn preview_receipt_line(
    received: i32,
    short: Option<i32>,
    total_quantity: Option<i32>,
) -> Result<String, JsValue> {
    line_preview(received, short, total_quantity).map_err(to_js)
}

/// Preview a rejected/short correction of a line given as JSON
#[wasm_bindgen]
pub fn preview_correction(
    quantities_json: &str,
    rejected: Option<i32>,
    short: Option<i32>,
) -> Result<String, JsValue> {
    correction_preview(quantities_json, rejected, short).map_err(to_js)
}

/// GST breakdown of a line; prices are decimal strings
#[wasm_bindgen]
pub fn preview_line_value(
    quantity: i32,
    unit_price: &str,
    gst_percentage: &str,
) -> Result<String, JsValue> {
    gst_preview(quantity, unit_price, gst_percentage).map_err(to_js)
}

/// True unless the classification is a rejected-units return to a vendor
#[wasm_bindgen]
pub fn dispatch_moves_stock(
    document_type: &str,
    document_sub_type: Option<String>,
    delivery_challan_sub_type: Option<String>,
) -> Result<bool, JsValue> {
    classification_moves_stock(document_type, document_sub_type, delivery_challan_sub_type)
        .map_err(to_js)
}

/// Next report number for an invoice, given the numbers already issued as a JSON array
#[wasm_bindgen]
pub fn preview_report_number(invoice_number: &str, existing_json: &str) -> Result<String, JsValue> {
    let existing: Vec<String> = serde_json::from_str(existing_json)
        .map_err(|e| to_js(format!("Invalid report numbers JSON: {}", e)))?;
    Ok(next_report_number(
        invoice_number.trim(),
        existing.iter().map(String::as_str),
    ))
}
