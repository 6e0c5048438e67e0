//! Route definitions for the stock ledger API

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes; every route requires a bearer token
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/incoming", incoming_routes())
        .nest("/outgoing", outgoing_routes())
        .nest("/skus", sku_routes())
        .nest("/reports", report_routes())
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Incoming inventory routes
fn incoming_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_incoming).post(handlers::create_incoming),
        )
        .route(
            "/:id",
            get(handlers::get_incoming).delete(handlers::delete_incoming),
        )
        .route("/:id/status", patch(handlers::update_incoming_status))
        .route(
            "/:id/items/:item_id",
            patch(handlers::update_rejected_short),
        )
        .route(
            "/:id/items/:item_id/move-received-to-rejected",
            post(handlers::move_received_to_rejected),
        )
        .route(
            "/:id/items/:item_id/move-short-to-rejected",
            post(handlers::move_short_to_rejected),
        )
}

/// Outgoing inventory routes
fn outgoing_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_outgoing).post(handlers::create_outgoing),
        )
        .route(
            "/:id",
            get(handlers::get_outgoing).delete(handlers::delete_outgoing),
        )
        .route("/:id/status", patch(handlers::update_outgoing_status))
}

/// SKU stock and price routes
fn sku_routes() -> Router<AppState> {
    Router::new()
        .route("/low-stock", get(handlers::list_low_stock))
        .route("/:id/stock", get(handlers::get_sku_stock))
        .route("/:id/prices", get(handlers::get_sku_prices))
        .route("/:id/prices/history", get(handlers::list_price_history))
}

/// Rejected and short item report routes
fn report_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/rejected",
            get(handlers::list_reports).post(handlers::create_report),
        )
        .route(
            "/rejected/:id",
            get(handlers::get_report).patch(handlers::update_report),
        )
        .route("/short", get(handlers::list_short_items))
}
