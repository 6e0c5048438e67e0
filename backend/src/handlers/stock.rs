//! HTTP handlers for SKU stock and price endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use shared::{PaginatedResponse, Pagination};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::{auth::INVENTORY, auth::READ, CurrentUser};
use crate::services::price_history::{ActivePrices, PriceHistoryEntry};
use crate::services::stock_ledger::SkuStock;
use crate::services::{PriceHistoryService, StockService};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LowStockQuery {
    #[serde(default)]
    pub threshold: i32,
}

pub async fn get_sku_stock(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(sku_id): Path<Uuid>,
) -> AppResult<Json<SkuStock>> {
    user.require(INVENTORY, READ)?;
    let service = StockService::new(state.db);
    Ok(Json(service.get_stock(user.company_id, sku_id).await?))
}

/// SKUs at or below a stock threshold (zero by default)
pub async fn list_low_stock(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<LowStockQuery>,
) -> AppResult<Json<Vec<SkuStock>>> {
    user.require(INVENTORY, READ)?;
    let service = StockService::new(state.db);
    let skus = service
        .list_low_stock(user.company_id, query.threshold)
        .await?;
    Ok(Json(skus))
}

/// Active current, previous and lowest prices of a SKU
pub async fn get_sku_prices(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(sku_id): Path<Uuid>,
) -> AppResult<Json<ActivePrices>> {
    user.require(INVENTORY, READ)?;
    let service = PriceHistoryService::new(state.db);
    Ok(Json(service.get_active(user.company_id, sku_id).await?))
}

pub async fn list_price_history(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(sku_id): Path<Uuid>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<PriceHistoryEntry>>> {
    user.require(INVENTORY, READ)?;
    let service = PriceHistoryService::new(state.db);
    let page = service
        .list_history(user.company_id, sku_id, pagination)
        .await?;
    Ok(Json(page))
}
