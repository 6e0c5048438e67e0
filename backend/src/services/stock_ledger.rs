//! Stock ledger: the only code path that writes `skus.current_stock`
//!
//! Every function takes the caller's open transaction. The SKU row is locked
//! with `FOR UPDATE` before it is read, so concurrent corrections against the
//! same SKU serialize instead of losing updates.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use shared::{apply_stock_delta, has_sufficient_stock, StockAdjustment};
use sqlx::{FromRow, PgConnection, PgPool};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::{AppError, AppResult, StorageContext};

/// Why a stock delta is being applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    ReceiptCompleted,
    ReceiptReverted,
    RejectionChanged,
    ShortChanged,
    Dispatched,
    DispatchReverted,
    ReceivedBack,
}

impl Movement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Movement::ReceiptCompleted => "receipt_completed",
            Movement::ReceiptReverted => "receipt_reverted",
            Movement::RejectionChanged => "rejection_changed",
            Movement::ShortChanged => "short_changed",
            Movement::Dispatched => "dispatched",
            Movement::DispatchReverted => "dispatch_reverted",
            Movement::ReceivedBack => "received_back",
        }
    }
}

/// Stock view of a SKU
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SkuStock {
    pub id: Uuid,
    pub company_id: Uuid,
    pub sku_code: String,
    pub name: String,
    pub current_stock: i32,
    pub unit_price: Option<Decimal>,
    pub updated_at: DateTime<Utc>,
}

/// Lock the SKU row and return its stock
async fn lock_stock(conn: &mut PgConnection, company_id: Uuid, sku_id: Uuid) -> AppResult<i32> {
    sqlx::query_scalar::<_, i32>(
        "SELECT current_stock FROM skus WHERE id = $1 AND company_id = $2 FOR UPDATE",
    )
    .bind(sku_id)
    .bind(company_id)
    .fetch_optional(&mut *conn)
    .await
    .during("stock.lock", format_args!("sku {}", sku_id))?
    .ok_or_else(|| AppError::NotFound("SKU".to_string()))
}

async fn write_stock(
    conn: &mut PgConnection,
    company_id: Uuid,
    sku_id: Uuid,
    stock: i32,
) -> AppResult<()> {
    sqlx::query(
        "UPDATE skus SET current_stock = $1, updated_at = NOW() WHERE id = $2 AND company_id = $3",
    )
    .bind(stock)
    .bind(sku_id)
    .bind(company_id)
    .execute(&mut *conn)
    .await
    .during("stock.write", format_args!("sku {}", sku_id))?;
    Ok(())
}

/// Add `delta` to a SKU's stock, flooring at zero
pub async fn apply(
    conn: &mut PgConnection,
    company_id: Uuid,
    sku_id: Uuid,
    delta: i32,
    movement: Movement,
    record_id: Uuid,
) -> AppResult<StockAdjustment> {
    let current = lock_stock(conn, company_id, sku_id).await?;
    let adjustment = apply_stock_delta(current, delta);
    if delta == 0 {
        return Ok(adjustment);
    }

    write_stock(conn, company_id, sku_id, adjustment.stock_after).await?;

    if adjustment.was_clamped() {
        tracing::warn!(
            %sku_id,
            %record_id,
            delta,
            stock_before = adjustment.stock_before,
            unapplied = adjustment.clamped_by(),
            movement = movement.as_str(),
            "stock delta clamped at zero"
        );
    } else {
        tracing::debug!(
            %sku_id,
            %record_id,
            delta,
            stock_after = adjustment.stock_after,
            movement = movement.as_str(),
            "stock updated"
        );
    }

    Ok(adjustment)
}

/// Take `quantity` units out of stock, failing if not enough are on hand
pub async fn withdraw(
    conn: &mut PgConnection,
    company_id: Uuid,
    sku_id: Uuid,
    quantity: i32,
    record_id: Uuid,
) -> AppResult<StockAdjustment> {
    let current = lock_stock(conn, company_id, sku_id).await?;
    if !has_sufficient_stock(current, quantity) {
        return Err(AppError::InsufficientInventory(format!(
            "SKU {} has {} units on hand, {} requested",
            sku_id, current, quantity
        )));
    }
    apply(conn, company_id, sku_id, -quantity, Movement::Dispatched, record_id).await
}

/// Net per-SKU deltas in a stable order.
///
/// Locking SKUs in id order keeps two multi-item transactions from
/// deadlocking on each other.
pub fn net_by_sku(deltas: impl IntoIterator<Item = (Uuid, i32)>) -> Vec<(Uuid, i32)> {
    let mut net: BTreeMap<Uuid, i64> = BTreeMap::new();
    for (sku_id, delta) in deltas {
        *net.entry(sku_id).or_default() += i64::from(delta);
    }
    net.into_iter()
        .map(|(sku_id, delta)| (sku_id, delta.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32))
        .filter(|(_, delta)| *delta != 0)
        .collect()
}

/// Apply several deltas, netted per SKU
pub async fn apply_all(
    conn: &mut PgConnection,
    company_id: Uuid,
    deltas: impl IntoIterator<Item = (Uuid, i32)>,
    movement: Movement,
    record_id: Uuid,
) -> AppResult<Vec<(Uuid, StockAdjustment)>> {
    let mut applied = Vec::new();
    for (sku_id, delta) in net_by_sku(deltas) {
        let adjustment = apply(conn, company_id, sku_id, delta, movement, record_id).await?;
        applied.push((sku_id, adjustment));
    }
    Ok(applied)
}

/// Withdraw several quantities, checking stock per SKU after netting
pub async fn withdraw_all(
    conn: &mut PgConnection,
    company_id: Uuid,
    quantities: impl IntoIterator<Item = (Uuid, i32)>,
    record_id: Uuid,
) -> AppResult<Vec<(Uuid, StockAdjustment)>> {
    let mut applied = Vec::new();
    for (sku_id, quantity) in net_by_sku(quantities) {
        let adjustment = withdraw(conn, company_id, sku_id, quantity, record_id).await?;
        applied.push((sku_id, adjustment));
    }
    Ok(applied)
}

/// Read-side access to SKU stock
#[derive(Clone)]
pub struct StockService {
    db: PgPool,
}

impl StockService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn get_stock(&self, company_id: Uuid, sku_id: Uuid) -> AppResult<SkuStock> {
        sqlx::query_as::<_, SkuStock>(
            r#"
            SELECT id, company_id, sku_code, name, current_stock, unit_price, updated_at
            FROM skus
            WHERE id = $1 AND company_id = $2
            "#,
        )
        .bind(sku_id)
        .bind(company_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("SKU".to_string()))
    }

    /// SKUs whose stock is at or below `threshold`
    pub async fn list_low_stock(&self, company_id: Uuid, threshold: i32) -> AppResult<Vec<SkuStock>> {
        let skus = sqlx::query_as::<_, SkuStock>(
            r#"
            SELECT id, company_id, sku_code, name, current_stock, unit_price, updated_at
            FROM skus
            WHERE company_id = $1 AND is_active = true AND current_stock <= $2
            ORDER BY current_stock ASC, sku_code ASC
            "#,
        )
        .bind(company_id)
        .bind(threshold)
        .fetch_all(&self.db)
        .await?;

        Ok(skus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_net_by_sku_orders_and_drops_zero() {
        let a = Uuid::from_u128(2);
        let b = Uuid::from_u128(1);
        let net = net_by_sku([(a, 5), (b, 3), (a, -5), (b, 4)]);
        assert_eq!(net, vec![(b, 7)]);
    }

    #[test]
    fn test_net_by_sku_saturates() {
        let a = Uuid::from_u128(1);
        let net = net_by_sku([(a, i32::MAX), (a, i32::MAX)]);
        assert_eq!(net, vec![(a, i32::MAX)]);
    }

    #[test]
    fn test_movement_labels() {
        assert_eq!(Movement::ReceiptCompleted.as_str(), "receipt_completed");
        assert_eq!(Movement::ReceivedBack.as_str(), "received_back");
    }
}
