//! Price history tracker
//!
//! Keeps the current / previous / lowest price slots of each SKU. Rotation
//! runs inside the transaction that completes a receipt.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use shared::{
    ActiveSlots, PaginatedResponse, Pagination, PriceObservation, PriceTag, RotationPlan,
    SlotChange,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult, StorageContext};

/// Price history row
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PriceHistoryEntry {
    pub id: Uuid,
    pub company_id: Uuid,
    pub sku_id: Uuid,
    pub vendor_id: Option<Uuid>,
    pub price: Decimal,
    pub tag: String,
    pub is_active: bool,
    pub invoice_number: Option<String>,
    pub incoming_id: Option<Uuid>,
    pub effective_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl PriceHistoryEntry {
    fn observation(&self) -> PriceObservation {
        PriceObservation {
            price: self.price,
            vendor_id: self.vendor_id,
            invoice_number: self.invoice_number.clone(),
            incoming_record_id: self.incoming_id,
            effective_date: self.effective_date,
        }
    }
}

/// Active slots of one SKU, keyed by tag
#[derive(Debug, Clone, Serialize)]
pub struct ActivePrices {
    pub sku_id: Uuid,
    pub current: Option<PriceHistoryEntry>,
    pub previous: Option<PriceHistoryEntry>,
    pub lowest: Option<PriceHistoryEntry>,
}

impl ActivePrices {
    fn from_rows(sku_id: Uuid, rows: Vec<PriceHistoryEntry>) -> AppResult<Self> {
        let mut active = ActivePrices {
            sku_id,
            current: None,
            previous: None,
            lowest: None,
        };
        for row in rows {
            match row.tag.parse::<PriceTag>()? {
                PriceTag::Current => active.current = Some(row),
                PriceTag::Previous => active.previous = Some(row),
                PriceTag::Lowest => active.lowest = Some(row),
            }
        }
        Ok(active)
    }

    fn slots(&self) -> ActiveSlots {
        ActiveSlots {
            current: self.current.as_ref().map(PriceHistoryEntry::observation),
            previous: self.previous.as_ref().map(PriceHistoryEntry::observation),
            lowest: self.lowest.as_ref().map(PriceHistoryEntry::observation),
        }
    }
}

const ENTRY_COLUMNS: &str = "id, company_id, sku_id, vendor_id, price, tag, is_active, \
                             invoice_number, incoming_id, effective_date, created_at";

async fn lock_active(
    conn: &mut PgConnection,
    company_id: Uuid,
    sku_id: Uuid,
) -> AppResult<Vec<PriceHistoryEntry>> {
    // Lock the SKU first so a SKU with no active rows still serializes
    sqlx::query("SELECT id FROM skus WHERE id = $1 AND company_id = $2 FOR UPDATE")
        .bind(sku_id)
        .bind(company_id)
        .fetch_optional(&mut *conn)
        .await
        .during("price_history.lock_sku", format_args!("sku {}", sku_id))?
        .ok_or_else(|| AppError::NotFound("SKU".to_string()))?;

    let sql = format!(
        "SELECT {} FROM price_history \
         WHERE company_id = $1 AND sku_id = $2 AND is_active = true FOR UPDATE",
        ENTRY_COLUMNS
    );
    let rows = sqlx::query_as::<_, PriceHistoryEntry>(&sql)
        .bind(company_id)
        .bind(sku_id)
        .fetch_all(&mut *conn)
        .await
        .during("price_history.lock_active", format_args!("sku {}", sku_id))?;
    Ok(rows)
}

async fn replace_slot(
    conn: &mut PgConnection,
    company_id: Uuid,
    sku_id: Uuid,
    tag: PriceTag,
    observed: &PriceObservation,
) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE price_history SET is_active = false
        WHERE company_id = $1 AND sku_id = $2 AND tag = $3 AND is_active = true
        "#,
    )
    .bind(company_id)
    .bind(sku_id)
    .bind(tag.as_str())
    .execute(&mut *conn)
    .await
    .during("price_history.deactivate", format_args!("sku {} {}", sku_id, tag.as_str()))?;

    sqlx::query(
        r#"
        INSERT INTO price_history (
            company_id, sku_id, vendor_id, price, tag, is_active,
            invoice_number, incoming_id, effective_date
        )
        VALUES ($1, $2, $3, $4, $5, true, $6, $7, $8)
        "#,
    )
    .bind(company_id)
    .bind(sku_id)
    .bind(observed.vendor_id)
    .bind(observed.price)
    .bind(tag.as_str())
    .bind(&observed.invoice_number)
    .bind(observed.incoming_record_id)
    .bind(observed.effective_date)
    .execute(&mut *conn)
    .await
    .during("price_history.insert", format_args!("sku {} {}", sku_id, tag.as_str()))?;

    Ok(())
}

/// Rotate the price slots of `sku_id` for one completed receipt line
pub async fn rotate(
    conn: &mut PgConnection,
    company_id: Uuid,
    sku_id: Uuid,
    observed: &PriceObservation,
) -> AppResult<RotationPlan> {
    if observed.price <= Decimal::ZERO {
        return Ok(RotationPlan::unchanged());
    }

    let rows = lock_active(conn, company_id, sku_id).await?;
    let slots = ActivePrices::from_rows(sku_id, rows)?.slots();
    let plan = slots.plan(observed);

    for (tag, change) in plan.changes() {
        if let SlotChange::Replace(obs) = change {
            replace_slot(conn, company_id, sku_id, tag, obs).await?;
        }
    }

    if plan.is_unchanged() {
        tracing::debug!(%sku_id, price = %observed.price, "price slots unchanged");
    } else {
        tracing::info!(
            %sku_id,
            price = %observed.price,
            record_id = ?observed.incoming_record_id,
            lowest_replaced = !plan.lowest.is_keep(),
            "price slots rotated"
        );
    }

    Ok(plan)
}

/// Read access to price history
#[derive(Clone)]
pub struct PriceHistoryService {
    db: PgPool,
}

impl PriceHistoryService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn ensure_sku(&self, company_id: Uuid, sku_id: Uuid) -> AppResult<()> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM skus WHERE id = $1 AND company_id = $2)",
        )
        .bind(sku_id)
        .bind(company_id)
        .fetch_one(&self.db)
        .await?;

        if !exists {
            return Err(AppError::NotFound("SKU".to_string()));
        }
        Ok(())
    }

    /// Active current / previous / lowest rows of a SKU
    pub async fn get_active(&self, company_id: Uuid, sku_id: Uuid) -> AppResult<ActivePrices> {
        self.ensure_sku(company_id, sku_id).await?;

        let sql = format!(
            "SELECT {} FROM price_history \
             WHERE company_id = $1 AND sku_id = $2 AND is_active = true",
            ENTRY_COLUMNS
        );
        let rows = sqlx::query_as::<_, PriceHistoryEntry>(&sql)
            .bind(company_id)
            .bind(sku_id)
            .fetch_all(&self.db)
            .await?;

        ActivePrices::from_rows(sku_id, rows)
    }

    /// Full history of a SKU, newest first
    pub async fn list_history(
        &self,
        company_id: Uuid,
        sku_id: Uuid,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<PriceHistoryEntry>> {
        self.ensure_sku(company_id, sku_id).await?;

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM price_history WHERE company_id = $1 AND sku_id = $2",
        )
        .bind(company_id)
        .bind(sku_id)
        .fetch_one(&self.db)
        .await?;

        let sql = format!(
            "SELECT {} FROM price_history \
             WHERE company_id = $1 AND sku_id = $2 \
             ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4",
            ENTRY_COLUMNS
        );
        let rows = sqlx::query_as::<_, PriceHistoryEntry>(&sql)
            .bind(company_id)
            .bind(sku_id)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.db)
            .await?;

        Ok(PaginatedResponse::new(rows, pagination, total.max(0) as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(tag: &str, price: i64) -> PriceHistoryEntry {
        PriceHistoryEntry {
            id: Uuid::new_v4(),
            company_id: Uuid::nil(),
            sku_id: Uuid::nil(),
            vendor_id: None,
            price: Decimal::from(price),
            tag: tag.to_string(),
            is_active: true,
            invoice_number: Some("INV-1".to_string()),
            incoming_id: Some(Uuid::new_v4()),
            effective_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_rows_map_to_slots() {
        let active = ActivePrices::from_rows(
            Uuid::nil(),
            vec![entry("current", 90), entry("lowest", 80), entry("previous", 80)],
        )
        .unwrap();
        let slots = active.slots();
        assert_eq!(slots.current.unwrap().price, Decimal::from(90));
        assert_eq!(slots.lowest.unwrap().price, Decimal::from(80));
        assert_eq!(slots.previous.unwrap().price, Decimal::from(80));
    }

    #[test]
    fn test_unknown_tag_is_an_error() {
        let result = ActivePrices::from_rows(Uuid::nil(), vec![entry("median", 10)]);
        assert!(matches!(result, Err(AppError::Ledger(_))));
    }
}
