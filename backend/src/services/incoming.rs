//! Incoming transaction processor
//!
//! Receipts move stock when they are completed and give it back when they
//! are reverted. Corrections to `short` and `rejected` on a completed receipt
//! move stock by the change in the line's contribution; on a draft they only
//! change the line, and completion later adds what the line then holds. The
//! record row and the item row are locked before anything is read, so
//! concurrent corrections of the same line queue up behind each other.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    receipt_prices, receipt_transition_delta, record_total, validate_invoice_number, Correction,
    DocumentSubType, DocumentType, GstBreakdown, ItemQuantities, PaginatedResponse, Pagination,
    PriceObservation, RecordStatus, StatusTransition,
};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult, StorageContext};
use crate::services::contains_pattern;
use crate::services::outgoing::ensure_skus;
use crate::services::rejected_report::{self, RejectedItemReport};
use crate::services::stock_ledger::{self, Movement};
use crate::services::price_history;

/// Incoming inventory service
#[derive(Clone)]
pub struct IncomingService {
    db: PgPool,
}

/// Incoming record row
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct IncomingRecord {
    pub id: Uuid,
    pub company_id: Uuid,
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub receiving_date: NaiveDate,
    pub document_type: String,
    pub document_sub_type: Option<String>,
    pub vendor_id: Option<Uuid>,
    pub brand_id: Option<Uuid>,
    pub status: String,
    pub total_value: Decimal,
    pub remarks: Option<String>,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IncomingRecord {
    pub fn record_status(&self) -> AppResult<RecordStatus> {
        Ok(self.status.parse()?)
    }
}

/// Incoming item row
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct IncomingItem {
    pub id: Uuid,
    pub company_id: Uuid,
    pub incoming_id: Uuid,
    pub sku_id: Uuid,
    pub total_quantity: i32,
    pub received: i32,
    pub short: i32,
    pub rejected: i32,
    pub unit_price: Decimal,
    pub gst_percentage: Decimal,
    pub total_value_excl_gst: Decimal,
    pub gst_amount: Decimal,
    pub total_value_incl_gst: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IncomingItem {
    pub fn quantities(&self) -> ItemQuantities {
        ItemQuantities {
            total_quantity: self.total_quantity,
            received: self.received,
            short: self.short,
            rejected: self.rejected,
        }
    }
}

/// Item with its derived quantities
#[derive(Debug, Clone, Serialize)]
pub struct IncomingItemView {
    #[serde(flatten)]
    pub item: IncomingItem,
    pub arrived_short: i64,
    pub available: i64,
}

impl From<IncomingItem> for IncomingItemView {
    fn from(item: IncomingItem) -> Self {
        let q = item.quantities();
        Self {
            arrived_short: q.arrived_short(),
            available: q.available(),
            item,
        }
    }
}

/// Record with its items
#[derive(Debug, Clone, Serialize)]
pub struct IncomingRecordWithItems {
    #[serde(flatten)]
    pub record: IncomingRecord,
    pub items: Vec<IncomingItemView>,
}

/// Result of a quantity correction
#[derive(Debug, Serialize)]
pub struct CorrectionResult {
    pub item: IncomingItemView,
    pub stock_delta: i32,
    /// Report opened for newly rejected units
    pub report: Option<RejectedItemReport>,
}

/// Input for creating an incoming record
#[derive(Debug, Deserialize, Validate)]
pub struct CreateIncomingInput {
    #[validate(length(min = 1, max = 64, message = "Invoice number is required"))]
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    /// Defaults to the invoice date
    pub receiving_date: Option<NaiveDate>,
    pub document_type: DocumentType,
    pub document_sub_type: Option<DocumentSubType>,
    pub vendor_id: Option<Uuid>,
    pub brand_id: Option<Uuid>,
    pub status: Option<RecordStatus>,
    #[validate(length(max = 2000))]
    pub remarks: Option<String>,
    #[validate(length(min = 1, message = "At least one item is required"))]
    pub items: Vec<CreateIncomingItemInput>,
}

/// Input for one receipt line. Give `short`, `total_quantity`, or both.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateIncomingItemInput {
    pub sku_id: Uuid,
    #[validate(range(min = 0))]
    pub received: i32,
    #[validate(range(min = 0))]
    pub short: Option<i32>,
    #[validate(range(min = 0))]
    pub total_quantity: Option<i32>,
    #[serde(default)]
    pub unit_price: Decimal,
    #[serde(default)]
    pub gst_percentage: Decimal,
    pub total_value_incl_gst: Option<Decimal>,
}

/// Input for editing rejected and/or short on one line
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateRejectedShortInput {
    #[validate(range(min = 0))]
    pub rejected: Option<i32>,
    #[validate(range(min = 0))]
    pub short: Option<i32>,
}

/// Input for the move operations
#[derive(Debug, Deserialize, Validate)]
pub struct MoveQuantityInput {
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

/// Filters for listing incoming records
#[derive(Debug, Default, Deserialize)]
pub struct IncomingFilter {
    pub status: Option<RecordStatus>,
    pub document_type: Option<DocumentType>,
    pub vendor_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub invoice_number: Option<String>,
}

/// A validated receipt line ready to insert
#[derive(Debug, Clone)]
struct ReceiptLine {
    sku_id: Uuid,
    quantities: ItemQuantities,
    value: GstBreakdown,
}

const RECORD_COLUMNS: &str = "id, company_id, invoice_number, invoice_date, receiving_date, \
                              document_type, document_sub_type, vendor_id, brand_id, status, \
                              total_value, remarks, is_active, created_by, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, company_id, incoming_id, sku_id, total_quantity, received, short, \
                            rejected, unit_price, gst_percentage, total_value_excl_gst, gst_amount, \
                            total_value_incl_gst, created_at, updated_at";

fn build_lines(items: &[CreateIncomingItemInput]) -> AppResult<Vec<ReceiptLine>> {
    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        item.validate()?;
        let quantities = ItemQuantities::resolve(item.received, item.short, item.total_quantity)?;
        let value = GstBreakdown::compute(
            quantities.total_quantity,
            item.unit_price,
            item.gst_percentage,
        )?;
        value.verify_claimed_total(item.total_value_incl_gst)?;
        lines.push(ReceiptLine {
            sku_id: item.sku_id,
            quantities,
            value,
        });
    }
    Ok(lines)
}

/// Stock deltas of every line for a status change
fn transition_deltas(
    items: &[IncomingItem],
    transition: StatusTransition,
) -> impl Iterator<Item = (Uuid, i32)> + '_ {
    items
        .iter()
        .map(move |i| (i.sku_id, receipt_transition_delta(transition, &i.quantities())))
}

fn observation(record: &IncomingRecord, price: Decimal) -> PriceObservation {
    PriceObservation {
        price,
        vendor_id: record.vendor_id,
        invoice_number: Some(record.invoice_number.clone()),
        incoming_record_id: Some(record.id),
        effective_date: record.receiving_date,
    }
}

/// Rotate price slots once per priced SKU of a completed receipt
async fn rotate_prices(
    conn: &mut PgConnection,
    record: &IncomingRecord,
    items: &[IncomingItem],
) -> AppResult<()> {
    let prices = receipt_prices(items.iter().map(|i| (i.sku_id, i.unit_price)));
    for (sku_id, price) in prices {
        price_history::rotate(conn, record.company_id, sku_id, &observation(record, price)).await?;
    }
    Ok(())
}

impl IncomingService {
    /// Create a new IncomingService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn lock_record(
        conn: &mut PgConnection,
        company_id: Uuid,
        record_id: Uuid,
    ) -> AppResult<IncomingRecord> {
        let sql = format!(
            "SELECT {} FROM incoming_inventory \
             WHERE id = $1 AND company_id = $2 AND is_active = true FOR UPDATE",
            RECORD_COLUMNS
        );
        sqlx::query_as::<_, IncomingRecord>(&sql)
            .bind(record_id)
            .bind(company_id)
            .fetch_optional(&mut *conn)
            .await
            .during("incoming.lock_record", format_args!("record {}", record_id))?
            .ok_or_else(|| AppError::NotFound("Incoming record".to_string()))
    }

    async fn lock_item(
        conn: &mut PgConnection,
        company_id: Uuid,
        record_id: Uuid,
        item_id: Uuid,
    ) -> AppResult<IncomingItem> {
        let sql = format!(
            "SELECT {} FROM incoming_inventory_items \
             WHERE id = $1 AND incoming_id = $2 AND company_id = $3 FOR UPDATE",
            ITEM_COLUMNS
        );
        sqlx::query_as::<_, IncomingItem>(&sql)
            .bind(item_id)
            .bind(record_id)
            .bind(company_id)
            .fetch_optional(&mut *conn)
            .await
            .during("incoming.lock_item", format_args!("record {} item {}", record_id, item_id))?
            .ok_or_else(|| AppError::NotFound("Incoming item".to_string()))
    }

    async fn fetch_items(
        conn: &mut PgConnection,
        company_id: Uuid,
        record_id: Uuid,
        for_update: bool,
    ) -> AppResult<Vec<IncomingItem>> {
        let sql = format!(
            "SELECT {} FROM incoming_inventory_items \
             WHERE incoming_id = $1 AND company_id = $2 ORDER BY created_at, id{}",
            ITEM_COLUMNS,
            if for_update { " FOR UPDATE" } else { "" }
        );
        let items = sqlx::query_as::<_, IncomingItem>(&sql)
            .bind(record_id)
            .bind(company_id)
            .fetch_all(&mut *conn)
            .await
            .during("incoming.fetch_items", format_args!("record {}", record_id))?;
        Ok(items)
    }

    fn with_items(record: IncomingRecord, items: Vec<IncomingItem>) -> IncomingRecordWithItems {
        IncomingRecordWithItems {
            record,
            items: items.into_iter().map(IncomingItemView::from).collect(),
        }
    }

    /// Create a receipt; stock and prices move only if it is created completed
    pub async fn create(
        &self,
        company_id: Uuid,
        user_id: Uuid,
        input: CreateIncomingInput,
    ) -> AppResult<IncomingRecordWithItems> {
        input.validate()?;
        validate_invoice_number(&input.invoice_number)?;

        let lines = build_lines(&input.items)?;
        let status = input.status.unwrap_or(RecordStatus::Draft);
        let total_value = record_total(lines.iter().map(|l| &l.value))?;
        let invoice_number = input.invoice_number.trim();

        let mut tx = self.db.begin().await?;

        let sku_ids: Vec<Uuid> = lines.iter().map(|l| l.sku_id).collect();
        ensure_skus(&mut tx, company_id, &sku_ids).await?;

        let sql = format!(
            r#"
            INSERT INTO incoming_inventory (
                company_id, invoice_number, invoice_date, receiving_date, document_type,
                document_sub_type, vendor_id, brand_id, status, total_value, remarks, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {}
            "#,
            RECORD_COLUMNS
        );
        let record = sqlx::query_as::<_, IncomingRecord>(&sql)
            .bind(company_id)
            .bind(invoice_number)
            .bind(input.invoice_date)
            .bind(input.receiving_date.unwrap_or(input.invoice_date))
            .bind(input.document_type.as_str())
            .bind(input.document_sub_type.map(|t| t.as_str()))
            .bind(input.vendor_id)
            .bind(input.brand_id)
            .bind(status.as_str())
            .bind(total_value)
            .bind(&input.remarks)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await
            .during("incoming.insert_record", invoice_number)?;

        let item_sql = format!(
            r#"
            INSERT INTO incoming_inventory_items (
                company_id, incoming_id, sku_id, total_quantity, received, short, rejected,
                unit_price, gst_percentage, total_value_excl_gst, gst_amount, total_value_incl_gst
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {}
            "#,
            ITEM_COLUMNS
        );
        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            let item = sqlx::query_as::<_, IncomingItem>(&item_sql)
                .bind(company_id)
                .bind(record.id)
                .bind(line.sku_id)
                .bind(line.quantities.total_quantity)
                .bind(line.quantities.received)
                .bind(line.quantities.short)
                .bind(line.quantities.rejected)
                .bind(line.value.unit_price)
                .bind(line.value.gst_percentage)
                .bind(line.value.total_value_excl_gst)
                .bind(line.value.gst_amount)
                .bind(line.value.total_value_incl_gst)
                .fetch_one(&mut *tx)
                .await
                .during("incoming.insert_item", format_args!("record {} sku {}", record.id, line.sku_id))?;
            items.push(item);
        }

        if status.is_completed() {
            stock_ledger::apply_all(
                &mut tx,
                company_id,
                transition_deltas(&items, StatusTransition::Complete),
                Movement::ReceiptCompleted,
                record.id,
            )
            .await?;
            rotate_prices(&mut tx, &record, &items).await?;
        }

        tx.commit().await?;

        tracing::info!(
            record_id = %record.id,
            invoice_number = %record.invoice_number,
            status = %record.status,
            items = items.len(),
            "incoming record created"
        );

        Ok(Self::with_items(record, items))
    }

    /// Move a receipt between draft and completed
    pub async fn update_status(
        &self,
        company_id: Uuid,
        record_id: Uuid,
        new_status: RecordStatus,
    ) -> AppResult<IncomingRecordWithItems> {
        let mut tx = self.db.begin().await?;

        let record = Self::lock_record(&mut tx, company_id, record_id).await?;
        let transition = record.record_status()?.transition_to(new_status)?;
        let items = Self::fetch_items(&mut tx, company_id, record_id, true).await?;

        let movement = match transition {
            StatusTransition::Complete => Movement::ReceiptCompleted,
            StatusTransition::Revert => Movement::ReceiptReverted,
        };
        stock_ledger::apply_all(
            &mut tx,
            company_id,
            transition_deltas(&items, transition),
            movement,
            record_id,
        )
        .await?;

        if transition == StatusTransition::Complete {
            rotate_prices(&mut tx, &record, &items).await?;
        }

        let sql = format!(
            "UPDATE incoming_inventory SET status = $1, updated_at = NOW() WHERE id = $2 RETURNING {}",
            RECORD_COLUMNS
        );
        let record = sqlx::query_as::<_, IncomingRecord>(&sql)
            .bind(new_status.as_str())
            .bind(record_id)
            .fetch_one(&mut *tx)
            .await
            .during("incoming.update_status", format_args!("record {}", record_id))?;

        tx.commit().await?;

        tracing::info!(record_id = %record_id, status = %new_status, "incoming status changed");

        Ok(Self::with_items(record, items))
    }

    async fn write_quantities(
        conn: &mut PgConnection,
        item_id: Uuid,
        after: &ItemQuantities,
    ) -> AppResult<IncomingItem> {
        let sql = format!(
            r#"
            UPDATE incoming_inventory_items
            SET rejected = $1, short = $2, updated_at = NOW()
            WHERE id = $3
            RETURNING {}
            "#,
            ITEM_COLUMNS
        );
        let item = sqlx::query_as::<_, IncomingItem>(&sql)
            .bind(after.rejected)
            .bind(after.short)
            .bind(item_id)
            .fetch_one(&mut *conn)
            .await
            .during("incoming.write_quantities", format_args!("item {}", item_id))?;
        Ok(item)
    }

    /// Persist a correction, move stock by its delta and keep reports in step
    async fn apply_correction(
        &self,
        company_id: Uuid,
        user_id: Uuid,
        record_id: Uuid,
        item_id: Uuid,
        correct: impl FnOnce(&ItemQuantities) -> AppResult<Correction>,
    ) -> AppResult<CorrectionResult> {
        let mut tx = self.db.begin().await?;

        let record = Self::lock_record(&mut tx, company_id, record_id).await?;
        let item = Self::lock_item(&mut tx, company_id, record_id, item_id).await?;

        let correction = correct(&item.quantities())?;
        if correction.is_noop() {
            tx.commit().await?;
            return Ok(CorrectionResult {
                item: item.into(),
                stock_delta: 0,
                report: None,
            });
        }

        let updated = Self::write_quantities(&mut tx, item_id, &correction.after).await?;

        // Draft lines reach stock only when the record is completed
        let stock_delta = if record.record_status()?.is_completed() {
            correction.stock_delta()
        } else {
            0
        };
        if stock_delta != 0 {
            let movement = if correction.rejected_diff != 0 {
                Movement::RejectionChanged
            } else {
                Movement::ShortChanged
            };
            stock_ledger::apply(&mut tx, company_id, item.sku_id, stock_delta, movement, record_id)
                .await?;
        }

        let source = rejected_report::lock_source(&mut tx, company_id, item_id).await?;
        let report =
            rejected_report::sync_rejection(&mut tx, &source, correction.rejected_diff, Some(user_id))
                .await?;

        tx.commit().await?;

        tracing::info!(
            record_id = %record_id,
            item_id = %item_id,
            rejected_diff = correction.rejected_diff,
            short_diff = correction.short_diff,
            stock_delta,
            "incoming item corrected"
        );

        Ok(CorrectionResult {
            item: updated.into(),
            stock_delta,
            report,
        })
    }

    /// Set new rejected and/or short values on a line
    pub async fn update_rejected_short(
        &self,
        company_id: Uuid,
        user_id: Uuid,
        record_id: Uuid,
        item_id: Uuid,
        input: UpdateRejectedShortInput,
    ) -> AppResult<CorrectionResult> {
        input.validate()?;
        if input.rejected.is_none() && input.short.is_none() {
            return Err(AppError::validation(
                "rejected",
                "Provide rejected, short, or both",
            ));
        }

        self.apply_correction(company_id, user_id, record_id, item_id, |q| {
            Ok(q.correct(input.rejected, input.short)?)
        })
        .await
    }

    /// Pull healthy received units out of stock as rejected
    pub async fn move_received_to_rejected(
        &self,
        company_id: Uuid,
        user_id: Uuid,
        record_id: Uuid,
        item_id: Uuid,
        input: MoveQuantityInput,
    ) -> AppResult<CorrectionResult> {
        input.validate()?;
        self.apply_correction(company_id, user_id, record_id, item_id, |q| {
            Ok(q.move_received_to_rejected(input.quantity)?)
        })
        .await
    }

    /// Book outstanding short units as rejected without touching stock
    pub async fn move_short_to_rejected(
        &self,
        company_id: Uuid,
        user_id: Uuid,
        record_id: Uuid,
        item_id: Uuid,
        input: MoveQuantityInput,
    ) -> AppResult<CorrectionResult> {
        input.validate()?;
        self.apply_correction(company_id, user_id, record_id, item_id, |q| {
            Ok(q.move_short_to_rejected(input.quantity)?)
        })
        .await
    }

    /// Soft-delete a receipt, taking its received units back out if completed
    pub async fn delete(&self, company_id: Uuid, record_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let record = Self::lock_record(&mut tx, company_id, record_id).await?;
        if record.record_status()?.is_completed() {
            let items = Self::fetch_items(&mut tx, company_id, record_id, true).await?;
            stock_ledger::apply_all(
                &mut tx,
                company_id,
                transition_deltas(&items, StatusTransition::Revert),
                Movement::ReceiptReverted,
                record_id,
            )
            .await?;
        }

        sqlx::query("UPDATE incoming_inventory SET is_active = false, updated_at = NOW() WHERE id = $1")
            .bind(record_id)
            .execute(&mut *tx)
            .await
            .during("incoming.delete", format_args!("record {}", record_id))?;

        tx.commit().await?;

        tracing::info!(record_id = %record_id, "incoming record deleted");
        Ok(())
    }

    pub async fn get(&self, company_id: Uuid, record_id: Uuid) -> AppResult<IncomingRecordWithItems> {
        let mut conn = self.db.acquire().await?;

        let sql = format!(
            "SELECT {} FROM incoming_inventory WHERE id = $1 AND company_id = $2 AND is_active = true",
            RECORD_COLUMNS
        );
        let record = sqlx::query_as::<_, IncomingRecord>(&sql)
            .bind(record_id)
            .bind(company_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound("Incoming record".to_string()))?;

        let items = Self::fetch_items(&mut conn, company_id, record_id, false).await?;
        Ok(Self::with_items(record, items))
    }

    pub async fn list(
        &self,
        company_id: Uuid,
        filter: &IncomingFilter,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<IncomingRecord>> {
        fn push_filters<'a>(
            qb: &mut QueryBuilder<'a, Postgres>,
            company_id: Uuid,
            filter: &'a IncomingFilter,
        ) {
            qb.push(" WHERE company_id = ")
                .push_bind(company_id)
                .push(" AND is_active = true");
            if let Some(status) = filter.status {
                qb.push(" AND status = ").push_bind(status.as_str());
            }
            if let Some(document_type) = filter.document_type {
                qb.push(" AND document_type = ").push_bind(document_type.as_str());
            }
            if let Some(vendor_id) = filter.vendor_id {
                qb.push(" AND vendor_id = ").push_bind(vendor_id);
            }
            if let Some(from) = filter.from {
                qb.push(" AND receiving_date >= ").push_bind(from);
            }
            if let Some(to) = filter.to {
                qb.push(" AND receiving_date <= ").push_bind(to);
            }
            if let Some(invoice) = &filter.invoice_number {
                qb.push(" AND invoice_number ILIKE ")
                    .push_bind(contains_pattern(invoice));
            }
        }

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM incoming_inventory");
        push_filters(&mut count, company_id, filter);
        let (total,) = count
            .build_query_as::<(i64,)>()
            .fetch_one(&self.db)
            .await?;

        let mut page =
            QueryBuilder::<Postgres>::new(format!("SELECT {} FROM incoming_inventory", RECORD_COLUMNS));
        push_filters(&mut page, company_id, filter);
        page.push(" ORDER BY receiving_date DESC, created_at DESC LIMIT ")
            .push_bind(pagination.limit())
            .push(" OFFSET ")
            .push_bind(pagination.offset());
        let records = page
            .build_query_as::<IncomingRecord>()
            .fetch_all(&self.db)
            .await?;

        Ok(PaginatedResponse::new(records, pagination, total.max(0) as u64))
    }
}
