//! Outgoing transaction processor
//!
//! Dispatches take stock out only while completed. Replacement challans sent
//! back to a vendor carry units that already left stock when they were
//! rejected, so they never touch the ledger.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    dispatch_transition_delta, record_total, DeliveryChallanSubType, DispatchClassification,
    DispatchQuantities, DocumentSubType, DocumentType, GstBreakdown, PaginatedResponse,
    Pagination, RecordStatus, StatusTransition,
};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult, StorageContext};
use crate::services::contains_pattern;
use crate::services::stock_ledger::{self, Movement};

/// Outgoing inventory service
#[derive(Clone)]
pub struct OutgoingService {
    db: PgPool,
}

/// Outgoing record row
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OutgoingRecord {
    pub id: Uuid,
    pub company_id: Uuid,
    pub document_number: String,
    pub document_date: NaiveDate,
    pub document_type: String,
    pub document_sub_type: Option<String>,
    pub delivery_challan_sub_type: Option<String>,
    pub customer_id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub status: String,
    pub total_value: Decimal,
    pub remarks: Option<String>,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OutgoingRecord {
    pub fn classification(&self) -> AppResult<DispatchClassification> {
        Ok(DispatchClassification::parse(
            &self.document_type,
            self.document_sub_type.as_deref(),
            self.delivery_challan_sub_type.as_deref(),
        )?)
    }

    pub fn record_status(&self) -> AppResult<RecordStatus> {
        Ok(self.status.parse()?)
    }
}

/// Outgoing item row
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OutgoingItem {
    pub id: Uuid,
    pub company_id: Uuid,
    pub outgoing_id: Uuid,
    pub sku_id: Uuid,
    pub outgoing_quantity: i32,
    pub rejected_quantity: i32,
    pub unit_price: Decimal,
    pub gst_percentage: Decimal,
    pub total_value_excl_gst: Decimal,
    pub gst_amount: Decimal,
    pub total_value_incl_gst: Decimal,
    pub rejected_report_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Record with its items
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingRecordWithItems {
    #[serde(flatten)]
    pub record: OutgoingRecord,
    pub moves_stock: bool,
    pub items: Vec<OutgoingItem>,
}

/// Input for creating an outgoing record
#[derive(Debug, Deserialize, Validate)]
pub struct CreateOutgoingInput {
    #[validate(length(min = 1, max = 64, message = "Document number is required"))]
    pub document_number: String,
    pub document_date: NaiveDate,
    pub document_type: DocumentType,
    pub document_sub_type: Option<DocumentSubType>,
    pub delivery_challan_sub_type: Option<DeliveryChallanSubType>,
    pub customer_id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub status: Option<RecordStatus>,
    #[validate(length(max = 2000))]
    pub remarks: Option<String>,
    #[validate(length(min = 1, message = "At least one item is required"))]
    pub items: Vec<CreateOutgoingItemInput>,
}

/// Input for one dispatch line
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateOutgoingItemInput {
    pub sku_id: Uuid,
    #[validate(range(min = 1))]
    pub outgoing_quantity: i32,
    pub rejected_quantity: Option<i32>,
    #[serde(default)]
    pub unit_price: Decimal,
    #[serde(default)]
    pub gst_percentage: Decimal,
    pub total_value_incl_gst: Option<Decimal>,
}

/// Filters for listing outgoing records
#[derive(Debug, Default, Deserialize)]
pub struct OutgoingFilter {
    pub status: Option<RecordStatus>,
    pub document_type: Option<DocumentType>,
    pub customer_id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub document_number: Option<String>,
}

/// A validated dispatch line ready to insert
#[derive(Debug, Clone)]
struct DispatchLine {
    sku_id: Uuid,
    quantities: DispatchQuantities,
    value: GstBreakdown,
    rejected_report_id: Option<Uuid>,
}

/// Header fields of a record to insert
#[derive(Debug, Clone)]
struct DispatchHeader<'a> {
    document_number: &'a str,
    document_date: NaiveDate,
    classification: DispatchClassification,
    customer_id: Option<Uuid>,
    vendor_id: Option<Uuid>,
    team_id: Option<Uuid>,
    status: RecordStatus,
    remarks: Option<&'a str>,
}

/// Units of a rejected-item report going back to the vendor
#[derive(Debug, Clone)]
pub struct RejectedReturn {
    pub company_id: Uuid,
    pub created_by: Uuid,
    pub report_id: Uuid,
    pub report_number: String,
    pub vendor_id: Option<Uuid>,
    pub sku_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub gst_percentage: Decimal,
    pub document_date: NaiveDate,
}

const RECORD_COLUMNS: &str = "id, company_id, document_number, document_date, document_type, \
                              document_sub_type, delivery_challan_sub_type, customer_id, vendor_id, \
                              team_id, status, total_value, remarks, is_active, created_by, \
                              created_at, updated_at";

const ITEM_COLUMNS: &str = "id, company_id, outgoing_id, sku_id, outgoing_quantity, rejected_quantity, \
                            unit_price, gst_percentage, total_value_excl_gst, gst_amount, \
                            total_value_incl_gst, rejected_report_id, created_at, updated_at";

fn build_lines(
    classification: &DispatchClassification,
    items: &[CreateOutgoingItemInput],
) -> AppResult<Vec<DispatchLine>> {
    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        item.validate()?;
        let quantities = DispatchQuantities::resolve(
            classification,
            item.outgoing_quantity,
            item.rejected_quantity,
        )?;
        let value =
            GstBreakdown::compute(quantities.outgoing_quantity, item.unit_price, item.gst_percentage)?;
        value.verify_claimed_total(item.total_value_incl_gst)?;
        lines.push(DispatchLine {
            sku_id: item.sku_id,
            quantities,
            value,
            rejected_report_id: None,
        });
    }
    Ok(lines)
}

pub(crate) async fn ensure_skus(conn: &mut PgConnection, company_id: Uuid, sku_ids: &[Uuid]) -> AppResult<()> {
    let mut unique = sku_ids.to_vec();
    unique.sort();
    unique.dedup();

    let found = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM skus WHERE company_id = $1 AND id = ANY($2)",
    )
    .bind(company_id)
    .bind(&unique)
    .fetch_one(&mut *conn)
    .await?;

    if found != unique.len() as i64 {
        return Err(AppError::NotFound("SKU".to_string()));
    }
    Ok(())
}

async fn insert_dispatch(
    conn: &mut PgConnection,
    company_id: Uuid,
    created_by: Uuid,
    header: &DispatchHeader<'_>,
    lines: &[DispatchLine],
) -> AppResult<(OutgoingRecord, Vec<OutgoingItem>)> {
    let total_value = record_total(lines.iter().map(|l| &l.value))?;

    let sql = format!(
        r#"
        INSERT INTO outgoing_inventory (
            company_id, document_number, document_date, document_type, document_sub_type,
            delivery_challan_sub_type, customer_id, vendor_id, team_id, status, total_value,
            remarks, created_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        RETURNING {}
        "#,
        RECORD_COLUMNS
    );
    let record = sqlx::query_as::<_, OutgoingRecord>(&sql)
        .bind(company_id)
        .bind(header.document_number)
        .bind(header.document_date)
        .bind(header.classification.document_type.as_str())
        .bind(header.classification.document_sub_type.map(|t| t.as_str()))
        .bind(header.classification.delivery_challan_sub_type.map(|t| t.as_str()))
        .bind(header.customer_id)
        .bind(header.vendor_id)
        .bind(header.team_id)
        .bind(header.status.as_str())
        .bind(total_value)
        .bind(header.remarks)
        .bind(created_by)
        .fetch_one(&mut *conn)
        .await
        .during("outgoing.insert_record", header.document_number)?;

    let item_sql = format!(
        r#"
        INSERT INTO outgoing_inventory_items (
            company_id, outgoing_id, sku_id, outgoing_quantity, rejected_quantity, unit_price,
            gst_percentage, total_value_excl_gst, gst_amount, total_value_incl_gst,
            rejected_report_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING {}
        "#,
        ITEM_COLUMNS
    );
    let mut items = Vec::with_capacity(lines.len());
    for line in lines {
        let item = sqlx::query_as::<_, OutgoingItem>(&item_sql)
            .bind(company_id)
            .bind(record.id)
            .bind(line.sku_id)
            .bind(line.quantities.outgoing_quantity)
            .bind(line.quantities.rejected_quantity)
            .bind(line.value.unit_price)
            .bind(line.value.gst_percentage)
            .bind(line.value.total_value_excl_gst)
            .bind(line.value.gst_amount)
            .bind(line.value.total_value_incl_gst)
            .bind(line.rejected_report_id)
            .fetch_one(&mut *conn)
            .await
            .during("outgoing.insert_item", format_args!("record {} sku {}", record.id, line.sku_id))?;
        items.push(item);
    }

    Ok((record, items))
}

/// Insert a completed replacement challan for units returned to a vendor.
///
/// Runs inside the caller's transaction and leaves stock untouched.
pub async fn insert_rejected_return(
    conn: &mut PgConnection,
    ret: &RejectedReturn,
) -> AppResult<Uuid> {
    let classification = DispatchClassification::rejected_return();
    let quantities = DispatchQuantities::resolve(&classification, ret.quantity, None)?;
    let value = GstBreakdown::compute(ret.quantity, ret.unit_price, ret.gst_percentage)?;

    let header = DispatchHeader {
        document_number: &ret.report_number,
        document_date: ret.document_date,
        classification,
        customer_id: None,
        vendor_id: ret.vendor_id,
        team_id: None,
        status: RecordStatus::Completed,
        remarks: Some("Rejected units returned to vendor"),
    };
    let line = DispatchLine {
        sku_id: ret.sku_id,
        quantities,
        value,
        rejected_report_id: Some(ret.report_id),
    };

    let (record, _) =
        insert_dispatch(conn, ret.company_id, ret.created_by, &header, &[line]).await?;

    tracing::info!(
        record_id = %record.id,
        report_number = %ret.report_number,
        quantity = ret.quantity,
        "rejected units dispatched to vendor"
    );

    Ok(record.id)
}

/// Apply the stock effect of a status change to every line
async fn move_stock(
    conn: &mut PgConnection,
    record: &OutgoingRecord,
    items: &[OutgoingItem],
    transition: StatusTransition,
) -> AppResult<()> {
    let classification = record.classification()?;
    if !classification.moves_stock() {
        tracing::debug!(record_id = %record.id, "rejected-return dispatch, stock untouched");
        return Ok(());
    }

    match transition {
        StatusTransition::Complete => {
            stock_ledger::withdraw_all(
                conn,
                record.company_id,
                items.iter().map(|i| (i.sku_id, i.outgoing_quantity)),
                record.id,
            )
            .await?;
        }
        StatusTransition::Revert => {
            stock_ledger::apply_all(
                conn,
                record.company_id,
                items.iter().map(|i| {
                    (
                        i.sku_id,
                        dispatch_transition_delta(&classification, transition, i.outgoing_quantity),
                    )
                }),
                Movement::DispatchReverted,
                record.id,
            )
            .await?;
        }
    }
    Ok(())
}

impl OutgoingService {
    /// Create a new OutgoingService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn lock_record(
        conn: &mut PgConnection,
        company_id: Uuid,
        record_id: Uuid,
    ) -> AppResult<OutgoingRecord> {
        let sql = format!(
            "SELECT {} FROM outgoing_inventory \
             WHERE id = $1 AND company_id = $2 AND is_active = true FOR UPDATE",
            RECORD_COLUMNS
        );
        sqlx::query_as::<_, OutgoingRecord>(&sql)
            .bind(record_id)
            .bind(company_id)
            .fetch_optional(&mut *conn)
            .await
            .during("outgoing.lock_record", format_args!("record {}", record_id))?
            .ok_or_else(|| AppError::NotFound("Outgoing record".to_string()))
    }

    async fn fetch_items(
        conn: &mut PgConnection,
        company_id: Uuid,
        record_id: Uuid,
    ) -> AppResult<Vec<OutgoingItem>> {
        let sql = format!(
            "SELECT {} FROM outgoing_inventory_items \
             WHERE outgoing_id = $1 AND company_id = $2 ORDER BY created_at, id",
            ITEM_COLUMNS
        );
        let items = sqlx::query_as::<_, OutgoingItem>(&sql)
            .bind(record_id)
            .bind(company_id)
            .fetch_all(&mut *conn)
            .await
            .during("outgoing.fetch_items", format_args!("record {}", record_id))?;
        Ok(items)
    }

    fn with_items(record: OutgoingRecord, items: Vec<OutgoingItem>) -> AppResult<OutgoingRecordWithItems> {
        let moves_stock = record.classification()?.moves_stock();
        Ok(OutgoingRecordWithItems {
            record,
            moves_stock,
            items,
        })
    }

    /// Create a dispatch; stock leaves only if it is created completed
    pub async fn create(
        &self,
        company_id: Uuid,
        user_id: Uuid,
        input: CreateOutgoingInput,
    ) -> AppResult<OutgoingRecordWithItems> {
        input.validate()?;

        let classification = DispatchClassification {
            document_type: input.document_type,
            document_sub_type: input.document_sub_type,
            delivery_challan_sub_type: input.delivery_challan_sub_type,
        };
        let lines = build_lines(&classification, &input.items)?;
        let status = input.status.unwrap_or(RecordStatus::Draft);

        let mut tx = self.db.begin().await?;

        let sku_ids: Vec<Uuid> = lines.iter().map(|l| l.sku_id).collect();
        ensure_skus(&mut tx, company_id, &sku_ids).await?;

        let header = DispatchHeader {
            document_number: input.document_number.trim(),
            document_date: input.document_date,
            classification,
            customer_id: input.customer_id,
            vendor_id: input.vendor_id,
            team_id: input.team_id,
            status,
            remarks: input.remarks.as_deref(),
        };
        let (record, items) = insert_dispatch(&mut tx, company_id, user_id, &header, &lines).await?;

        if status.is_completed() {
            move_stock(&mut tx, &record, &items, StatusTransition::Complete).await?;
        }

        tx.commit().await?;

        tracing::info!(
            record_id = %record.id,
            document_number = %record.document_number,
            status = %record.status,
            items = items.len(),
            "outgoing record created"
        );

        Self::with_items(record, items)
    }

    /// Move a dispatch between draft and completed
    pub async fn update_status(
        &self,
        company_id: Uuid,
        record_id: Uuid,
        new_status: RecordStatus,
    ) -> AppResult<OutgoingRecordWithItems> {
        let mut tx = self.db.begin().await?;

        let record = Self::lock_record(&mut tx, company_id, record_id).await?;
        let transition = record.record_status()?.transition_to(new_status)?;
        let items = Self::fetch_items(&mut tx, company_id, record_id).await?;

        move_stock(&mut tx, &record, &items, transition).await?;

        let sql = format!(
            "UPDATE outgoing_inventory SET status = $1, updated_at = NOW() WHERE id = $2 RETURNING {}",
            RECORD_COLUMNS
        );
        let record = sqlx::query_as::<_, OutgoingRecord>(&sql)
            .bind(new_status.as_str())
            .bind(record_id)
            .fetch_one(&mut *tx)
            .await
            .during("outgoing.update_status", format_args!("record {}", record_id))?;

        tx.commit().await?;

        tracing::info!(record_id = %record_id, status = %new_status, "outgoing status changed");

        Self::with_items(record, items)
    }

    /// Soft-delete a dispatch, restoring stock if it was completed
    pub async fn delete(&self, company_id: Uuid, record_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let record = Self::lock_record(&mut tx, company_id, record_id).await?;
        if record.record_status()?.is_completed() {
            let items = Self::fetch_items(&mut tx, company_id, record_id).await?;
            move_stock(&mut tx, &record, &items, StatusTransition::Revert).await?;
        }

        sqlx::query("UPDATE outgoing_inventory SET is_active = false, updated_at = NOW() WHERE id = $1")
            .bind(record_id)
            .execute(&mut *tx)
            .await
            .during("outgoing.delete", format_args!("record {}", record_id))?;

        tx.commit().await?;

        tracing::info!(record_id = %record_id, "outgoing record deleted");
        Ok(())
    }

    pub async fn get(&self, company_id: Uuid, record_id: Uuid) -> AppResult<OutgoingRecordWithItems> {
        let mut conn = self.db.acquire().await?;

        let sql = format!(
            "SELECT {} FROM outgoing_inventory WHERE id = $1 AND company_id = $2 AND is_active = true",
            RECORD_COLUMNS
        );
        let record = sqlx::query_as::<_, OutgoingRecord>(&sql)
            .bind(record_id)
            .bind(company_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound("Outgoing record".to_string()))?;

        let items = Self::fetch_items(&mut conn, company_id, record_id).await?;
        Self::with_items(record, items)
    }

    pub async fn list(
        &self,
        company_id: Uuid,
        filter: &OutgoingFilter,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<OutgoingRecord>> {
        fn push_filters<'a>(
            qb: &mut QueryBuilder<'a, Postgres>,
            company_id: Uuid,
            filter: &'a OutgoingFilter,
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
            if let Some(customer_id) = filter.customer_id {
                qb.push(" AND customer_id = ").push_bind(customer_id);
            }
            if let Some(vendor_id) = filter.vendor_id {
                qb.push(" AND vendor_id = ").push_bind(vendor_id);
            }
            if let Some(from) = filter.from {
                qb.push(" AND document_date >= ").push_bind(from);
            }
            if let Some(to) = filter.to {
                qb.push(" AND document_date <= ").push_bind(to);
            }
            if let Some(number) = &filter.document_number {
                qb.push(" AND document_number ILIKE ")
                    .push_bind(contains_pattern(number));
            }
        }

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM outgoing_inventory");
        push_filters(&mut count, company_id, filter);
        let (total,) = count
            .build_query_as::<(i64,)>()
            .fetch_one(&self.db)
            .await?;

        let mut page =
            QueryBuilder::<Postgres>::new(format!("SELECT {} FROM outgoing_inventory", RECORD_COLUMNS));
        push_filters(&mut page, company_id, filter);
        page.push(" ORDER BY document_date DESC, created_at DESC LIMIT ")
            .push_bind(pagination.limit())
            .push(" OFFSET ")
            .push_bind(pagination.offset());
        let records = page
            .build_query_as::<OutgoingRecord>()
            .fetch_all(&self.db)
            .await?;

        Ok(PaginatedResponse::new(records, pagination, total.max(0) as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn item(qty: i32, rejected: Option<i32>) -> CreateOutgoingItemInput {
        CreateOutgoingItemInput {
            sku_id: Uuid::new_v4(),
            outgoing_quantity: qty,
            rejected_quantity: rejected,
            unit_price: Decimal::from_str("25.00").unwrap(),
            gst_percentage: Decimal::from(12),
            total_value_incl_gst: None,
        }
    }

    #[test]
    fn test_build_lines_rejected_return() {
        let lines = build_lines(&DispatchClassification::rejected_return(), &[item(10, None)]).unwrap();
        assert_eq!(lines[0].quantities.rejected_quantity, 10);
        assert_eq!(lines[0].value.total_value_incl_gst, Decimal::from_str("280.00").unwrap());
    }

    #[test]
    fn test_build_lines_rejects_bad_quantities() {
        let sale = DispatchClassification {
            document_type: DocumentType::Invoice,
            document_sub_type: Some(DocumentSubType::Regular),
            delivery_challan_sub_type: None,
        };
        assert!(build_lines(&sale, &[item(0, None)]).is_err());
        assert!(matches!(
            build_lines(&sale, &[item(3, Some(4))]),
            Err(AppError::Ledger(_))
        ));
    }

    #[test]
    fn test_claimed_total_is_checked() {
        let mut line = item(2, None);
        line.total_value_incl_gst = Some(Decimal::from(10));
        let result = build_lines(&DispatchClassification::rejected_return(), &[line]);
        assert!(matches!(result, Err(AppError::Ledger(_))));
    }
}
