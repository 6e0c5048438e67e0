//! Rejected-item and short-item reports
//!
//! A rejected-item report is opened for every rejection on a receipt line.
//! Its counters record what happened to the rejected units afterwards:
//! sent back to the vendor, received back into stock, or scrapped.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    next_report_number, plan_withdrawal, validate_positive, CounterUpdate, ItemQuantities,
    PaginatedResponse, Pagination, ReportCounters,
};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult, StorageContext};
use crate::services::contains_pattern;
use crate::services::outgoing::{self, RejectedReturn};
use crate::services::stock_ledger::{self, Movement};

/// Rejected-item report row
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RejectedItemReport {
    pub id: Uuid,
    pub company_id: Uuid,
    pub report_number: String,
    pub original_invoice_number: String,
    pub incoming_id: Uuid,
    pub incoming_item_id: Uuid,
    pub sku_id: Uuid,
    pub vendor_id: Option<Uuid>,
    pub quantity: i32,
    pub sent_to_vendor: i32,
    pub received_back: i32,
    pub scrapped: i32,
    pub net_rejected: i32,
    pub report_date: NaiveDate,
    pub remarks: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RejectedItemReport {
    pub fn counters(&self) -> ReportCounters {
        ReportCounters {
            quantity: self.quantity,
            sent_to_vendor: self.sent_to_vendor,
            received_back: self.received_back,
            scrapped: self.scrapped,
        }
    }
}

const REPORT_COLUMNS: &str = "id, company_id, report_number, original_invoice_number, incoming_id, \
                              incoming_item_id, sku_id, vendor_id, quantity, sent_to_vendor, \
                              received_back, scrapped, net_rejected, report_date, remarks, \
                              created_by, created_at, updated_at";

/// The receipt line a report is opened against
#[derive(Debug, Clone, FromRow)]
pub struct ReportSource {
    pub company_id: Uuid,
    pub incoming_id: Uuid,
    pub incoming_item_id: Uuid,
    pub sku_id: Uuid,
    pub vendor_id: Option<Uuid>,
    pub invoice_number: String,
    pub rejected: i32,
    pub unit_price: Decimal,
    pub gst_percentage: Decimal,
}

/// Input for opening a report by hand
#[derive(Debug, Deserialize, Validate)]
pub struct CreateReportInput {
    pub incoming_item_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    #[validate(length(max = 2000))]
    pub remarks: Option<String>,
}

/// Input for recording what happened to rejected units
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateReportInput {
    #[validate(range(min = 0))]
    pub sent_to_vendor: Option<i32>,
    #[validate(range(min = 0))]
    pub received_back: Option<i32>,
    #[validate(range(min = 0))]
    pub scrapped: Option<i32>,
    /// Date of the outgoing challan created for newly sent units
    pub dispatch_date: Option<NaiveDate>,
    #[validate(length(max = 2000))]
    pub remarks: Option<String>,
}

/// Filters for listing reports
#[derive(Debug, Default, Deserialize)]
pub struct ReportFilter {
    pub invoice_number: Option<String>,
    pub sku_id: Option<Uuid>,
    pub incoming_id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
    /// Only reports with unprocessed units
    #[serde(default)]
    pub open_only: bool,
}

/// Report update result
#[derive(Debug, Serialize)]
pub struct ReportUpdate {
    pub report: RejectedItemReport,
    /// Challan created for units newly sent to the vendor
    pub outgoing_id: Option<Uuid>,
}

/// A receipt line with units still outstanding
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ShortItem {
    pub item_id: Uuid,
    pub incoming_id: Uuid,
    pub invoice_number: String,
    pub receiving_date: NaiveDate,
    pub vendor_id: Option<Uuid>,
    pub sku_id: Uuid,
    pub total_quantity: i32,
    pub received: i32,
    pub short: i32,
    pub rejected: i32,
    #[sqlx(skip)]
    pub initial_short: i64,
    #[sqlx(skip)]
    pub arrived_short: i64,
}

impl ShortItem {
    fn with_arrivals(mut self) -> Self {
        let q = ItemQuantities {
            total_quantity: self.total_quantity,
            received: self.received,
            short: self.short,
            rejected: self.rejected,
        };
        self.initial_short = q.initial_short();
        self.arrived_short = q.arrived_short();
        self
    }
}

/// Lock a receipt line and load what a report needs from it
pub async fn lock_source(
    conn: &mut PgConnection,
    company_id: Uuid,
    incoming_item_id: Uuid,
) -> AppResult<ReportSource> {
    sqlx::query_as::<_, ReportSource>(
        r#"
        SELECT i.company_id, i.incoming_id, i.id AS incoming_item_id, i.sku_id, r.vendor_id,
               r.invoice_number, i.rejected, i.unit_price, i.gst_percentage
        FROM incoming_inventory_items i
        JOIN incoming_inventory r ON r.id = i.incoming_id
        WHERE i.id = $1 AND i.company_id = $2 AND r.is_active = true
        FOR UPDATE OF i
        "#,
    )
    .bind(incoming_item_id)
    .bind(company_id)
    .fetch_optional(&mut *conn)
    .await
    .during("rejected_report.lock_source", format_args!("item {}", incoming_item_id))?
    .ok_or_else(|| AppError::NotFound("Incoming item".to_string()))
}

/// Open a report for `quantity` rejected units.
///
/// The report number is allocated under a per-invoice advisory lock so two
/// rejections on the same invoice cannot draw the same sequence.
pub async fn open(
    conn: &mut PgConnection,
    source: &ReportSource,
    quantity: i32,
    remarks: Option<&str>,
    created_by: Option<Uuid>,
) -> AppResult<RejectedItemReport> {
    validate_positive("quantity", quantity)?;

    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(format!("rej:{}:{}", source.company_id, source.invoice_number))
        .execute(&mut *conn)
        .await
        .during("rejected_report.lock_sequence", &source.invoice_number)?;

    let existing = sqlx::query_scalar::<_, String>(
        r#"
        SELECT report_number FROM rejected_item_reports
        WHERE company_id = $1 AND original_invoice_number = $2
        "#,
    )
    .bind(source.company_id)
    .bind(&source.invoice_number)
    .fetch_all(&mut *conn)
    .await
    .during("rejected_report.scan_numbers", &source.invoice_number)?;

    let report_number =
        next_report_number(&source.invoice_number, existing.iter().map(String::as_str));

    let sql = format!(
        r#"
        INSERT INTO rejected_item_reports (
            company_id, report_number, original_invoice_number, incoming_id, incoming_item_id,
            sku_id, vendor_id, quantity, net_rejected, remarks, created_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, $9, $10)
        RETURNING {}
        "#,
        REPORT_COLUMNS
    );
    let report = sqlx::query_as::<_, RejectedItemReport>(&sql)
        .bind(source.company_id)
        .bind(&report_number)
        .bind(&source.invoice_number)
        .bind(source.incoming_id)
        .bind(source.incoming_item_id)
        .bind(source.sku_id)
        .bind(source.vendor_id)
        .bind(quantity)
        .bind(remarks)
        .bind(created_by)
        .fetch_one(&mut *conn)
        .await
        .during("rejected_report.insert", &report_number)?;

    tracing::info!(
        report_number = %report.report_number,
        item_id = %source.incoming_item_id,
        quantity,
        "rejected-item report opened"
    );

    Ok(report)
}

/// Take `amount` units back out of the newest open reports of a line
pub async fn withdraw(
    conn: &mut PgConnection,
    company_id: Uuid,
    incoming_item_id: Uuid,
    amount: i32,
) -> AppResult<()> {
    let sql = format!(
        r#"
        SELECT {} FROM rejected_item_reports
        WHERE company_id = $1 AND incoming_item_id = $2
        ORDER BY created_at DESC, report_number DESC
        FOR UPDATE
        "#,
        REPORT_COLUMNS
    );
    let reports = sqlx::query_as::<_, RejectedItemReport>(&sql)
        .bind(company_id)
        .bind(incoming_item_id)
        .fetch_all(&mut *conn)
        .await
        .during("rejected_report.lock_item_reports", format_args!("item {}", incoming_item_id))?;

    let counters: Vec<(Uuid, ReportCounters)> =
        reports.iter().map(|r| (r.id, r.counters())).collect();
    let plan = plan_withdrawal(&counters, amount)?;

    for (report_id, quantity) in plan {
        sqlx::query(
            r#"
            UPDATE rejected_item_reports
            SET quantity = $1,
                net_rejected = GREATEST(0, $1 - sent_to_vendor - received_back - scrapped),
                updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(quantity)
        .bind(report_id)
        .execute(&mut *conn)
        .await
        .during("rejected_report.shrink", format_args!("report {}", report_id))?;
    }

    tracing::info!(item_id = %incoming_item_id, amount, "rejected units withdrawn from reports");
    Ok(())
}

/// Keep the reports of a line in step with a change of its rejected units
pub async fn sync_rejection(
    conn: &mut PgConnection,
    source: &ReportSource,
    rejected_diff: i32,
    created_by: Option<Uuid>,
) -> AppResult<Option<RejectedItemReport>> {
    if rejected_diff > 0 {
        open(conn, source, rejected_diff, None, created_by).await.map(Some)
    } else if rejected_diff < 0 {
        withdraw(conn, source.company_id, source.incoming_item_id, -rejected_diff).await?;
        Ok(None)
    } else {
        Ok(None)
    }
}

/// Report service for handlers
#[derive(Clone)]
pub struct RejectedReportService {
    db: PgPool,
}

impl RejectedReportService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Open a report for rejected units not yet covered by any report
    pub async fn create(
        &self,
        company_id: Uuid,
        user_id: Uuid,
        input: CreateReportInput,
    ) -> AppResult<RejectedItemReport> {
        input.validate()?;

        let mut tx = self.db.begin().await?;

        let source = lock_source(&mut tx, company_id, input.incoming_item_id).await?;

        let reported = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(SUM(quantity), 0)::BIGINT FROM rejected_item_reports
            WHERE company_id = $1 AND incoming_item_id = $2
            "#,
        )
        .bind(company_id)
        .bind(input.incoming_item_id)
        .fetch_one(&mut *tx)
        .await?;

        let unreported = i64::from(source.rejected) - reported;
        if i64::from(input.quantity) > unreported {
            return Err(AppError::validation(
                "quantity",
                format!(
                    "Only {} rejected units of this item are not yet reported",
                    unreported.max(0)
                ),
            ));
        }

        let report = open(
            &mut tx,
            &source,
            input.quantity,
            input.remarks.as_deref(),
            Some(user_id),
        )
        .await?;

        tx.commit().await?;
        Ok(report)
    }

    /// Advance the counters of a report and move the affected stock
    pub async fn update(
        &self,
        company_id: Uuid,
        user_id: Uuid,
        report_id: Uuid,
        input: UpdateReportInput,
    ) -> AppResult<ReportUpdate> {
        input.validate()?;

        let mut tx = self.db.begin().await?;

        // Receipt line before report, the same order corrections lock in
        let item_id = sqlx::query_scalar::<_, Uuid>(
            "SELECT incoming_item_id FROM rejected_item_reports WHERE id = $1 AND company_id = $2",
        )
        .bind(report_id)
        .bind(company_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Rejected item report".to_string()))?;
        let source = lock_source(&mut tx, company_id, item_id).await?;

        let sql = format!(
            "SELECT {} FROM rejected_item_reports WHERE id = $1 AND company_id = $2 FOR UPDATE",
            REPORT_COLUMNS
        );
        let existing = sqlx::query_as::<_, RejectedItemReport>(&sql)
            .bind(report_id)
            .bind(company_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Rejected item report".to_string()))?;

        let change = existing.counters().apply(&CounterUpdate {
            sent_to_vendor: input.sent_to_vendor,
            received_back: input.received_back,
            scrapped: input.scrapped,
        })?;
        let after = change.after;

        let sql = format!(
            r#"
            UPDATE rejected_item_reports
            SET sent_to_vendor = $1, received_back = $2, scrapped = $3, net_rejected = $4,
                remarks = COALESCE($5, remarks), updated_at = NOW()
            WHERE id = $6
            RETURNING {}
            "#,
            REPORT_COLUMNS
        );
        let report = sqlx::query_as::<_, RejectedItemReport>(&sql)
            .bind(after.sent_to_vendor)
            .bind(after.received_back)
            .bind(after.scrapped)
            .bind(after.net_rejected())
            .bind(&input.remarks)
            .bind(report_id)
            .fetch_one(&mut *tx)
            .await
            .during("rejected_report.update", &existing.report_number)?;

        let mut outgoing_id = None;
        if change.sent_to_vendor_delta > 0 {
            let dispatch = outgoing::insert_rejected_return(
                &mut tx,
                &RejectedReturn {
                    company_id,
                    created_by: user_id,
                    report_id: report.id,
                    report_number: report.report_number.clone(),
                    vendor_id: report.vendor_id,
                    sku_id: report.sku_id,
                    quantity: change.sent_to_vendor_delta,
                    unit_price: source.unit_price,
                    gst_percentage: source.gst_percentage,
                    document_date: input
                        .dispatch_date
                        .unwrap_or_else(|| Utc::now().date_naive()),
                },
            )
            .await?;
            outgoing_id = Some(dispatch);
        }

        if change.received_back_delta > 0 {
            stock_ledger::apply(
                &mut tx,
                company_id,
                report.sku_id,
                change.received_back_delta,
                Movement::ReceivedBack,
                report.incoming_id,
            )
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            report_number = %report.report_number,
            sent_to_vendor = change.sent_to_vendor_delta,
            received_back = change.received_back_delta,
            scrapped = change.scrapped_delta,
            net_rejected = report.net_rejected,
            "rejected-item report updated"
        );

        Ok(ReportUpdate {
            report,
            outgoing_id,
        })
    }

    pub async fn get(&self, company_id: Uuid, report_id: Uuid) -> AppResult<RejectedItemReport> {
        let sql = format!(
            "SELECT {} FROM rejected_item_reports WHERE id = $1 AND company_id = $2",
            REPORT_COLUMNS
        );
        sqlx::query_as::<_, RejectedItemReport>(&sql)
            .bind(report_id)
            .bind(company_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Rejected item report".to_string()))
    }

    pub async fn list(
        &self,
        company_id: Uuid,
        filter: &ReportFilter,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<RejectedItemReport>> {
        fn push_filters<'a>(
            qb: &mut QueryBuilder<'a, Postgres>,
            company_id: Uuid,
            filter: &'a ReportFilter,
        ) {
            qb.push(" WHERE company_id = ").push_bind(company_id);
            if let Some(invoice) = &filter.invoice_number {
                qb.push(" AND original_invoice_number ILIKE ")
                    .push_bind(contains_pattern(invoice));
            }
            if let Some(sku_id) = filter.sku_id {
                qb.push(" AND sku_id = ").push_bind(sku_id);
            }
            if let Some(incoming_id) = filter.incoming_id {
                qb.push(" AND incoming_id = ").push_bind(incoming_id);
            }
            if let Some(vendor_id) = filter.vendor_id {
                qb.push(" AND vendor_id = ").push_bind(vendor_id);
            }
            if filter.open_only {
                qb.push(" AND net_rejected > 0");
            }
        }

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM rejected_item_reports");
        push_filters(&mut count, company_id, filter);
        let (total,) = count
            .build_query_as::<(i64,)>()
            .fetch_one(&self.db)
            .await?;

        let mut page = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM rejected_item_reports",
            REPORT_COLUMNS
        ));
        push_filters(&mut page, company_id, filter);
        page.push(" ORDER BY report_date DESC, report_number DESC LIMIT ")
            .push_bind(pagination.limit())
            .push(" OFFSET ")
            .push_bind(pagination.offset());
        let reports = page
            .build_query_as::<RejectedItemReport>()
            .fetch_all(&self.db)
            .await?;

        Ok(PaginatedResponse::new(reports, pagination, total.max(0) as u64))
    }

    /// Receipt lines that still have units outstanding
    pub async fn list_short_items(
        &self,
        company_id: Uuid,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<ShortItem>> {
        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM incoming_inventory_items i
            JOIN incoming_inventory r ON r.id = i.incoming_id
            WHERE i.company_id = $1 AND r.is_active = true AND i.short > 0
            "#,
        )
        .bind(company_id)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, ShortItem>(
            r#"
            SELECT i.id AS item_id, i.incoming_id, r.invoice_number, r.receiving_date, r.vendor_id,
                   i.sku_id, i.total_quantity, i.received, i.short, i.rejected
            FROM incoming_inventory_items i
            JOIN incoming_inventory r ON r.id = i.incoming_id
            WHERE i.company_id = $1 AND r.is_active = true AND i.short > 0
            ORDER BY r.receiving_date DESC, i.id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(company_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let items = rows.into_iter().map(ShortItem::with_arrivals).collect();
        Ok(PaginatedResponse::new(items, pagination, total.max(0) as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_item_arrivals() {
        let item = ShortItem {
            item_id: Uuid::nil(),
            incoming_id: Uuid::nil(),
            invoice_number: "INV-9".to_string(),
            receiving_date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            vendor_id: None,
            sku_id: Uuid::nil(),
            total_quantity: 100,
            received: 80,
            short: 5,
            rejected: 0,
            initial_short: 0,
            arrived_short: 0,
        }
        .with_arrivals();
        assert_eq!(item.initial_short, 20);
        assert_eq!(item.arrived_short, 15);
    }
}
