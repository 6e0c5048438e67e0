//! HTTP handlers for rejected-item and short-item reports

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{PaginatedResponse, Pagination};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::{auth::INVENTORY, auth::READ, auth::WRITE, CurrentUser};
use crate::services::rejected_report::{
    CreateReportInput, RejectedItemReport, RejectedReportService, ReportFilter, ReportUpdate,
    ShortItem, UpdateReportInput,
};
use crate::AppState;

/// Open a report for rejected units not yet reported
pub async fn create_report(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateReportInput>,
) -> AppResult<(StatusCode, Json<RejectedItemReport>)> {
    user.require(INVENTORY, WRITE)?;
    let service = RejectedReportService::new(state.db);
    let report = service.create(user.company_id, user.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

pub async fn list_reports(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<ReportFilter>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<RejectedItemReport>>> {
    user.require(INVENTORY, READ)?;
    let service = RejectedReportService::new(state.db);
    let page = service.list(user.company_id, &filter, pagination).await?;
    Ok(Json(page))
}

pub async fn get_report(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(report_id): Path<Uuid>,
) -> AppResult<Json<RejectedItemReport>> {
    user.require(INVENTORY, READ)?;
    let service = RejectedReportService::new(state.db);
    Ok(Json(service.get(user.company_id, report_id).await?))
}

/// Record units sent to the vendor, received back or scrapped
pub async fn update_report(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(report_id): Path<Uuid>,
    Json(input): Json<UpdateReportInput>,
) -> AppResult<Json<ReportUpdate>> {
    user.require(INVENTORY, WRITE)?;
    let service = RejectedReportService::new(state.db);
    let update = service
        .update(user.company_id, user.user_id, report_id, input)
        .await?;
    Ok(Json(update))
}

/// Receipt lines with units still short
pub async fn list_short_items(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<ShortItem>>> {
    user.require(INVENTORY, READ)?;
    let service = RejectedReportService::new(state.db);
    let page = service
        .list_short_items(user.company_id, pagination)
        .await?;
    Ok(Json(page))
}
