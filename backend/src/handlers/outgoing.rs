//! HTTP handlers for outgoing inventory endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{PaginatedResponse, Pagination};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::{auth::INVENTORY, auth::READ, auth::WRITE, CurrentUser};
use crate::services::outgoing::{
    CreateOutgoingInput, OutgoingFilter, OutgoingRecord, OutgoingRecordWithItems, OutgoingService,
};
use crate::services::UpdateStatusInput;
use crate::AppState;

/// Record a dispatch
pub async fn create_outgoing(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateOutgoingInput>,
) -> AppResult<(StatusCode, Json<OutgoingRecordWithItems>)> {
    user.require(INVENTORY, WRITE)?;
    let service = OutgoingService::new(state.db);
    let record = service.create(user.company_id, user.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn list_outgoing(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<OutgoingFilter>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<OutgoingRecord>>> {
    user.require(INVENTORY, READ)?;
    let service = OutgoingService::new(state.db);
    let page = service.list(user.company_id, &filter, pagination).await?;
    Ok(Json(page))
}

pub async fn get_outgoing(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(record_id): Path<Uuid>,
) -> AppResult<Json<OutgoingRecordWithItems>> {
    user.require(INVENTORY, READ)?;
    let service = OutgoingService::new(state.db);
    Ok(Json(service.get(user.company_id, record_id).await?))
}

/// Complete a draft dispatch or revert a completed one
pub async fn update_outgoing_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(record_id): Path<Uuid>,
    Json(input): Json<UpdateStatusInput>,
) -> AppResult<Json<OutgoingRecordWithItems>> {
    user.require(INVENTORY, WRITE)?;
    let service = OutgoingService::new(state.db);
    let record = service
        .update_status(user.company_id, record_id, input.status)
        .await?;
    Ok(Json(record))
}

pub async fn delete_outgoing(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(record_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.require(INVENTORY, WRITE)?;
    let service = OutgoingService::new(state.db);
    service.delete(user.company_id, record_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
