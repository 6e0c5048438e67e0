//! HTTP handlers for incoming inventory endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{PaginatedResponse, Pagination};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::{auth::INVENTORY, auth::READ, auth::WRITE, CurrentUser};
use crate::services::incoming::{
    CorrectionResult, CreateIncomingInput, IncomingFilter, IncomingRecord, IncomingRecordWithItems,
    IncomingService, MoveQuantityInput, UpdateRejectedShortInput,
};
use crate::services::UpdateStatusInput;
use crate::AppState;

/// Record a receipt
pub async fn create_incoming(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateIncomingInput>,
) -> AppResult<(StatusCode, Json<IncomingRecordWithItems>)> {
    user.require(INVENTORY, WRITE)?;
    let service = IncomingService::new(state.db);
    let record = service.create(user.company_id, user.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// List receipts
pub async fn list_incoming(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<IncomingFilter>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<IncomingRecord>>> {
    user.require(INVENTORY, READ)?;
    let service = IncomingService::new(state.db);
    let page = service.list(user.company_id, &filter, pagination).await?;
    Ok(Json(page))
}

pub async fn get_incoming(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(record_id): Path<Uuid>,
) -> AppResult<Json<IncomingRecordWithItems>> {
    user.require(INVENTORY, READ)?;
    let service = IncomingService::new(state.db);
    Ok(Json(service.get(user.company_id, record_id).await?))
}

/// Complete a draft receipt or revert a completed one
pub async fn update_incoming_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(record_id): Path<Uuid>,
    Json(input): Json<UpdateStatusInput>,
) -> AppResult<Json<IncomingRecordWithItems>> {
    user.require(INVENTORY, WRITE)?;
    let service = IncomingService::new(state.db);
    let record = service
        .update_status(user.company_id, record_id, input.status)
        .await?;
    Ok(Json(record))
}

pub async fn delete_incoming(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(record_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.require(INVENTORY, WRITE)?;
    let service = IncomingService::new(state.db);
    service.delete(user.company_id, record_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Correct the rejected and/or short quantity of a line
pub async fn update_rejected_short(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((record_id, item_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<UpdateRejectedShortInput>,
) -> AppResult<Json<CorrectionResult>> {
    user.require(INVENTORY, WRITE)?;
    let service = IncomingService::new(state.db);
    let result = service
        .update_rejected_short(user.company_id, user.user_id, record_id, item_id, input)
        .await?;
    Ok(Json(result))
}

pub async fn move_received_to_rejected(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((record_id, item_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<MoveQuantityInput>,
) -> AppResult<Json<CorrectionResult>> {
    user.require(INVENTORY, WRITE)?;
    let service = IncomingService::new(state.db);
    let result = service
        .move_received_to_rejected(user.company_id, user.user_id, record_id, item_id, input)
        .await?;
    Ok(Json(result))
}

pub async fn move_short_to_rejected(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((record_id, item_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<MoveQuantityInput>,
) -> AppResult<Json<CorrectionResult>> {
    user.require(INVENTORY, WRITE)?;
    let service = IncomingService::new(state.db);
    let result = service
        .move_short_to_rejected(user.company_id, user.user_id, record_id, item_id, input)
        .await?;
    Ok(Json(result))
}
