//! Invoice deletion request API endpoints

use api_types::{
    ActionResponse,
    deletion_request::{
        DeletionRequestCreated, DeletionRequestNew, DeletionRequestQuery, DeletionRequestReview,
        DeletionRequestView,
    },
};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use engine::{DeletionRequestListFilter, DeletionRequestStatus, Principal};
use uuid::Uuid;

use crate::{
    ServerError,
    convert::{deletion_request_view, parse_status, review_action},
    server::ServerState,
};

pub async fn create(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Json(payload): Json<DeletionRequestNew>,
) -> Result<Json<DeletionRequestCreated>, ServerError> {
    let request = state
        .engine
        .create_deletion_request(&principal, payload.invoice_id, &payload.reason)
        .await?;
    Ok(Json(DeletionRequestCreated {
        success: true,
        request_id: request.id,
    }))
}

pub async fn list(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Query(query): Query<DeletionRequestQuery>,
) -> Result<Json<Vec<DeletionRequestView>>, ServerError> {
    let filter = DeletionRequestListFilter {
        status: parse_status::<DeletionRequestStatus>(query.status.as_deref())?,
        invoice_id: query.invoice_id,
    };
    let requests = state.engine.list_deletion_requests(&principal, filter).await?;
    Ok(Json(requests.into_iter().map(deletion_request_view).collect()))
}

pub async fn get(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletionRequestView>, ServerError> {
    let request = state.engine.deletion_request(&principal, id).await?;
    Ok(Json(deletion_request_view(request)))
}

pub async fn review(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DeletionRequestReview>,
) -> Result<Json<ActionResponse>, ServerError> {
    let request = state
        .engine
        .review_deletion_request(
            &principal,
            id,
            review_action(payload.action),
            payload.rejection_reason.as_deref(),
            &payload.admin_password,
        )
        .await?;
    let message = match request.status {
        DeletionRequestStatus::Approved => "Deletion request approved, invoice deleted",
        _ => "Deletion request rejected",
    };
    Ok(Json(ActionResponse::ok(message)))
}
