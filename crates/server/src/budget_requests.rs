//! Budget request API endpoints

use api_types::{
    ActionResponse, SettlementResponse,
    budget_request::{
        BudgetRequestCreated, BudgetRequestNew, BudgetRequestQuery, BudgetRequestReview,
        BudgetRequestReviewResponse, BudgetRequestView, BulkDelete, BulkDeleteResponse,
        TransferConfirm,
    },
};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use engine::{
    BudgetRequestBulkFilter, BudgetRequestListFilter, BudgetRequestStatus, NewBudgetRequestCmd,
    Principal, TransferInfo,
};
use uuid::Uuid;

use crate::{
    ServerError,
    convert::{budget_request_view, parse_amount, parse_status, review_action},
    server::ServerState,
};

/// Handle requests for filing a budget request.
pub async fn create(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Json(payload): Json<BudgetRequestNew>,
) -> Result<Json<BudgetRequestCreated>, ServerError> {
    let amount = parse_amount(&payload.requested_amount)?;
    let request = state
        .engine
        .create_budget_request(
            &principal,
            NewBudgetRequestCmd::new(payload.company_id, amount, payload.justification),
        )
        .await?;
    Ok(Json(BudgetRequestCreated {
        request_id: request.id,
    }))
}

pub async fn list(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Query(query): Query<BudgetRequestQuery>,
) -> Result<Json<Vec<BudgetRequestView>>, ServerError> {
    let filter = BudgetRequestListFilter {
        status: parse_status::<BudgetRequestStatus>(query.status.as_deref())?,
        user_id: query.user_id,
        company_id: query.company_id,
    };
    let requests = state.engine.list_budget_requests(&principal, filter).await?;
    Ok(Json(requests.into_iter().map(budget_request_view).collect()))
}

pub async fn get(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BudgetRequestView>, ServerError> {
    let request = state.engine.budget_request(&principal, id).await?;
    Ok(Json(budget_request_view(request)))
}

pub async fn review(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<BudgetRequestReview>,
) -> Result<Json<BudgetRequestReviewResponse>, ServerError> {
    let review = state
        .engine
        .review_budget_request(
            &principal,
            id,
            review_action(payload.action),
            payload.rejection_reason.as_deref(),
        )
        .await?;
    Ok(Json(BudgetRequestReviewResponse {
        success: true,
        message: review.message,
        advance_id: review.advance.map(|advance| advance.id),
    }))
}

pub async fn confirm_transfer(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransferConfirm>,
) -> Result<Json<ActionResponse>, ServerError> {
    let mut info = TransferInfo::number(payload.transfer_number);
    if let Some(date) = payload.transfer_date {
        info = info.date(date);
    }
    let request = state
        .engine
        .confirm_budget_request_transfer(&principal, id, info)
        .await?;
    Ok(Json(ActionResponse::ok(format!(
        "Transfer of {} confirmed",
        request.requested_amount.display_pln()
    ))))
}

pub async fn settle(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SettlementResponse>, ServerError> {
    let outcome = state.engine.settle_budget_request(&principal, id).await?;
    Ok(Json(SettlementResponse {
        success: true,
        message: format!(
            "Budget request settled, {} linked invoice(s) closed",
            outcome.settled_invoice_ids.len()
        ),
        linked_invoice_ids: outcome.settled_invoice_ids,
    }))
}

pub async fn cancel(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionResponse>, ServerError> {
    state.engine.cancel_budget_request(&principal, id).await?;
    Ok(Json(ActionResponse::ok("Budget request cancelled")))
}

pub async fn bulk_delete(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Json(payload): Json<BulkDelete>,
) -> Result<Json<BulkDeleteResponse>, ServerError> {
    let filters = payload.filters;
    let statuses = filters
        .statuses
        .map(|statuses| {
            statuses
                .iter()
                .map(|status| BudgetRequestStatus::try_from(status.as_str()))
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?;
    let filter = BudgetRequestBulkFilter {
        statuses,
        user_id: filters.user_id,
        created_from: filters.created_from,
        created_to: filters.created_to,
        older_than_days: filters.older_than_days,
    };
    let deleted_count = state
        .engine
        .bulk_delete_budget_requests(&principal, filter, &payload.admin_password)
        .await?;
    Ok(Json(BulkDeleteResponse { deleted_count }))
}
