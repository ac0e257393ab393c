//! Advance API endpoints

use api_types::{
    ActionResponse, SettlementResponse,
    advance::{AdvanceNew, AdvanceQuery, AdvanceTransfer, AdvanceView},
};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use engine::{AdvanceListFilter, AdvanceStatus, NewAdvanceCmd, Principal, TransferInfo};
use uuid::Uuid;

use crate::{
    ServerError,
    convert::{advance_view, parse_amount, parse_status},
    server::ServerState,
};

pub async fn create(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Json(payload): Json<AdvanceNew>,
) -> Result<Json<AdvanceView>, ServerError> {
    let cmd = NewAdvanceCmd {
        user_id: payload.user_id,
        company_id: payload.company_id,
        amount: parse_amount(&payload.amount)?,
        description: payload.description,
    };
    let advance = state.engine.create_manual_advance(&principal, cmd).await?;
    Ok(Json(advance_view(advance)))
}

pub async fn list(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Query(query): Query<AdvanceQuery>,
) -> Result<Json<Vec<AdvanceView>>, ServerError> {
    let filter = AdvanceListFilter {
        status: parse_status::<AdvanceStatus>(query.status.as_deref())?,
        user_id: query.user_id,
        company_id: query.company_id,
    };
    let advances = state.engine.list_advances(&principal, filter).await?;
    Ok(Json(advances.into_iter().map(advance_view).collect()))
}

pub async fn get(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AdvanceView>, ServerError> {
    let advance = state.engine.advance(&principal, id).await?;
    Ok(Json(advance_view(advance)))
}

/// The body is optional: an empty POST transfers without bank metadata.
pub async fn transfer(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
    payload: Option<Json<AdvanceTransfer>>,
) -> Result<Json<ActionResponse>, ServerError> {
    let payload = payload.map(|Json(payload)| payload).unwrap_or_default();
    let info = TransferInfo {
        transfer_number: payload.transfer_number,
        transfer_date: payload.transfer_date,
    };
    let advance = state.engine.transfer_advance(&principal, id, info).await?;
    Ok(Json(ActionResponse::ok(format!(
        "Advance of {} transferred",
        advance.amount.display_pln()
    ))))
}

pub async fn settle(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SettlementResponse>, ServerError> {
    let outcome = state.engine.settle_advance(&principal, id).await?;
    Ok(Json(SettlementResponse {
        success: true,
        message: format!(
            "Advance settled, {} linked invoice(s) closed",
            outcome.settled_invoice_ids.len()
        ),
        linked_invoice_ids: outcome.settled_invoice_ids,
    }))
}
