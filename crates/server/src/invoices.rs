//! Invoice API endpoints

use api_types::{
    ActionResponse,
    invoice::{InvoiceNew, InvoiceQuery, InvoiceReview, InvoiceView},
};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use engine::{InvoiceListFilter, InvoiceStatus, InvoiceType, NewInvoiceCmd, Principal};
use uuid::Uuid;

use crate::{
    ServerError,
    convert::{invoice_view, parse_amount, parse_status, review_action},
    server::ServerState,
};

pub async fn create(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Json(payload): Json<InvoiceNew>,
) -> Result<Json<InvoiceView>, ServerError> {
    let invoice_type = match payload.invoice_type.as_deref() {
        Some(raw) => InvoiceType::try_from(raw)?,
        None => InvoiceType::Einvoice,
    };
    let mut cmd = NewInvoiceCmd::new(
        payload.company_id,
        payload.invoice_number,
        parse_amount(&payload.amount)?,
        payload.image_key,
    )
    .invoice_type(invoice_type);
    cmd.original_invoice_id = payload.original_invoice_id;
    cmd.advance_id = payload.advance_id;
    cmd.budget_request_id = payload.budget_request_id;
    cmd.ksef_number = payload.ksef_number;
    cmd.description = payload.description;
    cmd.justification = payload.justification;

    let invoice = state.engine.create_invoice(&principal, cmd).await?;
    Ok(Json(invoice_view(invoice)))
}

pub async fn list(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Query(query): Query<InvoiceQuery>,
) -> Result<Json<Vec<InvoiceView>>, ServerError> {
    let filter = InvoiceListFilter {
        status: parse_status::<InvoiceStatus>(query.status.as_deref())?,
        user_id: query.user_id,
        company_id: query.company_id,
        advance_id: query.advance_id,
        budget_request_id: query.budget_request_id,
    };
    let invoices = state.engine.list_invoices(&principal, filter).await?;
    Ok(Json(invoices.into_iter().map(invoice_view).collect()))
}

pub async fn get(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
) -> Result<Json<InvoiceView>, ServerError> {
    let invoice = state.engine.invoice(&principal, id).await?;
    Ok(Json(invoice_view(invoice)))
}

pub async fn start_review(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
) -> Result<Json<InvoiceView>, ServerError> {
    let invoice = state.engine.start_invoice_review(&principal, id).await?;
    Ok(Json(invoice_view(invoice)))
}

pub async fn review(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<InvoiceReview>,
) -> Result<Json<InvoiceView>, ServerError> {
    let invoice = state
        .engine
        .review_invoice(
            &principal,
            id,
            review_action(payload.action),
            payload.rejection_reason.as_deref(),
        )
        .await?;
    Ok(Json(invoice_view(invoice)))
}

pub async fn transfer(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
) -> Result<Json<InvoiceView>, ServerError> {
    let invoice = state.engine.mark_invoice_transferred(&principal, id).await?;
    Ok(Json(invoice_view(invoice)))
}

pub async fn delete(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionResponse>, ServerError> {
    state.engine.delete_invoice(&principal, id).await?;
    Ok(Json(ActionResponse::ok("Invoice deleted")))
}
