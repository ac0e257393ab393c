//! Balance ledger API endpoints

use api_types::ledger::{BalanceChange, LedgerEntryView, LedgerReportView};
use axum::{
    Extension, Json,
    extract::{Path, State},
};
use engine::Principal;
use uuid::Uuid;

use crate::{
    ServerError,
    convert::{ledger_entry_view, ledger_report_view, parse_amount},
    server::ServerState,
};

pub async fn history(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<LedgerEntryView>>, ServerError> {
    let entries = state.engine.ledger_history(&principal, user_id).await?;
    Ok(Json(entries.into_iter().map(ledger_entry_view).collect()))
}

pub async fn verify(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<LedgerReportView>, ServerError> {
    let report = state.engine.verify_ledger(&principal, user_id).await?;
    Ok(Json(ledger_report_view(report)))
}

pub async fn top_up(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<BalanceChange>,
) -> Result<Json<LedgerEntryView>, ServerError> {
    let amount = parse_amount(&payload.amount)?;
    let entry = state
        .engine
        .top_up(&principal, user_id, amount, payload.notes.as_deref())
        .await?;
    Ok(Json(ledger_entry_view(entry)))
}

pub async fn adjust(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<BalanceChange>,
) -> Result<Json<LedgerEntryView>, ServerError> {
    let amount = parse_amount(&payload.amount)?;
    let entry = state
        .engine
        .adjust_balance(
            &principal,
            user_id,
            amount,
            payload.notes.as_deref().unwrap_or_default(),
        )
        .await?;
    Ok(Json(ledger_entry_view(entry)))
}
