//! Company and permission API endpoints

use api_types::company::{CompanyNew, CompanyPatch, CompanyView, UserCompanies};
use axum::{
    Extension, Json,
    extract::{Path, State},
};
use engine::Principal;
use uuid::Uuid;

use crate::{ServerError, convert::company_view, server::ServerState};

pub async fn list(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
) -> Result<Json<Vec<CompanyView>>, ServerError> {
    let companies = state.engine.list_companies(&principal).await?;
    Ok(Json(companies.into_iter().map(company_view).collect()))
}

pub async fn create(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Json(payload): Json<CompanyNew>,
) -> Result<Json<CompanyView>, ServerError> {
    let company = state
        .engine
        .create_company(&principal, &payload.name, payload.tax_id.as_deref())
        .await?;
    Ok(Json(company_view(company)))
}

pub async fn patch(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CompanyPatch>,
) -> Result<Json<CompanyView>, ServerError> {
    let company = state
        .engine
        .set_company_active(&principal, id, payload.active)
        .await?;
    Ok(Json(company_view(company)))
}

pub async fn user_companies(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<CompanyView>>, ServerError> {
    let companies = state.engine.user_companies(&principal, user_id).await?;
    Ok(Json(companies.into_iter().map(company_view).collect()))
}

/// Replace the whole permission set of a user.
pub async fn set_user_companies(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<UserCompanies>,
) -> Result<Json<Vec<CompanyView>>, ServerError> {
    let companies = state
        .engine
        .set_user_companies(&principal, user_id, payload.company_ids)
        .await?;
    Ok(Json(companies.into_iter().map(company_view).collect()))
}
