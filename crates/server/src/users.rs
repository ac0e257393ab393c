//! User profile endpoints

use api_types::user::UserView;
use axum::{
    Extension, Json,
    extract::{Path, State},
};
use engine::Principal;
use uuid::Uuid;

use crate::{ServerError, convert::user_view, server::ServerState};

/// Profile and balance of the authenticated user.
pub async fn me(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
) -> Result<Json<UserView>, ServerError> {
    let user = state.engine.me(&principal).await?;
    Ok(Json(user_view(user)))
}

pub async fn list(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
) -> Result<Json<Vec<UserView>>, ServerError> {
    let users = state.engine.list_users(&principal).await?;
    Ok(Json(users.into_iter().map(user_view).collect()))
}

pub async fn get(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserView>, ServerError> {
    let user = state.engine.user(&principal, id).await?;
    Ok(Json(user_view(user)))
}
