use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::guards::AuthUser;
use crate::models::user::{ProfilePatch, UserProfile};
use crate::routes::Pagination;
use crate::services::user_service::{UserService, UserWithPreview};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListUsersParams {
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListUsersResponse {
    pub users: Vec<UserWithPreview>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: UserProfile,
}

/// Directory of everyone except the caller, with an optional search
/// filter over username and email.
pub async fn list_users(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<ListUsersParams>,
) -> AppResult<Json<ListUsersResponse>> {
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(20).clamp(1, 100);

    let (users, total) =
        UserService::list(&state.db, user.id, params.search.as_deref(), page, limit).await?;

    Ok(Json(ListUsersResponse {
        users,
        pagination: Pagination::new(page, limit, total),
    }))
}

pub async fn get_user(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<UserResponse>> {
    let user = UserService::get_by_id(&state.db, user_id).await?;
    Ok(Json(UserResponse { user: user.into() }))
}

pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(patch): Json<ProfilePatch>,
) -> AppResult<Json<UserResponse>> {
    let updated = UserService::update_profile(&state.db, user.id, patch).await?;
    Ok(Json(UserResponse {
        user: updated.into(),
    }))
}
