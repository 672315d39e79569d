//! Staff account management endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::staff::{StaffForm, StaffUpdate},
};

use super::{auth::StaffInfo, AuthenticatedUser, FormJson, MessageResponse};

#[derive(Serialize, ToSchema)]
pub struct StaffResponse {
    pub message: String,
    pub user: StaffInfo,
}

/// List staff accounts
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Staff accounts", body = Vec<StaffInfo>),
        (status = 403, description = "Administrator privileges required", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_users(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<StaffInfo>>> {
    claims.require_manage_users()?;

    let users = state.services.users.list_users().await?;
    Ok(Json(users.into_iter().map(StaffInfo::from).collect()))
}

/// Get a staff account
#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Staff user ID")
    ),
    responses(
        (status = 200, description = "Staff account", body = StaffInfo),
        (status = 404, description = "Staff user not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_user(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<StaffInfo>> {
    claims.require_manage_users()?;

    let user = state.services.users.get_user(id).await?;
    Ok(Json(user.into()))
}

/// Create a staff account
#[utoipa::path(
    post,
    path = "/users",
    tag = "users",
    security(("bearer_auth" = [])),
    request_body = StaffForm,
    responses(
        (status = 201, description = "Staff account created", body = StaffResponse),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 409, description = "Login already taken", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_user(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    FormJson(form): FormJson<StaffForm>,
) -> AppResult<(StatusCode, Json<StaffResponse>)> {
    claims.require_manage_users()?;

    let user = state.services.users.create_user(&claims, &form).await?;
    Ok((
        StatusCode::CREATED,
        Json(StaffResponse {
            message: format!("Staff account {} created", user.login),
            user: user.into(),
        }),
    ))
}

/// Update a staff account
#[utoipa::path(
    put,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Staff user ID")
    ),
    request_body = StaffUpdate,
    responses(
        (status = 200, description = "Staff account updated", body = StaffResponse),
        (status = 404, description = "Staff user not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_user(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    FormJson(update): FormJson<StaffUpdate>,
) -> AppResult<Json<StaffResponse>> {
    claims.require_manage_users()?;

    let user = state.services.users.update_user(&claims, id, &update).await?;
    Ok(Json(StaffResponse {
        message: format!("Staff account {} updated", user.login),
        user: user.into(),
    }))
}

/// Delete a staff account
#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Staff user ID")
    ),
    responses(
        (status = 200, description = "Staff account deleted", body = MessageResponse),
        (status = 400, description = "Cannot delete own account", body = crate::error::ErrorResponse),
        (status = 409, description = "Staff user has recorded issues", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_user(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<MessageResponse>> {
    claims.require_manage_users()?;

    state.services.users.delete_user(&claims, id).await?;
    Ok(Json(MessageResponse::new("Staff account deleted")))
}
