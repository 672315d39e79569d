//! Authentication endpoints

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::{StaffRole, StaffUser},
};

use super::AuthenticatedUser;

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    /// Bearer token for the Authorization header
    pub token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub user: StaffInfo,
}

/// Public view of a staff account
#[derive(Serialize, ToSchema)]
pub struct StaffInfo {
    pub id: i32,
    pub login: String,
    pub display_name: String,
    pub role: StaffRole,
    pub can_manage_library: bool,
    pub can_manage_users: bool,
}

impl From<StaffUser> for StaffInfo {
    fn from(user: StaffUser) -> Self {
        Self {
            id: user.id,
            login: user.login,
            display_name: user.display_name,
            role: user.role,
            can_manage_library: user.role.can_manage_library(),
            can_manage_users: user.role.can_manage_users(),
        }
    }
}

/// Staff login
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<crate::AppState>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let (token, user) = state
        .services
        .users
        .authenticate(&request.login, &request.password)
        .await?;

    Ok(Json(LoginResponse {
        token,
        token_type: "Bearer".to_string(),
        expires_in: state.config.auth.jwt_expiration_hours * 3600,
        user: user.into(),
    }))
}

/// Current staff member
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current staff member", body = StaffInfo),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn me(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<StaffInfo>> {
    let user = state.services.users.get_user(claims.user_id).await?;
    Ok(Json(user.into()))
}
