//! Role-based user management endpoints.
//!
//! Flow Overview:
//! 1) Authenticate the request via bearer token.
//! 2) Require the `admin` role for every /admin route.
//! 3) List accounts, change a role or delete an account.

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Extension, Query},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::MessageResponse;
use crate::{
    api::error::AppError,
    auth::{AccountService, AccountView, Role},
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRoleRequest {
    pub user_id: Uuid,
    pub role: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserIdParams {
    pub id: Option<Uuid>,
}

#[utoipa::path(
    get,
    path = "/admin/users",
    responses(
        (status = 200, description = "All accounts", body = [AccountView]),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Admin role required")
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn list_users(
    accounts: Extension<Arc<AccountService>>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(accounts.list_accounts().await?))
}

#[utoipa::path(
    post,
    path = "/admin/users/update-role",
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = MessageResponse),
        (status = 400, description = "Unknown role"),
        (status = 404, description = "User not found")
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn update_role(
    accounts: Extension<Arc<AccountService>>,
    payload: Result<Json<UpdateRoleRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    let role = request
        .role
        .parse::<Role>()
        .map_err(|err| AppError::Validation(err.to_string()))?;
    accounts.update_role(request.user_id, role).await?;
    Ok(Json(MessageResponse::new("user role updated")))
}

#[utoipa::path(
    delete,
    path = "/admin/users/delete",
    params(UserIdParams),
    responses(
        (status = 200, description = "User deleted", body = MessageResponse),
        (status = 400, description = "Missing or invalid id"),
        (status = 404, description = "User not found")
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn delete_user(
    accounts: Extension<Arc<AccountService>>,
    params: Result<Query<UserIdParams>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(params) = params?;
    let id = params
        .id
        .ok_or_else(|| AppError::Validation("id is required".to_string()))?;
    accounts.delete_account(id).await?;
    Ok(Json(MessageResponse::new("user deleted")))
}
