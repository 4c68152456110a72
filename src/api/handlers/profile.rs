use axum::{
    extract::{rejection::JsonRejection, Extension},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::{
    api::error::AppError,
    auth::{AccountService, AccountView, Principal},
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProfileUpdateRequest {
    pub name: String,
}

/// Rename the caller's own account.
#[utoipa::path(
    put,
    path = "/profile/update",
    request_body = ProfileUpdateRequest,
    responses(
        (status = 200, description = "Updated account", body = AccountView),
        (status = 400, description = "Blank name"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Account no longer exists")
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn update_profile(
    accounts: Extension<Arc<AccountService>>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<ProfileUpdateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    let account = accounts
        .update_profile(&principal.email, &request.name)
        .await?;
    Ok(Json(account))
}
