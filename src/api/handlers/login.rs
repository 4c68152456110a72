//! Password login, federated login and the caller's identity.

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Extension, Query},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::error::AppError,
    auth::{service::Session, AccountService, AccountView, Principal, Role},
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: String,
    /// Seconds until the token expires.
    pub expires_in: u64,
    pub user: AccountView,
}

impl From<Session> for LoginResponse {
    fn from(session: Session) -> Self {
        Self {
            token: session.token,
            token_type: "Bearer".to_string(),
            expires_in: session.expires_in,
            user: session.account,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OAuthCallbackParams {
    pub code: Option<String>,
}

#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session token issued", body = LoginResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Email not verified"),
        (status = 404, description = "Unknown user")
    ),
    tag = "auth"
)]
pub async fn login(
    accounts: Extension<Arc<AccountService>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    let session = accounts.login(&request.email, &request.password).await?;
    Ok(Json(LoginResponse::from(session)))
}

#[utoipa::path(
    get,
    path = "/auth/oauth/callback",
    params(OAuthCallbackParams),
    responses(
        (status = 200, description = "Session token issued", body = LoginResponse),
        (status = 401, description = "Authorization code rejected"),
        (status = 404, description = "Federated login not configured")
    ),
    tag = "auth"
)]
pub async fn oauth_callback(
    accounts: Extension<Arc<AccountService>>,
    params: Result<Query<OAuthCallbackParams>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(params) = params?;
    let code = params
        .code
        .ok_or_else(|| AppError::Validation("missing code".to_string()))?;
    let session = accounts.federated_login(&code).await?;
    Ok(Json(LoginResponse::from(session)))
}

#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Authenticated caller", body = MeResponse),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn me(Extension(principal): Extension<Principal>) -> Json<MeResponse> {
    Json(MeResponse {
        email: principal.email,
        role: principal.role,
    })
}
