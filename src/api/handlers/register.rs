//! Registration and email verification endpoints.

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use super::MessageResponse;
use crate::{
    api::error::AppError,
    auth::{AccountService, RegisterOutcome, Registration},
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    /// `admin` is honoured only when admin registration is enabled.
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VerifyParams {
    pub code: Option<String>,
}

#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created, verification email sent", body = MessageResponse),
        (status = 200, description = "Account exists; code re-sent or already verified", body = MessageResponse),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Admin registration disabled"),
        (status = 429, description = "Rate limited")
    ),
    tag = "auth"
)]
pub async fn register(
    accounts: Extension<Arc<AccountService>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    let outcome = accounts
        .register(Registration {
            name: request.name,
            email: request.email,
            password: request.password,
            role: request.role,
        })
        .await?;

    let status = match outcome {
        RegisterOutcome::Registered => StatusCode::CREATED,
        RegisterOutcome::Resent | RegisterOutcome::AlreadyVerified => StatusCode::OK,
    };
    Ok((status, Json(MessageResponse::new(outcome.message()))))
}

#[utoipa::path(
    get,
    path = "/verify",
    params(VerifyParams),
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 400, description = "Missing code"),
        (status = 404, description = "Invalid or expired code")
    ),
    tag = "auth"
)]
pub async fn verify(
    accounts: Extension<Arc<AccountService>>,
    params: Result<Query<VerifyParams>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(params) = params?;
    let code = params
        .code
        .filter(|code| !code.trim().is_empty())
        .ok_or_else(|| AppError::Validation("missing code".to_string()))?;

    accounts.verify(&code).await?;
    Ok(Json(MessageResponse::new("email verified")))
}
