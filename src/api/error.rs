//! Error types and Axum response conversions.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use super::support::SupportError;
use crate::{
    auth::{oauth::FederationError, AccountError},
    store::StoreError,
};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Bad request: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited")]
    RateLimited,
}

impl AppError {
    #[must_use]
    pub fn unauthorized() -> Self {
        Self::Unauthorized("unauthorized".to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            Self::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Rate limit exceeded".to_string(),
            ),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<AccountError> for AppError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::Validation(msg) => Self::Validation(msg),
            AccountError::Forbidden(msg) => Self::Forbidden(msg),
            AccountError::NotFound => Self::NotFound(err.to_string()),
            AccountError::Unverified => Self::Forbidden(err.to_string()),
            AccountError::InvalidCredential => Self::Unauthorized(err.to_string()),
            AccountError::InvalidOrExpiredCode | AccountError::FederationDisabled => {
                Self::NotFound(err.to_string())
            }
            AccountError::Federation(FederationError::Rejected(_)) => {
                Self::Unauthorized("authorization code rejected".to_string())
            }
            AccountError::Store(err) => Self::from(err),
            AccountError::GenerationExhausted
            | AccountError::Federation(_)
            | AccountError::Password(_)
            | AccountError::Token(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TitleTaken => Self::Conflict(err.to_string()),
            StoreError::NotFound => Self::NotFound(err.to_string()),
            StoreError::CodeCollision | StoreError::Database(_) | StoreError::Migrate(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<SupportError> for AppError {
    fn from(err: SupportError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON error: {err}"))
    }
}
