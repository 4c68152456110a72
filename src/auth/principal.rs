//! Authenticated principal extraction and role gating.
//!
//! Flow Overview: `require_auth` reads the bearer token, validates it and puts
//! a [`Principal`] into the request extensions. `require_role` runs after it
//! and compares the role against the one the route group needs.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{str::FromStr, sync::Arc};
use tracing::debug;

use super::{account::Role, token::TokenIssuer};
use crate::api::error::AppError;

/// Name of the legacy header read by [`RoleSource::Header`].
pub const ROLE_HEADER: &str = "role";

/// Authenticated caller derived from a valid session token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub email: String,
    pub role: Role,
}

/// Where the role gate reads the caller's role from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RoleSource {
    /// Role carried by the signed token.
    #[default]
    Claims,
    /// Role taken from the `Role` request header. The client controls it.
    Header,
}

impl FromStr for RoleSource {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "claims" => Ok(Self::Claims),
            "header" => Ok(Self::Header),
            other => Err(format!("unknown role source: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RoleGate {
    pub required: Role,
    pub source: RoleSource,
}

impl RoleGate {
    #[must_use]
    pub const fn new(required: Role, source: RoleSource) -> Self {
        Self { required, source }
    }
}

pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Reject the request with 401 unless it carries a valid bearer token.
pub async fn require_auth(
    State(tokens): State<Arc<TokenIssuer>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_bearer_token(request.headers()) else {
        debug!("missing or malformed authorization header");
        return AppError::unauthorized().into_response();
    };

    let identity = match tokens.validate(token) {
        Ok(identity) => identity,
        Err(err) => {
            debug!("rejected bearer token: {err}");
            return AppError::unauthorized().into_response();
        }
    };

    request.extensions_mut().insert(Principal {
        email: identity.email,
        role: identity.role,
    });

    next.run(request).await
}

/// Reject the request with 403 unless the caller holds the gate's role.
pub async fn require_role(
    State(gate): State<RoleGate>,
    request: Request,
    next: Next,
) -> Response {
    let role = match gate.source {
        RoleSource::Claims => match request.extensions().get::<Principal>() {
            Some(principal) => Some(principal.role),
            None => return AppError::unauthorized().into_response(),
        },
        RoleSource::Header => request
            .headers()
            .get(ROLE_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<Role>().ok()),
    };

    if role != Some(gate.required) {
        debug!(required = %gate.required, ?role, "role check failed");
        return AppError::Forbidden("insufficient role".to_string()).into_response();
    }

    next.run(request).await
}
