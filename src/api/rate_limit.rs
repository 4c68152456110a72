//! Admission gate: one token bucket shared by every inbound request.
//!
//! The bucket is process-wide, not per client, so a single noisy client can
//! starve everyone else. One token comes back every `1 / refill_per_second`
//! seconds, up to `capacity`; a request that finds the bucket empty is
//! answered with `429` before routing.

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::{Clock, DefaultClock},
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::{net::SocketAddr, num::NonZeroU32, sync::Arc, time::Duration};
use tracing::warn;

use super::error::AppError;

pub const DEFAULT_CAPACITY: u32 = 5;
pub const DEFAULT_REFILL_PER_SECOND: f64 = 1.0;

#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    #[error("capacity must be greater than zero")]
    ZeroCapacity,
    #[error("refill rate must be a positive number, got {0}")]
    InvalidRefill(f64),
}

/// Build the quota: a burst of `capacity`, one token back per refill period.
///
/// # Errors
/// Rejects a zero capacity and a refill rate that is not a positive,
/// representable number of tokens per second.
pub fn quota(capacity: u32, refill_per_second: f64) -> Result<Quota, QuotaError> {
    let burst = NonZeroU32::new(capacity).ok_or(QuotaError::ZeroCapacity)?;
    if !refill_per_second.is_finite() || refill_per_second <= 0.0 {
        return Err(QuotaError::InvalidRefill(refill_per_second));
    }
    let period = Duration::try_from_secs_f64(refill_per_second.recip())
        .map_err(|_| QuotaError::InvalidRefill(refill_per_second))?;
    Quota::with_period(period)
        .map(|quota| quota.allow_burst(burst))
        .ok_or(QuotaError::InvalidRefill(refill_per_second))
}

type DirectLimiter<C> =
    RateLimiter<NotKeyed, InMemoryState, C, NoOpMiddleware<<C as Clock>::Instant>>;

/// Global token bucket starting full.
pub struct AdmissionGate<C: Clock = DefaultClock> {
    limiter: DirectLimiter<C>,
}

impl AdmissionGate {
    /// # Errors
    /// See [`quota`].
    pub fn new(capacity: u32, refill_per_second: f64) -> Result<Self, QuotaError> {
        Ok(Self {
            limiter: RateLimiter::direct(quota(capacity, refill_per_second)?),
        })
    }
}

impl<C: Clock> AdmissionGate<C> {
    /// Gate driven by an explicit clock.
    ///
    /// # Errors
    /// See [`quota`].
    pub fn with_clock(
        capacity: u32,
        refill_per_second: f64,
        clock: &C,
    ) -> Result<Self, QuotaError> {
        Ok(Self {
            limiter: RateLimiter::direct_with_clock(quota(capacity, refill_per_second)?, clock),
        })
    }

    /// Take one token if available.
    pub fn allow(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

/// Middleware rejecting requests with `429` once the bucket is empty.
pub async fn admission_gate(
    State(gate): State<Arc<AdmissionGate>>,
    request: Request,
    next: Next,
) -> Response {
    if gate.allow() {
        return next.run(request).await;
    }

    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |info| info.0.to_string());
    warn!(
        http.method = %request.method(),
        http.path = %request.uri().path(),
        client = %client,
        "Rate limit exceeded"
    );
    AppError::RateLimited.into_response()
}
