//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to an [`Action`], such as starting the API server
//! with its full configuration.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{self, auth, oauth, rate_limit};
use anyhow::{anyhow, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches
        .get_one::<u16>(commands::ARG_PORT)
        .copied()
        .unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(commands::ARG_DSN)
        .cloned()
        .filter(|dsn| !dsn.trim().is_empty());
    let support_email = matches
        .get_one::<String>(commands::ARG_SUPPORT_EMAIL)
        .map(|email| email.trim().to_string())
        .filter(|email| !email.is_empty())
        .ok_or_else(|| anyhow!("--{} must not be empty", commands::ARG_SUPPORT_EMAIL))?;

    let auth_opts = auth::Options::parse(matches)?;
    let rate_limit_opts = rate_limit::Options::parse(matches)?;
    let oauth = oauth::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        jwt_secret: auth_opts.jwt_secret,
        token_ttl_seconds: auth_opts.token_ttl_seconds,
        code_ttl_seconds: auth_opts.code_ttl_seconds,
        frontend_base_url: auth_opts.frontend_base_url,
        role_source: auth_opts.role_source,
        allow_admin_registration: auth_opts.allow_admin_registration,
        rate_limit_capacity: rate_limit_opts.capacity,
        rate_limit_refill_per_second: rate_limit_opts.refill_per_second,
        oauth,
        support_email,
    }))
}
