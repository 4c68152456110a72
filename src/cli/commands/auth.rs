use anyhow::{anyhow, bail, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;

use crate::auth::{service::DEFAULT_CODE_TTL_SECONDS, RoleSource};

pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_TOKEN_TTL_SECONDS: &str = "token-ttl-seconds";
pub const ARG_CODE_TTL_SECONDS: &str = "code-ttl-seconds";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_ROLE_SOURCE: &str = "role-source";
pub const ARG_ALLOW_ADMIN_REGISTRATION: &str = "allow-admin-registration";

#[derive(Debug, Clone)]
pub struct Options {
    pub jwt_secret: SecretString,
    pub token_ttl_seconds: u64,
    pub code_ttl_seconds: i64,
    pub frontend_base_url: String,
    pub role_source: RoleSource,
    pub allow_admin_registration: bool,
}

impl Options {
    /// Parse identity arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the signing secret is missing or a value is out of range.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let jwt_secret = match matches.get_one::<String>(ARG_JWT_SECRET) {
            Some(value) if !value.trim().is_empty() => SecretString::from(value.clone()),
            _ => bail!("missing required argument: --{ARG_JWT_SECRET}"),
        };

        let token_ttl_seconds = matches
            .get_one::<u64>(ARG_TOKEN_TTL_SECONDS)
            .copied()
            .unwrap_or(86_400);
        if token_ttl_seconds == 0 {
            bail!("--{ARG_TOKEN_TTL_SECONDS} must be greater than zero");
        }

        let code_ttl_seconds = matches
            .get_one::<i64>(ARG_CODE_TTL_SECONDS)
            .copied()
            .unwrap_or(DEFAULT_CODE_TTL_SECONDS);
        if code_ttl_seconds <= 0 {
            bail!("--{ARG_CODE_TTL_SECONDS} must be greater than zero");
        }

        let role_source = matches
            .get_one::<String>(ARG_ROLE_SOURCE)
            .map(|value| value.parse::<RoleSource>())
            .transpose()
            .map_err(|err| anyhow!(err))?
            .unwrap_or_default();

        Ok(Self {
            jwt_secret,
            token_ttl_seconds,
            code_ttl_seconds,
            frontend_base_url: matches
                .get_one::<String>(ARG_FRONTEND_BASE_URL)
                .cloned()
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
            role_source,
            allow_admin_registration: matches.get_flag(ARG_ALLOW_ADMIN_REGISTRATION),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("HMAC key used to sign session tokens")
                .env("BOUQUINISTE_JWT_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_TTL_SECONDS)
                .long(ARG_TOKEN_TTL_SECONDS)
                .help("Session token lifetime in seconds")
                .env("BOUQUINISTE_TOKEN_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_CODE_TTL_SECONDS)
                .long(ARG_CODE_TTL_SECONDS)
                .help("Verification code lifetime in seconds")
                .env("BOUQUINISTE_CODE_TTL_SECONDS")
                .default_value("1800")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL used for verification links and CORS")
                .env("BOUQUINISTE_FRONTEND_BASE_URL")
                .default_value("http://localhost:8080"),
        )
        .arg(
            Arg::new(ARG_ROLE_SOURCE)
                .long(ARG_ROLE_SOURCE)
                .help("Where the admin gate reads the caller's role from")
                .long_help(
                    "Where the admin gate reads the caller's role from.\n\n`claims` uses the role signed into the session token. `header` trusts the `Role` request header and exists only for legacy clients.",
                )
                .env("BOUQUINISTE_ROLE_SOURCE")
                .default_value("claims")
                .value_parser(["claims", "header"]),
        )
        .arg(
            Arg::new(ARG_ALLOW_ADMIN_REGISTRATION)
                .long(ARG_ALLOW_ADMIN_REGISTRATION)
                .help("Allow self-registration with the admin role")
                .env("BOUQUINISTE_ALLOW_ADMIN_REGISTRATION")
                .action(ArgAction::SetTrue),
        )
}
