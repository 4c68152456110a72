use anyhow::{bail, Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use url::Url;

use crate::auth::oauth::OAuthConfig;

pub const ARG_OAUTH_CLIENT_ID: &str = "oauth-client-id";
pub const ARG_OAUTH_CLIENT_SECRET: &str = "oauth-client-secret";
pub const ARG_OAUTH_TOKEN_URL: &str = "oauth-token-url";
pub const ARG_OAUTH_USERINFO_URL: &str = "oauth-userinfo-url";
pub const ARG_OAUTH_REDIRECT_URL: &str = "oauth-redirect-url";

const ALL: [&str; 5] = [
    ARG_OAUTH_CLIENT_ID,
    ARG_OAUTH_CLIENT_SECRET,
    ARG_OAUTH_TOKEN_URL,
    ARG_OAUTH_USERINFO_URL,
    ARG_OAUTH_REDIRECT_URL,
];

/// Parse the federated login provider.
///
/// Returns `None` when no provider option is set. A partial configuration is an error.
///
/// # Errors
/// Returns an error if only some options are set or a URL is invalid.
pub fn parse(matches: &ArgMatches) -> Result<Option<OAuthConfig>> {
    let get_non_empty = |id: &str| -> Option<String> {
        matches
            .get_one::<String>(id)
            .cloned()
            .filter(|v| !v.trim().is_empty())
    };

    let values = ALL.map(get_non_empty);
    if values.iter().all(Option::is_none) {
        return Ok(None);
    }

    let [Some(client_id), Some(client_secret), Some(token_url), Some(userinfo_url), Some(redirect_url)] =
        values.clone()
    else {
        let missing = ALL
            .iter()
            .zip(&values)
            .find_map(|(id, value)| value.is_none().then_some(*id))
            .unwrap_or_default();
        bail!("federated login is partially configured, missing: --{missing}");
    };

    Ok(Some(OAuthConfig {
        client_id,
        client_secret: SecretString::from(client_secret),
        token_url: Url::parse(&token_url)
            .with_context(|| format!("invalid --{ARG_OAUTH_TOKEN_URL}: {token_url}"))?,
        userinfo_url: Url::parse(&userinfo_url)
            .with_context(|| format!("invalid --{ARG_OAUTH_USERINFO_URL}: {userinfo_url}"))?,
        redirect_url,
    }))
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_OAUTH_CLIENT_ID)
                .long(ARG_OAUTH_CLIENT_ID)
                .help("OAuth2 client id for federated login")
                .env("BOUQUINISTE_OAUTH_CLIENT_ID"),
        )
        .arg(
            Arg::new(ARG_OAUTH_CLIENT_SECRET)
                .long(ARG_OAUTH_CLIENT_SECRET)
                .help("OAuth2 client secret")
                .env("BOUQUINISTE_OAUTH_CLIENT_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_OAUTH_TOKEN_URL)
                .long(ARG_OAUTH_TOKEN_URL)
                .help("Provider token endpoint")
                .env("BOUQUINISTE_OAUTH_TOKEN_URL"),
        )
        .arg(
            Arg::new(ARG_OAUTH_USERINFO_URL)
                .long(ARG_OAUTH_USERINFO_URL)
                .help("Provider userinfo endpoint")
                .env("BOUQUINISTE_OAUTH_USERINFO_URL"),
        )
        .arg(
            Arg::new(ARG_OAUTH_REDIRECT_URL)
                .long(ARG_OAUTH_REDIRECT_URL)
                .help("Redirect URI registered with the provider")
                .env("BOUQUINISTE_OAUTH_REDIRECT_URL"),
        )
}
