//! Federated identity through an OAuth2 authorization-code exchange.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::time::Duration;
use tracing::{error, instrument};
use url::Url;

use crate::APP_USER_AGENT;

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// Identity asserted by an external provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub email: String,
    pub name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum FederationError {
    #[error("authorization code rejected: {0}")]
    Rejected(String),
    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange an authorization code for the caller's identity.
    async fn exchange(&self, code: &str) -> Result<Identity, FederationError>;
}

#[derive(Clone, Debug)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub token_url: Url,
    pub userinfo_url: Url,
    pub redirect_url: String,
}

/// Standard OAuth2 provider: code → access token → userinfo.
#[derive(Debug)]
pub struct OAuthProvider {
    client: Client,
    config: OAuthConfig,
}

impl OAuthProvider {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: OAuthConfig) -> Result<Self, FederationError> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(PROVIDER_TIMEOUT)
            .build()?;
        Ok(Self { client, config })
    }

    async fn access_token(&self, code: &str) -> Result<String, FederationError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_url.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret()),
        ];

        let response = self
            .client
            .post(self.config.token_url.as_str())
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body: Value = response.json().await.unwrap_or_default();
            let message = body["error"].as_str().unwrap_or_default();
            return Err(FederationError::Rejected(format!("{status} {message}")));
        }

        let body: Value = response.json().await?;
        body["access_token"]
            .as_str()
            .map(ToString::to_string)
            .ok_or_else(|| FederationError::InvalidResponse("no access_token".to_string()))
    }
}

#[async_trait]
impl IdentityProvider for OAuthProvider {
    #[instrument(skip(self, code))]
    async fn exchange(&self, code: &str) -> Result<Identity, FederationError> {
        let access_token = self.access_token(code).await?;

        let response = self
            .client
            .get(self.config.userinfo_url.as_str())
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            error!("Userinfo request failed: {status}");
            return Err(FederationError::InvalidResponse(format!(
                "userinfo returned {status}"
            )));
        }

        let body: Value = response.json().await?;
        let email = body["email"]
            .as_str()
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .ok_or_else(|| FederationError::InvalidResponse("no email".to_string()))?;
        let name = body["name"].as_str().unwrap_or(email);

        Ok(Identity {
            email: email.to_string(),
            name: name.to_string(),
        })
    }
}
