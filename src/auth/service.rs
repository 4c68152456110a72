//! Account lifecycle: registration, verification, login and administration.
//!
//! Flow Overview:
//! 1) `register` validates input and either creates an unconfirmed account,
//!    re-issues the code of an unconfirmed one, or does nothing for a
//!    confirmed one. New codes are mailed in the background.
//! 2) `verify` consumes a code (single use, time bounded) and confirms.
//! 3) `login` checks the password of a confirmed account and issues a token.
//!
//! Uniqueness of emails and codes is the store's job; this layer only retries
//! code generation when the store reports a collision.

use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    account::{Account, AccountView, NewAccount, Role},
    oauth::{FederationError, IdentityProvider},
    password::{hash_password_blocking, verify_password_blocking, PasswordError},
    token::{TokenError, TokenIssuer},
    utils::{
        build_verify_url, generate_verification_code, normalize_email, now_unix_seconds,
        valid_email,
    },
};
use crate::{
    api::email::{dispatch, EmailMessage, EmailSender},
    store::{AccountStore, CreateOutcome, StoreError},
};

pub const DEFAULT_CODE_TTL_SECONDS: i64 = 30 * 60;
/// Attempts at drawing a verification code that no other account holds.
pub const MAX_CODE_ATTEMPTS: usize = 8;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    code_ttl_seconds: i64,
    allow_admin_registration: bool,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            code_ttl_seconds: DEFAULT_CODE_TTL_SECONDS,
            allow_admin_registration: false,
        }
    }

    #[must_use]
    pub fn with_code_ttl_seconds(mut self, seconds: i64) -> Self {
        self.code_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_admin_registration(mut self, allow: bool) -> Self {
        self.allow_admin_registration = allow;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn code_ttl_seconds(&self) -> i64 {
        self.code_ttl_seconds
    }

    #[must_use]
    pub fn allow_admin_registration(&self) -> bool {
        self.allow_admin_registration
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("user not found")]
    NotFound,
    #[error("email not verified")]
    Unverified,
    #[error("invalid credentials")]
    InvalidCredential,
    #[error("invalid or expired verification code")]
    InvalidOrExpiredCode,
    #[error("could not allocate a unique verification code")]
    GenerationExhausted,
    #[error("federated login is not configured")]
    FederationDisabled,
    #[error(transparent)]
    Federation(#[from] FederationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Input of [`AccountService::register`].
#[derive(Clone, Debug, Default)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    Resent,
    AlreadyVerified,
}

impl RegisterOutcome {
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Registered => "registered, check email",
            Self::Resent => "already exists, resent",
            Self::AlreadyVerified => "already exists and verified",
        }
    }
}

/// Issued session token and the account it belongs to.
#[derive(Clone, Debug)]
pub struct Session {
    pub token: String,
    pub expires_in: u64,
    pub account: AccountView,
}

pub struct AccountService {
    accounts: Arc<dyn AccountStore>,
    mailer: Arc<dyn EmailSender>,
    tokens: Arc<TokenIssuer>,
    identity_provider: Option<Arc<dyn IdentityProvider>>,
    config: AuthConfig,
}

impl AccountService {
    #[must_use]
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        mailer: Arc<dyn EmailSender>,
        tokens: Arc<TokenIssuer>,
        config: AuthConfig,
    ) -> Self {
        Self {
            accounts,
            mailer,
            tokens,
            identity_provider: None,
            config,
        }
    }

    #[must_use]
    pub fn with_identity_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity_provider = Some(provider);
        self
    }

    #[must_use]
    pub fn tokens(&self) -> Arc<TokenIssuer> {
        Arc::clone(&self.tokens)
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    fn requested_role(&self, requested: Option<&str>) -> Result<Role, AccountError> {
        match requested.map(str::parse::<Role>) {
            Some(Ok(Role::Admin)) if self.config.allow_admin_registration => Ok(Role::Admin),
            Some(Ok(Role::Admin)) => Err(AccountError::Forbidden(
                "admin registration is disabled".to_string(),
            )),
            _ => Ok(Role::User),
        }
    }

    fn code_expiry(&self) -> i64 {
        now_unix_seconds().saturating_add(self.config.code_ttl_seconds)
    }

    fn send_code(&self, account: &Account, code: &str) {
        let url = build_verify_url(&self.config.frontend_base_url, code);
        let message = EmailMessage::verification(&account.email, &account.name, code, &url);
        dispatch(Arc::clone(&self.mailer), message);
    }

    /// Register a new account or re-issue the code of an unconfirmed one.
    ///
    /// # Errors
    /// - `Validation` for a blank field or malformed email,
    /// - `Forbidden` for an `admin` request while admin registration is off,
    /// - `GenerationExhausted` if no free code was found,
    /// - store and hashing failures.
    pub async fn register(&self, request: Registration) -> Result<RegisterOutcome, AccountError> {
        let name = request.name.trim().to_string();
        let email = normalize_email(&request.email);
        if name.is_empty() || email.is_empty() || request.password.is_empty() {
            return Err(AccountError::Validation(
                "name, email and password are required".to_string(),
            ));
        }
        if !valid_email(&email) {
            return Err(AccountError::Validation("invalid email".to_string()));
        }

        if let Some(existing) = self.accounts.find_by_email(&email).await? {
            return self.reissue(&existing).await;
        }

        // Only a new account takes the requested role.
        let role = self.requested_role(request.role.as_deref())?;
        let password_hash = hash_password_blocking(request.password).await?;

        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = generate_verification_code();
            let new_account = NewAccount {
                name: name.clone(),
                email: email.clone(),
                password_hash: Some(password_hash.clone()),
                role,
                confirmed: false,
                verification_code: Some(code.clone()),
                verification_expires_at: Some(self.code_expiry()),
            };
            match self.accounts.create_if_absent(new_account).await {
                Ok(CreateOutcome::Created(account)) => {
                    info!(account_id = %account.id, role = %account.role, "account registered");
                    self.send_code(&account, &code);
                    return Ok(RegisterOutcome::Registered);
                }
                // Lost a race with a concurrent registration for the same email.
                Ok(CreateOutcome::Existing(existing)) => return self.reissue(&existing).await,
                Err(StoreError::CodeCollision) => debug!("verification code collision, retrying"),
                Err(err) => return Err(err.into()),
            }
        }

        warn!("verification code space exhausted after {MAX_CODE_ATTEMPTS} attempts");
        Err(AccountError::GenerationExhausted)
    }

    /// The store only replaces the code while the account is unconfirmed, so
    /// a verification landing after `account` was read is never undone.
    async fn reissue(&self, account: &Account) -> Result<RegisterOutcome, AccountError> {
        if account.confirmed {
            return Ok(RegisterOutcome::AlreadyVerified);
        }

        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = generate_verification_code();
            match self
                .accounts
                .reissue_code(account.id, &code, self.code_expiry())
                .await
            {
                Ok(true) => {
                    info!(account_id = %account.id, "verification code re-issued");
                    self.send_code(account, &code);
                    return Ok(RegisterOutcome::Resent);
                }
                Ok(false) => {
                    debug!(account_id = %account.id, "account confirmed meanwhile");
                    return Ok(RegisterOutcome::AlreadyVerified);
                }
                Err(StoreError::CodeCollision) => debug!("verification code collision, retrying"),
                Err(err) => return Err(err.into()),
            }
        }

        warn!("verification code space exhausted after {MAX_CODE_ATTEMPTS} attempts");
        Err(AccountError::GenerationExhausted)
    }

    /// Confirm the account holding `code`.
    ///
    /// # Errors
    /// `InvalidOrExpiredCode` when no account holds the code, it has expired
    /// or it was replaced before the confirmation landed; the account is left
    /// untouched in each case.
    pub async fn verify(&self, code: &str) -> Result<AccountView, AccountError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AccountError::InvalidOrExpiredCode);
        }
        let Some(mut account) = self.accounts.find_by_verification_code(code).await? else {
            return Err(AccountError::InvalidOrExpiredCode);
        };
        if account.code_expired(now_unix_seconds()) {
            debug!(account_id = %account.id, "verification code expired");
            return Err(AccountError::InvalidOrExpiredCode);
        }

        if !self.accounts.confirm(account.id, Some(code)).await? {
            debug!(account_id = %account.id, "verification code replaced before use");
            return Err(AccountError::InvalidOrExpiredCode);
        }
        account.confirm();
        info!(account_id = %account.id, "account verified");
        Ok(AccountView::from(&account))
    }

    /// Check a password and issue a session token.
    ///
    /// # Errors
    /// `NotFound`, `Unverified` (checked before the password), or
    /// `InvalidCredential`.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AccountError> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(AccountError::Validation(
                "email and password are required".to_string(),
            ));
        }
        let account = self
            .accounts
            .find_by_email(&email)
            .await?
            .ok_or(AccountError::NotFound)?;
        if !account.confirmed {
            return Err(AccountError::Unverified);
        }
        let Some(credential) = account.password_hash.clone() else {
            return Err(AccountError::InvalidCredential);
        };
        if !verify_password_blocking(password.to_string(), credential).await? {
            debug!(account_id = %account.id, "password mismatch");
            return Err(AccountError::InvalidCredential);
        }

        self.session(&account)
    }

    /// Exchange a provider authorization code and sign the caller in,
    /// creating a confirmed `user` account on first use.
    ///
    /// # Errors
    /// `FederationDisabled` without a provider, `Federation` when the exchange
    /// fails, plus store failures.
    pub async fn federated_login(&self, authorization_code: &str) -> Result<Session, AccountError> {
        let provider = self
            .identity_provider
            .as_ref()
            .ok_or(AccountError::FederationDisabled)?;
        if authorization_code.trim().is_empty() {
            return Err(AccountError::Validation("missing code".to_string()));
        }

        let identity = provider.exchange(authorization_code.trim()).await?;
        let email = normalize_email(&identity.email);
        if !valid_email(&email) {
            return Err(FederationError::InvalidResponse("invalid email".to_string()).into());
        }

        let account = match self.accounts.find_by_email(&email).await? {
            Some(mut account) => {
                if !account.confirmed {
                    // The provider vouches for the address.
                    self.accounts.confirm(account.id, None).await?;
                    account.confirm();
                }
                account
            }
            None => {
                let new_account = NewAccount {
                    name: identity.name.trim().to_string(),
                    email,
                    password_hash: None,
                    role: Role::User,
                    confirmed: true,
                    verification_code: None,
                    verification_expires_at: None,
                };
                match self.accounts.create_if_absent(new_account).await? {
                    CreateOutcome::Created(account) => {
                        info!(account_id = %account.id, "federated account created");
                        account
                    }
                    CreateOutcome::Existing(account) => account,
                }
            }
        };

        self.session(&account)
    }

    fn session(&self, account: &Account) -> Result<Session, AccountError> {
        let token = self.tokens.issue(&account.email, account.role)?;
        Ok(Session {
            token,
            expires_in: self.tokens.ttl().as_secs(),
            account: AccountView::from(account),
        })
    }

    /// Look up an account by its (normalized) email.
    ///
    /// # Errors
    /// `NotFound` if there is no such account.
    pub async fn account_by_email(&self, email: &str) -> Result<AccountView, AccountError> {
        self.accounts
            .find_by_email(&normalize_email(email))
            .await?
            .as_ref()
            .map(AccountView::from)
            .ok_or(AccountError::NotFound)
    }

    /// # Errors
    /// Store failures.
    pub async fn list_accounts(&self) -> Result<Vec<AccountView>, AccountError> {
        let accounts = self.accounts.list().await?;
        Ok(accounts.iter().map(AccountView::from).collect())
    }

    /// # Errors
    /// `NotFound` if there is no such account.
    pub async fn update_role(&self, id: Uuid, role: Role) -> Result<AccountView, AccountError> {
        if !self.accounts.set_role(id, role).await? {
            return Err(AccountError::NotFound);
        }
        info!(account_id = %id, role = %role, "account role updated");
        self.account_by_id(id).await
    }

    /// Rename the account signed in as `email`.
    ///
    /// # Errors
    /// `Validation` for a blank name, `NotFound` if the account is gone.
    pub async fn update_profile(
        &self,
        email: &str,
        name: &str,
    ) -> Result<AccountView, AccountError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AccountError::Validation("name is required".to_string()));
        }
        let account = self
            .accounts
            .find_by_email(&normalize_email(email))
            .await?
            .ok_or(AccountError::NotFound)?;
        if !self.accounts.set_name(account.id, name).await? {
            return Err(AccountError::NotFound);
        }
        info!(account_id = %account.id, "profile updated");
        self.account_by_id(account.id).await
    }

    async fn account_by_id(&self, id: Uuid) -> Result<AccountView, AccountError> {
        self.accounts
            .find_by_id(id)
            .await?
            .as_ref()
            .map(AccountView::from)
            .ok_or(AccountError::NotFound)
    }

    /// # Errors
    /// `NotFound` if there is no such account.
    pub async fn delete_account(&self, id: Uuid) -> Result<(), AccountError> {
        if !self.accounts.delete(id).await? {
            return Err(AccountError::NotFound);
        }
        info!(account_id = %id, "account deleted");
        Ok(())
    }
}
