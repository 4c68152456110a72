//! Account record and role model.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Stored account.
///
/// `password_hash` is a PHC string and `None` for federated accounts. It is
/// skipped by `Debug` and never leaves the crate through [`AccountView`].
#[derive(Clone, PartialEq, Eq)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub role: Role,
    pub confirmed: bool,
    pub verification_code: Option<String>,
    pub verification_expires_at: Option<i64>,
    pub created_at: i64,
}

impl Account {
    /// Confirm the account and drop the pending code.
    pub fn confirm(&mut self) {
        self.confirmed = true;
        self.verification_code = None;
        self.verification_expires_at = None;
    }

    #[must_use]
    pub fn code_expired(&self, now_unix_seconds: i64) -> bool {
        self.verification_expires_at
            .map_or(true, |expires_at| now_unix_seconds >= expires_at)
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("confirmed", &self.confirmed)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Fields for an account that does not exist yet.
#[derive(Clone)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub role: Role,
    pub confirmed: bool,
    pub verification_code: Option<String>,
    pub verification_expires_at: Option<i64>,
}

impl NewAccount {
    #[must_use]
    pub fn into_account(self, id: Uuid, created_at: i64) -> Account {
        Account {
            id,
            name: self.name,
            email: self.email,
            password_hash: self.password_hash,
            role: self.role,
            confirmed: self.confirmed,
            verification_code: self.verification_code,
            verification_expires_at: self.verification_expires_at,
            created_at,
        }
    }
}

/// External representation of an account (no credential, no code).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccountView {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub confirmed: bool,
    pub created_at: i64,
}

impl From<&Account> for AccountView {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            name: account.name.clone(),
            email: account.email.clone(),
            role: account.role,
            confirmed: account.confirmed,
            created_at: account.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Account {
        Account {
            id: Uuid::new_v4(),
            name: "Alice".to_string(),
            email: "a@x.com".to_string(),
            password_hash: Some("$argon2id$secret".to_string()),
            role: Role::User,
            confirmed: false,
            verification_code: Some("1234".to_string()),
            verification_expires_at: Some(100),
            created_at: 0,
        }
    }

    #[test]
    fn role_parses_known_values_only() {
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!(" user ".parse::<Role>(), Ok(Role::User));
        assert!("root".parse::<Role>().is_err());
        assert!("Admin".parse::<Role>().is_err());
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Admin).ok().as_deref(), Some("\"admin\""));
    }

    #[test]
    fn confirm_clears_code_and_expiry() {
        let mut account = account();
        account.confirm();
        assert!(account.confirmed);
        assert_eq!(account.verification_code, None);
        assert_eq!(account.verification_expires_at, None);
    }

    #[test]
    fn code_expired_is_inclusive() {
        let account = account();
        assert!(!account.code_expired(99));
        assert!(account.code_expired(100));
    }

    #[test]
    fn debug_and_view_hide_credential() {
        let account = account();
        let debug = format!("{account:?}");
        assert!(!debug.contains("argon2"));
        assert!(!debug.contains("1234"));

        let json = serde_json::to_string(&AccountView::from(&account)).unwrap_or_default();
        assert!(!json.contains("argon2"));
        assert!(!json.contains("password"));
        assert!(!json.contains("1234"));
    }
}
