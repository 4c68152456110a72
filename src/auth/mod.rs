//! Identity and access control.
//!
//! - `account`: stored account record and roles.
//! - `password`: Argon2id hashing.
//! - `token`: HS256 session tokens.
//! - `service`: registration, verification and login state machine.
//! - `principal`: bearer authentication and role gating middleware.
//! - `oauth`: federated login through an external identity provider.

pub mod account;
pub mod oauth;
pub mod password;
pub mod principal;
pub mod service;
pub mod token;
pub(crate) mod utils;

pub use account::{Account, AccountView, Role};
pub use principal::{require_auth, require_role, Principal, RoleGate, RoleSource};
pub use service::{AccountError, AccountService, AuthConfig, RegisterOutcome, Registration};
pub use token::{TokenError, TokenIssuer};
