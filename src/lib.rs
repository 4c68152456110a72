//! # Bouquiniste
//!
//! `bouquiniste` is the backend of a small bookstore. It serves a public book
//! catalog and owns the identity subsystem that protects it.
//!
//! ## Identity
//!
//! - **Registration** creates an unconfirmed account and mails a short
//!   verification code. Registering again while unconfirmed re-issues the code;
//!   registering a confirmed address is a no-op.
//! - **Verification** consumes the code (single use, time bounded) and confirms
//!   the account.
//! - **Login** checks the Argon2id credential and issues an HS256 session token
//!   carrying the email and role. Tokens are stateless and simply expire.
//!
//! ## Access control
//!
//! Protected routes run the bearer authentication middleware first, which puts
//! a typed [`auth::Principal`] in the request extensions, then the role gate.
//! Catalog writes and user administration require the `admin` role.
//!
//! ## Admission gate
//!
//! Every request, whatever the route, takes a token from one process-wide
//! bucket. When the bucket is empty the request is answered with `429` before
//! routing. The bucket is global, not per client.

pub mod api;
pub mod auth;
pub mod catalog;
pub mod cli;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
