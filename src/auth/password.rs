//! Argon2id password hashing.
//!
//! Hashes are PHC strings with a random salt embedded, so hashing the same
//! password twice yields different credentials. Verification goes through
//! `password-hash`, which compares outputs in constant time.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("password must not be empty")]
    Empty,
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error("hashing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Hash a plaintext password.
///
/// # Errors
/// Returns `PasswordError::Empty` for an empty password and
/// `PasswordError::Hashing` if the primitive rejects the input.
pub fn hash_password(plaintext: &str) -> Result<String, PasswordError> {
    if plaintext.is_empty() {
        return Err(PasswordError::Empty);
    }
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| PasswordError::Hashing(err.to_string()))
}

/// Check a plaintext password against a stored PHC string.
///
/// A credential that cannot be parsed never verifies.
#[must_use]
pub fn verify_password(plaintext: &str, credential: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(credential) else {
        return false;
    };
    Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed)
        .is_ok()
}

/// [`hash_password`] on the blocking pool.
///
/// # Errors
/// Same as [`hash_password`], plus `PasswordError::Task` if the worker panics.
pub async fn hash_password_blocking(plaintext: String) -> Result<String, PasswordError> {
    tokio::task::spawn_blocking(move || hash_password(&plaintext)).await?
}

/// [`verify_password`] on the blocking pool.
///
/// # Errors
/// Returns `PasswordError::Task` if the worker panics.
pub async fn verify_password_blocking(
    plaintext: String,
    credential: String,
) -> Result<bool, PasswordError> {
    Ok(tokio::task::spawn_blocking(move || verify_password(&plaintext, &credential)).await?)
}
