//! Persistence traits for accounts and books.
//!
//! Two backends implement them: [`PgStore`] over Postgres and [`MemoryStore`]
//! for development and tests. Uniqueness of account emails, verification
//! codes and book titles is enforced here, not by callers.

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    auth::account::{Account, NewAccount, Role},
    catalog::{Book, BookQuery, NewBook},
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("verification code already in use")]
    CodeCollision,
    #[error("a book with this title already exists")]
    TitleTaken,
    #[error("record not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Result of [`AccountStore::create_if_absent`].
#[derive(Debug)]
pub enum CreateOutcome {
    Created(Account),
    /// Another account already owns the email; it is returned unchanged.
    Existing(Account),
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert unless the email is taken.
    ///
    /// Returns `StoreError::CodeCollision` when the verification code is held
    /// by another account.
    async fn create_if_absent(&self, account: NewAccount) -> Result<CreateOutcome, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    async fn find_by_verification_code(&self, code: &str) -> Result<Option<Account>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError>;

    /// Replace the pending code of an unconfirmed account.
    ///
    /// Returns `false` when the account is gone or already confirmed; the row
    /// is left untouched in that case. Returns `StoreError::CodeCollision` when
    /// the new code is held elsewhere.
    async fn reissue_code(
        &self,
        id: Uuid,
        code: &str,
        expires_at: i64,
    ) -> Result<bool, StoreError>;

    /// Confirm the account and clear its pending code.
    ///
    /// With `Some(code)` this is a compare-and-set: nothing changes unless the
    /// account still holds exactly that code. `None` confirms unconditionally.
    async fn confirm(&self, id: Uuid, code: Option<&str>) -> Result<bool, StoreError>;

    /// Returns whether an account was updated.
    async fn set_role(&self, id: Uuid, role: Role) -> Result<bool, StoreError>;

    /// Returns whether an account was updated.
    async fn set_name(&self, id: Uuid, name: &str) -> Result<bool, StoreError>;

    async fn list(&self) -> Result<Vec<Account>, StoreError>;

    /// Returns whether an account was removed.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_books(&self, query: &BookQuery) -> Result<Vec<Book>, StoreError>;

    async fn get_book(&self, id: i64) -> Result<Option<Book>, StoreError>;

    /// Returns `StoreError::TitleTaken` on a duplicate title.
    async fn add_book(&self, book: NewBook) -> Result<Book, StoreError>;

    /// Returns `StoreError::NotFound` for an unknown id.
    async fn update_book(&self, book: &Book) -> Result<(), StoreError>;

    async fn delete_book(&self, id: i64) -> Result<bool, StoreError>;
}

/// Check if a database error is a unique constraint violation (`23505`),
/// optionally on a specific constraint.
pub(crate) fn is_unique_violation(err: &sqlx::Error, constraint: Option<&str>) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some("23505")
                && constraint.map_or(true, |name| db_err.constraint() == Some(name))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_database_errors_are_not_unique_violations() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound, None));
        assert!(!is_unique_violation(
            &sqlx::Error::PoolTimedOut,
            Some("accounts_email_key")
        ));
    }
}
