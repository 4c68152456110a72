//! In-memory store used when no database is configured.

use async_trait::async_trait;
use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard, PoisonError},
};
use uuid::Uuid;

use super::{AccountStore, CatalogStore, CreateOutcome, StoreError};
use crate::{
    auth::{
        account::{Account, NewAccount, Role},
        utils::now_unix_seconds,
    },
    catalog::{Book, BookQuery, NewBook},
};

#[derive(Default)]
struct Books {
    next_id: i64,
    rows: BTreeMap<i64, Book>,
}

/// Accounts and books behind plain mutexes; no lock is held across an await.
#[derive(Default)]
pub struct MemoryStore {
    accounts: Mutex<Vec<Account>>,
    books: Mutex<Books>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn accounts(&self) -> MutexGuard<'_, Vec<Account>> {
        self.accounts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn books(&self) -> MutexGuard<'_, Books> {
        self.books.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn code_taken(accounts: &[Account], code: Option<&str>, except: Option<Uuid>) -> bool {
    code.is_some_and(|code| {
        accounts.iter().any(|account| {
            Some(account.id) != except && account.verification_code.as_deref() == Some(code)
        })
    })
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create_if_absent(&self, account: NewAccount) -> Result<CreateOutcome, StoreError> {
        let mut accounts = self.accounts();
        if let Some(existing) = accounts.iter().find(|row| row.email == account.email) {
            return Ok(CreateOutcome::Existing(existing.clone()));
        }
        if code_taken(&accounts, account.verification_code.as_deref(), None) {
            return Err(StoreError::CodeCollision);
        }
        let created = account.into_account(Uuid::new_v4(), now_unix_seconds());
        accounts.push(created.clone());
        Ok(CreateOutcome::Created(created))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts().iter().find(|row| row.email == email).cloned())
    }

    async fn find_by_verification_code(&self, code: &str) -> Result<Option<Account>, StoreError> {
        Ok(self
            .accounts()
            .iter()
            .find(|row| row.verification_code.as_deref() == Some(code))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts().iter().find(|row| row.id == id).cloned())
    }

    async fn reissue_code(
        &self,
        id: Uuid,
        code: &str,
        expires_at: i64,
    ) -> Result<bool, StoreError> {
        let mut accounts = self.accounts();
        let Some(index) = accounts
            .iter()
            .position(|row| row.id == id && !row.confirmed)
        else {
            return Ok(false);
        };
        if code_taken(&accounts, Some(code), Some(id)) {
            return Err(StoreError::CodeCollision);
        }
        let row = &mut accounts[index];
        row.verification_code = Some(code.to_string());
        row.verification_expires_at = Some(expires_at);
        Ok(true)
    }

    async fn confirm(&self, id: Uuid, code: Option<&str>) -> Result<bool, StoreError> {
        let mut accounts = self.accounts();
        let row = accounts.iter_mut().find(|row| {
            row.id == id
                && code.map_or(true, |code| {
                    !row.confirmed && row.verification_code.as_deref() == Some(code)
                })
        });
        Ok(row.map(Account::confirm).is_some())
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<bool, StoreError> {
        let mut accounts = self.accounts();
        let row = accounts.iter_mut().find(|row| row.id == id);
        Ok(row.map(|row| row.role = role).is_some())
    }

    async fn set_name(&self, id: Uuid, name: &str) -> Result<bool, StoreError> {
        let mut accounts = self.accounts();
        let row = accounts.iter_mut().find(|row| row.id == id);
        Ok(row.map(|row| row.name = name.to_string()).is_some())
    }

    async fn list(&self) -> Result<Vec<Account>, StoreError> {
        Ok(self.accounts().clone())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut accounts = self.accounts();
        let before = accounts.len();
        accounts.retain(|row| row.id != id);
        Ok(accounts.len() != before)
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn list_books(&self, query: &BookQuery) -> Result<Vec<Book>, StoreError> {
        let books = self.books();
        let rows: Vec<Book> = books.rows.values().cloned().collect();
        Ok(query.apply(&rows))
    }

    async fn get_book(&self, id: i64) -> Result<Option<Book>, StoreError> {
        Ok(self.books().rows.get(&id).cloned())
    }

    async fn add_book(&self, book: NewBook) -> Result<Book, StoreError> {
        let mut books = self.books();
        if books.rows.values().any(|row| row.title == book.title) {
            return Err(StoreError::TitleTaken);
        }
        books.next_id += 1;
        let book = book.into_book(books.next_id);
        books.rows.insert(book.id, book.clone());
        Ok(book)
    }

    async fn update_book(&self, book: &Book) -> Result<(), StoreError> {
        let mut books = self.books();
        if books
            .rows
            .values()
            .any(|row| row.id != book.id && row.title == book.title)
        {
            return Err(StoreError::TitleTaken);
        }
        let row = books.rows.get_mut(&book.id).ok_or(StoreError::NotFound)?;
        *row = book.clone();
        Ok(())
    }

    async fn delete_book(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.books().rows.remove(&id).is_some())
    }
}
