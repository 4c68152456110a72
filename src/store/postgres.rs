//! Postgres backend.

use async_trait::async_trait;
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    PgPool, Postgres, QueryBuilder, Row,
};
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

use super::{is_unique_violation, AccountStore, CatalogStore, CreateOutcome, StoreError};
use crate::{
    auth::{
        account::{Account, NewAccount, Role},
        utils::now_unix_seconds,
    },
    catalog::{Book, BookQuery, NewBook},
};

const ACCOUNT_COLUMNS: &str = "id, name, email, password_hash, role, confirmed, \
     verification_code, verification_expires_at, created_at";
const BOOK_COLUMNS: &str =
    "id, title, author, published, description, price, image_url, genre";

const CODE_CONSTRAINT: &str = "accounts_verification_code_key";
const TITLE_CONSTRAINT: &str = "books_title_key";

macro_rules! db_span {
    ($operation:literal, $query:expr) => {
        tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = $operation,
            db.statement = $query
        )
    };
}

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and apply the embedded migrations.
    ///
    /// # Errors
    /// Returns an error if the database is unreachable or a migration fails.
    pub async fn connect(dsn: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(dsn)
            .await?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// # Errors
    /// Returns `StoreError::Migrate` if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn account_from_row(row: &PgRow) -> Result<Account, StoreError> {
    let role: String = row.try_get("role")?;
    let role = role
        .parse::<Role>()
        .map_err(|err| sqlx::Error::Decode(Box::new(err)))?;
    Ok(Account {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role,
        confirmed: row.try_get("confirmed")?,
        verification_code: row.try_get("verification_code")?,
        verification_expires_at: row.try_get("verification_expires_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn book_from_row(row: &PgRow) -> Result<Book, StoreError> {
    Ok(Book {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        author: row.try_get("author")?,
        published: row.try_get("published")?,
        description: row.try_get("description")?,
        price: row.try_get("price")?,
        image_url: row.try_get("image_url")?,
        genre: row.try_get("genre")?,
    })
}

fn map_unique(err: sqlx::Error, constraint: &str, mapped: StoreError) -> StoreError {
    if is_unique_violation(&err, Some(constraint)) {
        mapped
    } else {
        StoreError::Database(err)
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn create_if_absent(&self, account: NewAccount) -> Result<CreateOutcome, StoreError> {
        let query = format!(
            "INSERT INTO accounts ({ACCOUNT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (email) DO NOTHING \
             RETURNING {ACCOUNT_COLUMNS}"
        );
        let span = db_span!("INSERT", query.as_str());
        let inserted = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(&account.name)
            .bind(&account.email)
            .bind(&account.password_hash)
            .bind(account.role.as_str())
            .bind(account.confirmed)
            .bind(&account.verification_code)
            .bind(account.verification_expires_at)
            .bind(now_unix_seconds())
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| map_unique(err, CODE_CONSTRAINT, StoreError::CodeCollision))?;

        if let Some(row) = inserted {
            return Ok(CreateOutcome::Created(account_from_row(&row)?));
        }

        // Conflict on email: hand back the row that won.
        self.find_by_email(&account.email)
            .await?
            .map(CreateOutcome::Existing)
            .ok_or(StoreError::NotFound)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1");
        let span = db_span!("SELECT", query.as_str());
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn find_by_verification_code(&self, code: &str) -> Result<Option<Account>, StoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE verification_code = $1");
        let span = db_span!("SELECT", query.as_str());
        let row = sqlx::query(&query)
            .bind(code)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
        let span = db_span!("SELECT", query.as_str());
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn reissue_code(
        &self,
        id: Uuid,
        code: &str,
        expires_at: i64,
    ) -> Result<bool, StoreError> {
        let query = r"
            UPDATE accounts
            SET verification_code = $2,
                verification_expires_at = $3
            WHERE id = $1 AND confirmed = FALSE
        ";
        let span = db_span!("UPDATE", query);
        let result = sqlx::query(query)
            .bind(id)
            .bind(code)
            .bind(expires_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| map_unique(err, CODE_CONSTRAINT, StoreError::CodeCollision))?;
        Ok(result.rows_affected() > 0)
    }

    async fn confirm(&self, id: Uuid, code: Option<&str>) -> Result<bool, StoreError> {
        let query = r"
            UPDATE accounts
            SET confirmed = TRUE,
                verification_code = NULL,
                verification_expires_at = NULL
            WHERE id = $1
              AND ($2::TEXT IS NULL OR (confirmed = FALSE AND verification_code = $2))
        ";
        let span = db_span!("UPDATE", query);
        let result = sqlx::query(query)
            .bind(id)
            .bind(code)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<bool, StoreError> {
        let query = "UPDATE accounts SET role = $2 WHERE id = $1";
        let span = db_span!("UPDATE", query);
        let result = sqlx::query(query)
            .bind(id)
            .bind(role.as_str())
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_name(&self, id: Uuid, name: &str) -> Result<bool, StoreError> {
        let query = "UPDATE accounts SET name = $2 WHERE id = $1";
        let span = db_span!("UPDATE", query);
        let result = sqlx::query(query)
            .bind(id)
            .bind(name)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<Account>, StoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY created_at, email");
        let span = db_span!("SELECT", query.as_str());
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .instrument(span)
            .await?;
        rows.iter().map(account_from_row).collect()
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let query = "DELETE FROM accounts WHERE id = $1";
        let span = db_span!("DELETE", query);
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Build the listing statement; only whitelisted columns reach `ORDER BY`.
fn list_books_query(query: &BookQuery) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!("SELECT {BOOK_COLUMNS} FROM books WHERE TRUE"));
    for (column, filter) in [
        ("title", &query.title),
        ("author", &query.author),
        ("published", &query.published),
    ] {
        if let Some(value) = filter {
            builder
                .push(format!(" AND {column} ILIKE '%' || "))
                .push_bind(value.clone())
                .push(" || '%'");
        }
    }
    if let Some(genre) = &query.genre {
        builder
            .push(" AND lower(genre) = lower(")
            .push_bind(genre.clone())
            .push(")");
    }
    builder.push(format!(
        " ORDER BY {} {}, id ASC LIMIT ",
        query.sort_by.column(),
        query.sort_order.sql()
    ));
    builder.push_bind(i64::from(query.limit));
    builder.push(" OFFSET ");
    builder.push_bind(i64::try_from(query.offset()).unwrap_or(i64::MAX));
    builder
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn list_books(&self, query: &BookQuery) -> Result<Vec<Book>, StoreError> {
        let mut builder = list_books_query(query);
        let span = db_span!("SELECT", builder.sql());
        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .instrument(span)
            .await?;
        rows.iter().map(book_from_row).collect()
    }

    async fn get_book(&self, id: i64) -> Result<Option<Book>, StoreError> {
        let query = format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = $1");
        let span = db_span!("SELECT", query.as_str());
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;
        row.as_ref().map(book_from_row).transpose()
    }

    async fn add_book(&self, book: NewBook) -> Result<Book, StoreError> {
        let query = format!(
            "INSERT INTO books (title, author, published, description, price, image_url, genre) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {BOOK_COLUMNS}"
        );
        let span = db_span!("INSERT", query.as_str());
        let row = sqlx::query(&query)
            .bind(&book.title)
            .bind(&book.author)
            .bind(&book.published)
            .bind(&book.description)
            .bind(book.price)
            .bind(&book.image_url)
            .bind(&book.genre)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| map_unique(err, TITLE_CONSTRAINT, StoreError::TitleTaken))?;
        book_from_row(&row)
    }

    async fn update_book(&self, book: &Book) -> Result<(), StoreError> {
        let query = r"
            UPDATE books
            SET title = $2,
                author = $3,
                published = $4,
                description = $5,
                price = $6,
                image_url = $7,
                genre = $8
            WHERE id = $1
        ";
        let span = db_span!("UPDATE", query);
        let result = sqlx::query(query)
            .bind(book.id)
            .bind(&book.title)
            .bind(&book.author)
            .bind(&book.published)
            .bind(&book.description)
            .bind(book.price)
            .bind(&book.image_url)
            .bind(&book.genre)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| map_unique(err, TITLE_CONSTRAINT, StoreError::TitleTaken))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_book(&self, id: i64) -> Result<bool, StoreError> {
        let query = "DELETE FROM books WHERE id = $1";
        let span = db_span!("DELETE", query);
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{SortField, SortOrder};
    use sqlx::postgres::{PgConnectOptions, PgSslMode};

    fn unreachable_store() -> PgStore {
        let options = PgConnectOptions::new()
            .host("127.0.0.1")
            .port(1)
            .username("invalid")
            .database("invalid")
            .ssl_mode(PgSslMode::Disable);
        PgStore::new(
            PgPoolOptions::new()
                .acquire_timeout(Duration::from_millis(200))
                .connect_lazy_with(options),
        )
    }

    #[test]
    fn list_query_binds_filters_and_whitelists_order() {
        let query = BookQuery {
            title: Some("dune".to_string()),
            sort_by: SortField::Price,
            sort_order: SortOrder::Desc,
            page: 3,
            limit: 5,
            ..BookQuery::default()
        };
        let builder = list_books_query(&query);
        let sql = builder.sql();
        assert!(sql.contains("title ILIKE '%' || $1 || '%'"), "{sql}");
        assert!(!sql.contains("author ILIKE"), "{sql}");
        assert!(sql.contains("ORDER BY price DESC, id ASC LIMIT $2 OFFSET $3"), "{sql}");
        assert!(!sql.contains("dune"));
    }

    #[test]
    fn collection_query_binds_genre() {
        let builder = list_books_query(&BookQuery::collection("fantasy"));
        let sql = builder.sql();
        assert!(sql.contains("AND lower(genre) = lower($1)"), "{sql}");
        assert!(sql.contains("ORDER BY id ASC, id ASC LIMIT $2 OFFSET $3"), "{sql}");
        assert!(!sql.contains("fantasy"));
    }

    #[tokio::test]
    async fn unreachable_database_surfaces_error() {
        let store = unreachable_store();
        let result = store.find_by_email("a@x.com").await;
        assert!(matches!(result, Err(StoreError::Database(_))));

        let result = store.get_book(1).await;
        assert!(matches!(result, Err(StoreError::Database(_))));

        let result = store.confirm(Uuid::new_v4(), Some("0001")).await;
        assert!(matches!(result, Err(StoreError::Database(_))));
    }
}
