//! Catalog endpoints. Reads are public; writes sit behind the admin gate.

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::info;

use super::BookIdParams;
use crate::{
    api::error::AppError,
    catalog::{missing_field, Book, BookCard, BookListParams, BookQuery, NewBook, FANTASY_GENRE},
    store::CatalogStore,
};

pub type Catalog = Arc<dyn CatalogStore>;

fn required_id(params: Result<Query<BookIdParams>, QueryRejection>) -> Result<i64, AppError> {
    let Query(params) = params?;
    params
        .id
        .ok_or_else(|| AppError::Validation("id is required".to_string()))
}

fn check_fields(title: &str, author: &str, published: &str) -> Result<(), AppError> {
    match missing_field(title, author, published) {
        Some(field) => Err(AppError::Validation(format!("missing required field: {field}"))),
        None => Ok(()),
    }
}

#[utoipa::path(
    get,
    path = "/books",
    params(BookListParams),
    responses(
        (status = 200, description = "Matching books", body = [Book]),
        (status = 400, description = "Invalid sort column"),
        (status = 404, description = "No books match the filter criteria")
    ),
    tag = "books"
)]
pub async fn list_books(
    catalog: Extension<Catalog>,
    params: Result<Query<BookListParams>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(params) = params?;
    let query = BookQuery::try_from(params).map_err(AppError::Validation)?;
    let books = catalog.list_books(&query).await?;
    if books.is_empty() {
        return Err(AppError::NotFound(
            "no books match the filter criteria".to_string(),
        ));
    }
    Ok(Json(books))
}

#[utoipa::path(
    get,
    path = "/fantasy",
    responses(
        (status = 200, description = "Fantasy collection, possibly empty", body = [BookCard])
    ),
    tag = "books"
)]
pub async fn fantasy(catalog: Extension<Catalog>) -> Result<impl IntoResponse, AppError> {
    let books = catalog
        .list_books(&BookQuery::collection(FANTASY_GENRE))
        .await?;
    let cards: Vec<BookCard> = books.into_iter().map(BookCard::from).collect();
    Ok(Json(cards))
}

#[utoipa::path(
    get,
    path = "/books/search",
    params(BookIdParams),
    responses(
        (status = 200, description = "Book", body = Book),
        (status = 400, description = "Missing id"),
        (status = 404, description = "Book not found")
    ),
    tag = "books"
)]
pub async fn get_book(
    catalog: Extension<Catalog>,
    params: Result<Query<BookIdParams>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = required_id(params)?;
    let book = catalog
        .get_book(id)
        .await?
        .ok_or_else(|| AppError::NotFound("book not found".to_string()))?;
    Ok(Json(book))
}

#[utoipa::path(
    post,
    path = "/books/add",
    request_body = NewBook,
    responses(
        (status = 201, description = "Book added", body = Book),
        (status = 400, description = "Missing required fields"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Admin role required"),
        (status = 409, description = "Duplicate title")
    ),
    security(("bearer" = [])),
    tag = "books"
)]
pub async fn add_book(
    catalog: Extension<Catalog>,
    payload: Result<Json<NewBook>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(book) = payload?;
    check_fields(&book.title, &book.author, &book.published)?;
    let book = catalog.add_book(book).await?;
    info!(book_id = book.id, title = %book.title, "book added");
    Ok((StatusCode::CREATED, Json(book)))
}

#[utoipa::path(
    put,
    path = "/books/update",
    request_body = Book,
    responses(
        (status = 200, description = "Book updated", body = Book),
        (status = 400, description = "Missing required fields"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Duplicate title")
    ),
    security(("bearer" = [])),
    tag = "books"
)]
pub async fn update_book(
    catalog: Extension<Catalog>,
    payload: Result<Json<Book>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(book) = payload?;
    check_fields(&book.title, &book.author, &book.published)?;
    catalog.update_book(&book).await?;
    info!(book_id = book.id, "book updated");
    Ok(Json(book))
}

#[utoipa::path(
    delete,
    path = "/books/delete",
    params(BookIdParams),
    responses(
        (status = 204, description = "Book deleted"),
        (status = 400, description = "Missing id"),
        (status = 404, description = "Book not found")
    ),
    security(("bearer" = [])),
    tag = "books"
)]
pub async fn delete_book(
    catalog: Extension<Catalog>,
    params: Result<Query<BookIdParams>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = required_id(params)?;
    if !catalog.delete_book(id).await? {
        return Err(AppError::NotFound("book not found".to_string()));
    }
    info!(book_id = id, "book deleted");
    Ok(StatusCode::NO_CONTENT)
}
