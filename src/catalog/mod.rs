//! Book catalog records and listing queries.

use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, str::FromStr};
use utoipa::{IntoParams, ToSchema};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Genre served by `GET /fantasy`.
pub const FANTASY_GENRE: &str = "fantasy";
/// Cards returned by a collection listing.
pub const COLLECTION_SIZE: u32 = 30;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub published: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub image_url: String,
    /// Free-form shelf label, matched case-insensitively by collections.
    #[serde(default)]
    pub genre: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub published: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub image_url: String,
    /// Free-form shelf label, matched case-insensitively by collections.
    #[serde(default)]
    pub genre: String,
}

impl NewBook {
    #[must_use]
    pub fn into_book(self, id: i64) -> Book {
        Book {
            id,
            title: self.title,
            author: self.author,
            published: self.published,
            description: self.description,
            price: self.price,
            image_url: self.image_url,
            genre: self.genre,
        }
    }
}

/// Card shown in a collection listing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BookCard {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub image_url: String,
}

impl From<Book> for BookCard {
    fn from(book: Book) -> Self {
        Self {
            id: book.id,
            title: book.title,
            description: book.description,
            price: book.price,
            image_url: book.image_url,
        }
    }
}

/// Returns the name of the first missing mandatory field.
pub(crate) fn missing_field(title: &str, author: &str, published: &str) -> Option<&'static str> {
    [("title", title), ("author", author), ("published", published)]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    #[default]
    Id,
    Title,
    Author,
    Published,
    Price,
}

impl SortField {
    /// Column name; only these values ever reach an `ORDER BY`.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Title => "title",
            Self::Author => "author",
            Self::Published => "published",
            Self::Price => "price",
        }
    }

    fn compare(self, a: &Book, b: &Book) -> Ordering {
        match self {
            Self::Id => a.id.cmp(&b.id),
            Self::Title => a.title.cmp(&b.title),
            Self::Author => a.author.cmp(&b.author),
            Self::Published => a.published.cmp(&b.published),
            Self::Price => a.price.total_cmp(&b.price),
        }
    }
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "id" => Ok(Self::Id),
            "title" => Ok(Self::Title),
            "author" => Ok(Self::Author),
            "published" => Ok(Self::Published),
            "price" => Ok(Self::Price),
            other => Err(format!("cannot sort by {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Raw query string of `GET /books`.
#[derive(Clone, Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct BookListParams {
    /// Substring of the title, case-insensitive.
    pub title: Option<String>,
    pub author: Option<String>,
    pub published: Option<String>,
    /// Exact genre, case-insensitive.
    pub genre: Option<String>,
    /// One of `id`, `title`, `author`, `published`, `price`.
    pub sort_by: Option<String>,
    /// `asc` (default) or `desc`.
    pub sort_order: Option<String>,
    /// 1-based page number.
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Validated listing query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookQuery {
    pub title: Option<String>,
    pub author: Option<String>,
    pub published: Option<String>,
    pub genre: Option<String>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
    pub page: u32,
    pub limit: u32,
}

impl Default for BookQuery {
    fn default() -> Self {
        Self {
            title: None,
            author: None,
            published: None,
            genre: None,
            sort_by: SortField::default(),
            sort_order: SortOrder::default(),
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl TryFrom<BookListParams> for BookQuery {
    type Error = String;

    fn try_from(params: BookListParams) -> Result<Self, Self::Error> {
        let sort_by = match non_empty(params.sort_by) {
            Some(value) => value.parse()?,
            None => SortField::default(),
        };
        let sort_order = match non_empty(params.sort_order).as_deref() {
            Some("desc" | "DESC") => SortOrder::Desc,
            _ => SortOrder::Asc,
        };
        Ok(Self {
            title: non_empty(params.title),
            author: non_empty(params.author),
            published: non_empty(params.published),
            genre: non_empty(params.genre),
            sort_by,
            sort_order,
            page: params.page.unwrap_or(1).max(1),
            limit: params
                .limit
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
        })
    }
}

impl BookQuery {
    /// First page of a genre collection.
    #[must_use]
    pub fn collection(genre: &str) -> Self {
        Self {
            genre: Some(genre.to_string()),
            limit: COLLECTION_SIZE,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }

    fn field_matches(filter: Option<&String>, value: &str) -> bool {
        filter.map_or(true, |needle| {
            value.to_lowercase().contains(&needle.to_lowercase())
        })
    }

    /// Whether `book` passes the filters; used by the in-memory catalog.
    #[must_use]
    pub fn matches(&self, book: &Book) -> bool {
        Self::field_matches(self.title.as_ref(), &book.title)
            && Self::field_matches(self.author.as_ref(), &book.author)
            && Self::field_matches(self.published.as_ref(), &book.published)
            && self
                .genre
                .as_ref()
                .map_or(true, |genre| genre.to_lowercase() == book.genre.to_lowercase())
    }

    /// Filter, sort and page a slice of books in memory.
    #[must_use]
    pub fn apply(&self, books: &[Book]) -> Vec<Book> {
        let mut selected: Vec<Book> = books
            .iter()
            .filter(|book| self.matches(book))
            .cloned()
            .collect();
        selected.sort_by(|a, b| {
            let ordering = self.sort_by.compare(a, b).then(a.id.cmp(&b.id));
            match self.sort_order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });
        let offset = usize::try_from(self.offset()).unwrap_or(usize::MAX);
        selected
            .into_iter()
            .skip(offset)
            .take(self.limit as usize)
            .collect()
    }
}
