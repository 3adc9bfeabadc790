//! Book (catalog entry) model and related types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, NoneAsEmptyString, PickFirst};
use validator::Validate;

use crate::error::{AppError, AppResult};

/// Label used for books without a category
pub const UNCLASSIFIED: &str = "unclassified";

/// Book as persisted in books.json.
///
/// `price` and `quantity` are written back as strings ("" when absent), which is
/// how existing data files store them; numbers are accepted on read.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Book {
    #[validate(length(min = 1, message = "Book id must not be empty"))]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub isbn: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub publish_date: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub category: String,
    #[serde_as(as = "PickFirst<(NoneAsEmptyString, _)>")]
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde_as(as = "PickFirst<(NoneAsEmptyString, _)>")]
    #[serde(default)]
    pub quantity: Option<u32>,
}

impl Book {
    /// Minimal book with only id and title set
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            author: String::new(),
            isbn: String::new(),
            publisher: String::new(),
            publish_date: String::new(),
            location: String::new(),
            category: String::new(),
            price: None,
            quantity: None,
        }
    }

    /// Case-insensitive match of an already lowercased keyword on title, author or ISBN
    pub fn matches(&self, keyword: &str) -> bool {
        self.title.to_lowercase().contains(keyword)
            || self.author.to_lowercase().contains(keyword)
            || self.isbn.to_lowercase().contains(keyword)
    }

    /// Category used for statistics
    pub fn category_label(&self) -> &str {
        let category = self.category.trim();
        if category.is_empty() {
            UNCLASSIFIED
        } else {
            category
        }
    }
}

/// Copies assumed for an imported row that leaves `quantity` empty
pub const DEFAULT_IMPORT_QUANTITY: u32 = 1;

/// One row of a bulk import CSV file. Every column is text; only `id` is required.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookRow {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub isbn: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub publish_date: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub quantity: String,
}

impl TryFrom<BookRow> for Book {
    type Error = AppError;

    fn try_from(row: BookRow) -> AppResult<Self> {
        let price = parse_optional::<Decimal>(&row.price)
            .map_err(|e| AppError::InvalidFormat(format!("book {}: bad price {:?}: {}", row.id, row.price, e)))?;
        let quantity = parse_optional::<u32>(&row.quantity).map_err(|e| {
            AppError::InvalidFormat(format!("book {}: bad quantity {:?}: {}", row.id, row.quantity, e))
        })?
        .or(Some(DEFAULT_IMPORT_QUANTITY));

        Ok(Book {
            id: row.id.trim().to_string(),
            title: row.title,
            author: row.author,
            isbn: row.isbn,
            publisher: row.publisher,
            publish_date: row.publish_date,
            location: row.location,
            category: row.category,
            price,
            quantity,
        })
    }
}

fn parse_optional<T>(value: &str) -> Result<Option<T>, T::Err>
where
    T: std::str::FromStr,
{
    let value = value.trim();
    if value.is_empty() {
        Ok(None)
    } else {
        value.parse().map(Some)
    }
}

/// Circulation status of a book, derived from the loan ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BookStatus {
    InLibrary,
    OnLoan,
}

impl std::fmt::Display for BookStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookStatus::InLibrary => write!(f, "in library"),
            BookStatus::OnLoan => write!(f, "on loan"),
        }
    }
}

/// Book with its derived circulation status, for catalog listings
#[derive(Debug, Clone, Serialize)]
pub struct BookListing {
    #[serde(flatten)]
    pub book: Book,
    pub status: BookStatus,
}
