//! Catalog management service

use std::{fs::File, io::Read, path::Path};

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookListing, BookRow},
        import_report::BulkImportReport,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Get a book by id
    pub fn get(&self, id: &str) -> AppResult<Book> {
        self.repository
            .books
            .load()
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Whole catalog with each book's loan status
    pub fn list(&self) -> Vec<BookListing> {
        self.search("")
    }

    /// Search the catalog on title, author and ISBN, with each book's loan status
    pub fn search(&self, keyword: &str) -> Vec<BookListing> {
        let catalog = self.repository.books.load();
        let ledger = self.repository.loans.load();
        ledger.listings(catalog.search(keyword))
    }

    /// Add a new book
    pub fn add(&self, book: Book) -> AppResult<Book> {
        let mut catalog = self.repository.books.load();
        catalog.add(book.clone())?;
        self.repository.books.save(&catalog)?;

        tracing::info!("Catalog: added book id={} ({})", book.id, book.title);
        Ok(book)
    }

    /// Replace all fields of an existing book, keeping its id
    pub fn edit(&self, id: &str, updated: Book) -> AppResult<Book> {
        let mut catalog = self.repository.books.load();
        let book = catalog.edit(id, updated)?.clone();
        self.repository.books.save(&catalog)?;

        tracing::info!("Catalog: updated book id={}", id);
        Ok(book)
    }

    /// Delete books by id. Unknown ids are ignored and loan history is kept.
    pub fn delete<S: AsRef<str>>(&self, ids: &[S]) -> AppResult<usize> {
        let mut catalog = self.repository.books.load();
        let removed = catalog.delete(ids);
        if removed > 0 {
            self.repository.books.save(&catalog)?;
        }

        tracing::info!("Catalog: deleted {} of {} requested book(s)", removed, ids.len());
        Ok(removed)
    }

    /// Bulk import books from a CSV file with a header row
    pub fn import_file(&self, path: &Path) -> AppResult<BulkImportReport> {
        let file = File::open(path)
            .map_err(|e| AppError::NotFound(format!("Cannot open {}: {}", path.display(), e)))?;
        self.import_csv(file)
    }

    /// Bulk import books from CSV data. Rows whose id already exists are skipped.
    pub fn import_csv<R: Read>(&self, reader: R) -> AppResult<BulkImportReport> {
        let rows = parse_book_rows(reader)?;

        let mut catalog = self.repository.books.load();
        let report = catalog.bulk_import(rows);
        if report.imported > 0 {
            self.repository.books.save(&catalog)?;
        }

        tracing::info!(
            "Catalog import: {} imported, {} skipped as duplicates",
            report.imported,
            report.skipped
        );
        Ok(report)
    }
}

/// Decode every row up front so that a bad file leaves the catalog untouched
fn parse_book_rows<R: Read>(reader: R) -> AppResult<Vec<Book>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::Headers).from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::InvalidFormat(format!("Cannot read CSV header: {}", e)))?;
    if !headers.iter().any(|h| h == "id") {
        return Err(AppError::InvalidFormat("CSV file has no id column".to_string()));
    }

    let mut books = Vec::new();
    for (i, row) in reader.deserialize::<BookRow>().enumerate() {
        let row = row.map_err(|e| AppError::InvalidFormat(format!("row {}: {}", i + 1, e)))?;
        if row.id.trim().is_empty() {
            return Err(AppError::InvalidFormat(format!("row {}: empty book id", i + 1)));
        }
        books.push(Book::try_from(row)?);
    }
    Ok(books)
}
