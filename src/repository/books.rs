//! Books repository: the in-memory catalog snapshot and its persistence

use std::collections::HashSet;

use indexmap::IndexMap;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::Book,
        import_report::{BulkImportReport, DUPLICATE_SAMPLE_SIZE},
    },
    storage::{self, Storage},
};

#[derive(Clone)]
pub struct BooksRepository {
    storage: Storage,
}

impl BooksRepository {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Load the whole catalog
    pub fn load(&self) -> Catalog {
        Catalog::new(storage::load_json(&self.storage.books_path()))
    }

    /// Replace the persisted catalog
    pub fn save(&self, catalog: &Catalog) -> AppResult<()> {
        storage::save_json(&self.storage.books_path(), catalog.books())
    }
}

/// Books keyed by their unique id, in insertion order
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    books: Vec<Book>,
}

impl Catalog {
    pub fn new(books: Vec<Book>) -> Self {
        Self { books }
    }

    pub fn books(&self) -> &[Book] {
        &self.books
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Book> {
        self.books.iter().find(|b| b.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Insert a new book
    pub fn add(&mut self, book: Book) -> AppResult<()> {
        book.validate()?;
        if self.contains(&book.id) {
            return Err(AppError::DuplicateKey(format!("Book id {} already exists", book.id)));
        }
        self.books.push(book);
        Ok(())
    }

    /// Replace every field of book `id`; the id itself never changes
    pub fn edit(&mut self, id: &str, mut updated: Book) -> AppResult<&Book> {
        let book = self
            .books
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;
        updated.id = book.id.clone();
        *book = updated;
        Ok(&*book)
    }

    /// Remove the given ids, ignoring unknown ones. Loan records are not touched.
    pub fn delete<S: AsRef<str>>(&mut self, ids: &[S]) -> usize {
        let ids: HashSet<&str> = ids.iter().map(|id| AsRef::<str>::as_ref(id)).collect();
        let before = self.books.len();
        self.books.retain(|b| !ids.contains(b.id.as_str()));
        before - self.books.len()
    }

    /// Insert each book whose id is new to the catalog and to the batch so far
    pub fn bulk_import(&mut self, rows: Vec<Book>) -> BulkImportReport {
        let mut known: HashSet<String> = self.books.iter().map(|b| b.id.clone()).collect();
        let mut report = BulkImportReport::default();

        for book in rows {
            if !known.insert(book.id.clone()) {
                report.skipped += 1;
                if report.duplicate_samples.len() < DUPLICATE_SAMPLE_SIZE {
                    report.duplicate_samples.push(book.id);
                }
                continue;
            }
            self.books.push(book);
            report.imported += 1;
        }
        report
    }

    /// Books whose title, author or ISBN contain `keyword`, ignoring case.
    /// A blank keyword returns the whole catalog.
    pub fn search(&self, keyword: &str) -> Vec<&Book> {
        let keyword = keyword.trim().to_lowercase();
        if keyword.is_empty() {
            return self.books.iter().collect();
        }
        self.books.iter().filter(|b| b.matches(&keyword)).collect()
    }

    /// Number of books per category, most populated first
    pub fn category_counts(&self) -> IndexMap<String, usize> {
        let mut counts: IndexMap<String, usize> = IndexMap::new();
        for book in &self.books {
            *counts.entry(book.category_label().to_string()).or_default() += 1;
        }
        counts.sort_by(|ka, va, kb, vb| vb.cmp(va).then_with(|| ka.cmp(kb)));
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(id: &str, title: &str, category: &str) -> Book {
        let mut book = Book::new(id, title);
        book.category = category.to_string();
        book
    }

    #[test]
    fn test_add_duplicate_keeps_one_copy() {
        let mut catalog = Catalog::default();
        let dune = book("B1", "Dune", "sf");

        catalog.add(dune.clone()).unwrap();
        let err = catalog.add(dune).unwrap_err();

        assert!(matches!(err, AppError::DuplicateKey(_)));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_add_rejects_empty_id() {
        let mut catalog = Catalog::default();
        assert!(matches!(catalog.add(book("", "Nameless", "")), Err(AppError::Validation(_))));
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_edit_preserves_id() {
        let mut catalog = Catalog::new(vec![book("B1", "Dune", "sf")]);

        let edited = catalog.edit("B1", book("OTHER", "Dune Messiah", "sf")).unwrap();
        assert_eq!(edited.id, "B1");
        assert_eq!(edited.title, "Dune Messiah");
        assert!(!catalog.contains("OTHER"));

        assert!(matches!(catalog.edit("B9", book("B9", "x", "")), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_delete_ignores_unknown_ids() {
        let mut catalog = Catalog::new(vec![book("B1", "a", ""), book("B2", "b", ""), book("B3", "c", "")]);
        assert_eq!(catalog.delete(&["B1", "B3", "B7"]), 2);
        assert_eq!(catalog.books().iter().map(|b| b.id.as_str()).collect::<Vec<_>>(), vec!["B2"]);
    }

    #[test]
    fn test_bulk_import_skips_duplicates_within_batch() {
        let mut catalog = Catalog::new(vec![book("B1", "a", "")]);
        let rows = vec![
            book("B1", "again", ""),
            book("B2", "b", ""),
            book("B2", "b twice", ""),
            book("B3", "c", ""),
        ];

        let report = catalog.bulk_import(rows);
        assert_eq!(report.imported, 2);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.duplicate_samples, vec!["B1", "B2"]);
        assert_eq!(catalog.get("B2").unwrap().title, "b");
    }

    #[test]
    fn test_bulk_import_samples_at_most_five() {
        let mut catalog = Catalog::new((0..8).map(|i| book(&format!("B{}", i), "x", "")).collect());
        let report = catalog.bulk_import((0..8).map(|i| book(&format!("B{}", i), "y", "")).collect());
        assert_eq!(report.imported, 0);
        assert_eq!(report.skipped, 8);
        assert_eq!(report.duplicate_samples.len(), 5);
    }

    #[test]
    fn test_search() {
        let mut tolkien = book("B1", "The Hobbit", "fantasy");
        tolkien.author = "J.R.R. Tolkien".to_string();
        let mut herbert = book("B2", "Dune", "sf");
        herbert.isbn = "9780441013593".to_string();
        let catalog = Catalog::new(vec![tolkien, herbert]);

        assert_eq!(catalog.search("").len(), 2);
        assert_eq!(catalog.search("  TOLKIEN ")[0].id, "B1");
        assert_eq!(catalog.search("0441")[0].id, "B2");
        assert!(catalog.search("asimov").is_empty());
    }

    #[test]
    fn test_category_counts_sorted_descending() {
        let catalog = Catalog::new(vec![
            book("B1", "a", "sf"),
            book("B2", "b", ""),
            book("B3", "c", "sf"),
            book("B4", "d", "poetry"),
            book("B5", "e", "sf"),
            book("B6", "f", "  "),
        ]);

        let counts: Vec<(String, usize)> = catalog.category_counts().into_iter().collect();
        assert_eq!(
            counts,
            vec![
                ("sf".to_string(), 3),
                ("unclassified".to_string(), 2),
                ("poetry".to_string(), 1),
            ]
        );
    }
}
