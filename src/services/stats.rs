//! Statistics service

use std::sync::Arc;

use serde::Serialize;

use crate::repository::Repository;

use super::Clock;

/// One bar of the category chart
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatEntry {
    pub label: String,
    pub value: usize,
}

/// Library-wide counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LibraryStats {
    pub total_books: usize,
    pub available_books: usize,
    pub on_loan: usize,
    pub total_loans: usize,
    pub overdue_loans: usize,
    pub users: usize,
}

#[derive(Clone)]
pub struct StatsService {
    repository: Repository,
    clock: Arc<dyn Clock>,
}

impl StatsService {
    pub fn new(repository: Repository, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// Books per category, most populated first, ties by name
    pub fn category_counts(&self) -> Vec<StatEntry> {
        self.repository
            .books
            .load()
            .category_counts()
            .into_iter()
            .map(|(label, value)| StatEntry { label, value })
            .collect()
    }

    pub fn summary(&self) -> LibraryStats {
        let catalog = self.repository.books.load();
        let ledger = self.repository.loans.load();
        let users = self.repository.users.load();

        let available_books = ledger.available_books(&catalog).len();
        LibraryStats {
            total_books: catalog.len(),
            available_books,
            on_loan: catalog.len() - available_books,
            total_loans: ledger.len(),
            overdue_loans: ledger.overdue_all(self.clock.now()).len(),
            users: users.len(),
        }
    }
}
