//! Loan management service

use std::{path::Path, sync::Arc};

use crate::{
    error::{AppError, AppResult},
    models::{
        book::Book,
        loan::{LoanKey, LoanRecord, OverdueLoan, ReturnReceipt, LEDGER_HEADER},
        user::Session,
    },
    repository::{LoanPolicy, Repository},
    storage,
};

use super::Clock;

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    policy: LoanPolicy,
    clock: Arc<dyn Clock>,
}

impl LoansService {
    pub fn new(repository: Repository, policy: LoanPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> &LoanPolicy {
        &self.policy
    }

    /// Borrow a book from the catalog
    pub fn borrow(&self, book_id: &str, borrower: &str) -> AppResult<LoanRecord> {
        let catalog = self.repository.books.load();
        let book = catalog
            .get(book_id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;

        let mut ledger = self.repository.loans.load();
        let record = ledger.borrow(book, borrower, self.clock.now(), &self.policy)?.clone();
        self.repository.loans.save(&ledger)?;

        tracing::info!("Loan: {} borrowed {} ({})", record.borrower, record.book_id, record.book_title);
        Ok(record)
    }

    /// Return an outstanding loan. Late returns are accepted and logged.
    pub fn return_loan(&self, key: &LoanKey) -> AppResult<ReturnReceipt> {
        let mut ledger = self.repository.loans.load();
        let receipt = ledger.return_loan(key, self.clock.now())?;
        self.repository.loans.save(&ledger)?;

        match receipt.overdue_days {
            Some(days) => tracing::warn!("Loan: {} returned {} days late", key, days),
            None => tracing::info!("Loan: {} returned", key),
        }
        Ok(receipt)
    }

    /// Renew an outstanding loan
    pub fn renew(&self, key: &LoanKey) -> AppResult<LoanRecord> {
        let mut ledger = self.repository.loans.load();
        let record = ledger.renew(key, self.clock.now(), &self.policy)?.clone();
        self.repository.loans.save(&ledger)?;

        tracing::info!("Loan: {} renewed, now due {}", key, record.due_time);
        Ok(record)
    }

    /// Books without an outstanding loan, optionally filtered like a catalog search
    pub fn available_books(&self, keyword: &str) -> Vec<Book> {
        let catalog = self.repository.books.load();
        let ledger = self.repository.loans.load();
        let borrowed = ledger.borrowed_ids();
        catalog
            .search(keyword)
            .into_iter()
            .filter(|b| !borrowed.contains(b.id.as_str()))
            .cloned()
            .collect()
    }

    pub fn outstanding_all(&self) -> Vec<LoanRecord> {
        let ledger = self.repository.loans.load();
        ledger.outstanding_all().into_iter().cloned().collect()
    }

    pub fn outstanding_for(&self, borrower: &str) -> Vec<LoanRecord> {
        let ledger = self.repository.loans.load();
        ledger.outstanding_for(borrower).into_iter().cloned().collect()
    }

    pub fn outstanding_visible_to(&self, session: &Session) -> Vec<LoanRecord> {
        let ledger = self.repository.loans.load();
        ledger.outstanding_visible_to(session).into_iter().cloned().collect()
    }

    /// Outstanding loans matching a title or borrower keyword
    pub fn search_outstanding(&self, keyword: &str) -> Vec<LoanRecord> {
        let ledger = self.repository.loans.load();
        ledger.search_outstanding(keyword).into_iter().cloned().collect()
    }

    /// Outstanding loans visible to `session`, filtered on title or borrower
    pub fn search_outstanding_visible_to(&self, session: &Session, keyword: &str) -> Vec<LoanRecord> {
        let ledger = self.repository.loans.load();
        ledger
            .search_outstanding_visible_to(session, keyword)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Overdue loans of one borrower as of now
    pub fn overdue_for(&self, borrower: &str) -> Vec<OverdueLoan> {
        self.repository.loans.load().overdue_for(borrower, self.clock.now())
    }

    /// Overdue loans as of now: all of them for an administrator, the caller's own otherwise
    pub fn overdue_visible_to(&self, session: &Session) -> Vec<OverdueLoan> {
        let ledger = self.repository.loans.load();
        let now = self.clock.now();
        if session.is_admin() {
            ledger.overdue_all(now)
        } else {
            ledger.overdue_for(&session.username, now)
        }
    }

    /// Loan history visible to `session`, filtered on title, borrower or book id
    pub fn history(&self, session: &Session, keyword: &str) -> Vec<LoanRecord> {
        let ledger = self.repository.loans.load();
        ledger.search_history(session, keyword).into_iter().cloned().collect()
    }

    /// Write `records` to `path` in the ledger CSV format
    pub fn export(&self, records: &[LoanRecord], path: &Path) -> AppResult<usize> {
        if records.is_empty() {
            return Err(AppError::NotFound("No records to export".to_string()));
        }
        storage::write_csv(path, &LEDGER_HEADER, records)?;

        tracing::info!("Exported {} loan record(s) to {}", records.len(), path.display());
        Ok(records.len())
    }
}
