//! Loans repository: the loan ledger and the borrow/return/renew rules
//!
//! The ledger stores no status. A loan is outstanding while its return time is
//! empty, and a book is on loan while it has an outstanding loan; both facts are
//! recomputed from the records on every query.

use std::collections::HashSet;

use chrono::{Duration, NaiveDateTime, SubsecRound};

use crate::{
    config::LoansConfig,
    error::{AppError, AppResult},
    models::{
        book::{Book, BookListing, BookStatus},
        loan::{format_timestamp, LoanKey, LoanRecord, OverdueLoan, ReturnReceipt, LEDGER_HEADER},
        user::Session,
    },
    storage::{self, Storage},
};

use super::books::Catalog;

#[derive(Clone)]
pub struct LoansRepository {
    storage: Storage,
}

impl LoansRepository {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Load the whole ledger
    pub fn load(&self) -> Ledger {
        Ledger::new(storage::load_csv(&self.storage.ledger_path()))
    }

    /// Replace the persisted ledger
    pub fn save(&self, ledger: &Ledger) -> AppResult<()> {
        storage::write_csv(&self.storage.ledger_path(), &LEDGER_HEADER, ledger.records())
    }
}

/// Loan durations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoanPolicy {
    /// Due time of a new loan, counted from the borrow time
    pub loan_period: Duration,
    /// Extension granted by the single renewal
    pub renewal_period: Duration,
}

impl Default for LoanPolicy {
    fn default() -> Self {
        Self::from(LoansConfig::default())
    }
}

impl From<LoansConfig> for LoanPolicy {
    fn from(config: LoansConfig) -> Self {
        Self {
            loan_period: Duration::days(config.loan_days),
            renewal_period: Duration::days(config.renewal_days),
        }
    }
}

impl LoanPolicy {
    /// A loan counts as renewed once its due time lies more than the base loan
    /// period (in whole days) after its borrow time.
    // TODO: replace with a persisted renewal counter once the ledger file gains a column for it
    fn already_renewed(&self, record: &LoanRecord) -> bool {
        (record.due_time - record.borrow_time).num_days() > self.loan_period.num_days()
    }
}

/// Append-mostly list of loan records, in file order
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    records: Vec<LoanRecord>,
}

impl Ledger {
    pub fn new(records: Vec<LoanRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[LoanRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Ids of books that currently have an outstanding loan
    pub fn borrowed_ids(&self) -> HashSet<&str> {
        self.records
            .iter()
            .filter(|r| r.is_outstanding())
            .map(|r| r.book_id.as_str())
            .collect()
    }

    pub fn is_borrowed(&self, book_id: &str) -> bool {
        self.records.iter().any(|r| r.is_outstanding() && r.book_id == book_id)
    }

    /// Catalog minus the books with an outstanding loan
    pub fn available_books<'a>(&self, catalog: &'a Catalog) -> Vec<&'a Book> {
        let borrowed = self.borrowed_ids();
        catalog
            .books()
            .iter()
            .filter(|b| !borrowed.contains(b.id.as_str()))
            .collect()
    }

    /// Attach the derived circulation status to each book
    pub fn listings<'a, I>(&self, books: I) -> Vec<BookListing>
    where
        I: IntoIterator<Item = &'a Book>,
    {
        let borrowed = self.borrowed_ids();
        books
            .into_iter()
            .map(|book| BookListing {
                status: if borrowed.contains(book.id.as_str()) {
                    BookStatus::OnLoan
                } else {
                    BookStatus::InLibrary
                },
                book: book.clone(),
            })
            .collect()
    }

    /// Open a loan of `book` for `borrower`, due one loan period after `now`
    pub fn borrow(&mut self, book: &Book, borrower: &str, now: NaiveDateTime, policy: &LoanPolicy) -> AppResult<&LoanRecord> {
        let borrower = borrower.trim();
        if borrower.is_empty() {
            return Err(AppError::Validation("Borrower name must not be empty".to_string()));
        }
        if self.is_borrowed(&book.id) {
            return Err(AppError::AlreadyBorrowed(book.id.clone()));
        }

        let now = now.trunc_subsecs(0);
        self.records.push(LoanRecord {
            borrower: borrower.to_string(),
            book_id: book.id.clone(),
            book_title: book.title.clone(),
            borrow_time: now,
            due_time: now + policy.loan_period,
            actual_return_time: None,
        });

        let index = self.records.len() - 1;
        Ok(&self.records[index])
    }

    fn find_outstanding_mut(&mut self, key: &LoanKey) -> AppResult<&mut LoanRecord> {
        self.records
            .iter_mut()
            .find(|r| r.is_outstanding() && key.matches(r))
            .ok_or_else(|| AppError::NotFound(format!("No outstanding loan {}", key)))
    }

    /// Close the outstanding loan identified by `key`.
    ///
    /// A late return is accepted; the receipt reports the whole days overdue.
    pub fn return_loan(&mut self, key: &LoanKey, now: NaiveDateTime) -> AppResult<ReturnReceipt> {
        let now = now.trunc_subsecs(0);
        let record = self.find_outstanding_mut(key)?;
        record.actual_return_time = Some(now);

        Ok(ReturnReceipt {
            overdue_days: record.days_overdue(now),
            record: record.clone(),
        })
    }

    /// Extend the due time of the outstanding loan identified by `key`, once,
    /// and only while it has not lapsed
    pub fn renew(&mut self, key: &LoanKey, now: NaiveDateTime, policy: &LoanPolicy) -> AppResult<&LoanRecord> {
        let record = self.find_outstanding_mut(key)?;

        if now > record.due_time {
            return Err(AppError::AlreadyExpired(format_timestamp(&record.due_time)));
        }
        if policy.already_renewed(record) {
            return Err(AppError::RenewalLimitExceeded);
        }

        record.due_time += policy.renewal_period;
        Ok(&*record)
    }

    /// Every outstanding loan, most recent borrow first
    pub fn outstanding_all(&self) -> Vec<&LoanRecord> {
        let mut records: Vec<&LoanRecord> = self.records.iter().filter(|r| r.is_outstanding()).collect();
        records.sort_by(|a, b| b.borrow_time.cmp(&a.borrow_time));
        records
    }

    pub fn outstanding_for(&self, borrower: &str) -> Vec<&LoanRecord> {
        self.outstanding_all()
            .into_iter()
            .filter(|r| r.borrower == borrower)
            .collect()
    }

    /// All outstanding loans for an administrator, the caller's own otherwise
    pub fn outstanding_visible_to(&self, session: &Session) -> Vec<&LoanRecord> {
        if session.is_admin() {
            self.outstanding_all()
        } else {
            self.outstanding_for(&session.username)
        }
    }

    /// Outstanding loans whose title or borrower contains `keyword`, ignoring case
    pub fn search_outstanding(&self, keyword: &str) -> Vec<&LoanRecord> {
        Self::filter_outstanding(self.outstanding_all(), keyword)
    }

    /// Same search, limited to what `session` may see
    pub fn search_outstanding_visible_to(&self, session: &Session, keyword: &str) -> Vec<&LoanRecord> {
        Self::filter_outstanding(self.outstanding_visible_to(session), keyword)
    }

    fn filter_outstanding<'a>(records: Vec<&'a LoanRecord>, keyword: &str) -> Vec<&'a LoanRecord> {
        let keyword = keyword.trim().to_lowercase();
        records
            .into_iter()
            .filter(|r| {
                keyword.is_empty()
                    || r.book_title.to_lowercase().contains(&keyword)
                    || r.borrower.to_lowercase().contains(&keyword)
            })
            .collect()
    }

    /// Loan history in file order: everything for an administrator, the caller's own otherwise
    pub fn visible_to(&self, session: &Session) -> Vec<&LoanRecord> {
        self.records
            .iter()
            .filter(|r| session.is_admin() || r.borrower == session.username)
            .collect()
    }

    /// Visible history filtered on title, borrower or book id, ignoring case
    pub fn search_history(&self, session: &Session, keyword: &str) -> Vec<&LoanRecord> {
        let keyword = keyword.trim().to_lowercase();
        self.visible_to(session)
            .into_iter()
            .filter(|r| {
                keyword.is_empty()
                    || r.book_title.to_lowercase().contains(&keyword)
                    || r.borrower.to_lowercase().contains(&keyword)
                    || r.book_id.to_lowercase().contains(&keyword)
            })
            .collect()
    }

    /// Outstanding loans of `borrower` due before `as_of`
    pub fn overdue_for(&self, borrower: &str, as_of: NaiveDateTime) -> Vec<OverdueLoan> {
        Self::overdue(self.outstanding_for(borrower), as_of)
    }

    /// Every outstanding loan due before `as_of`
    pub fn overdue_all(&self, as_of: NaiveDateTime) -> Vec<OverdueLoan> {
        Self::overdue(self.outstanding_all(), as_of)
    }

    fn overdue(records: Vec<&LoanRecord>, as_of: NaiveDateTime) -> Vec<OverdueLoan> {
        records
            .into_iter()
            .filter_map(|r| {
                r.days_overdue(as_of).map(|days_overdue| OverdueLoan {
                    record: r.clone(),
                    days_overdue,
                })
            })
            .collect()
    }

    /// Append records whose key is not in the ledger yet.
    ///
    /// An outstanding record is also refused when its book already has an
    /// outstanding loan, so a merge cannot put a book on loan twice.
    /// Returns (added, skipped).
    pub fn merge(&mut self, records: Vec<LoanRecord>) -> (usize, usize) {
        let mut keys: HashSet<LoanKey> = self.records.iter().map(LoanRecord::key).collect();
        let mut borrowed: HashSet<String> = self.borrowed_ids().into_iter().map(str::to_string).collect();
        let (mut added, mut skipped) = (0, 0);

        for record in records {
            if keys.contains(&record.key()) {
                skipped += 1;
                continue;
            }
            if record.is_outstanding() && !borrowed.insert(record.book_id.clone()) {
                tracing::warn!(
                    "Skipping imported loan {}: book {} is already on loan",
                    record.key(),
                    record.book_id
                );
                skipped += 1;
                continue;
            }
            keys.insert(record.key());
            self.records.push(record);
            added += 1;
        }
        (added, skipped)
    }
}
