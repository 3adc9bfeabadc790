//! Merge of externally supplied snapshots into the live collections

use std::path::Path;

use argon2::password_hash::PasswordHash;
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::Book,
        import_report::{MergeReport, SnapshotKind},
        loan::LoanRecord,
        user::User,
    },
    repository::Repository,
};

/// Columns that identify a loan ledger export
const LEDGER_KEY_COLUMNS: [&str; 3] = ["borrower", "book_id", "borrow_time"];

/// A decoded snapshot, ready to merge
#[derive(Debug)]
enum Snapshot {
    Books(Vec<Book>),
    Users(Vec<User>),
    Loans(Vec<LoanRecord>),
}

#[derive(Clone)]
pub struct ImportService {
    repository: Repository,
}

impl ImportService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Merge the snapshot stored in `path`
    pub fn merge_file(&self, path: &Path) -> AppResult<MergeReport> {
        let payload = std::fs::read(path)
            .map_err(|e| AppError::NotFound(format!("Cannot open {}: {}", path.display(), e)))?;
        self.merge_snapshot(&payload)
    }

    /// Detect what `payload` holds and append the records the live store does not have yet.
    ///
    /// Books are matched by id, users by username and loans by their natural key,
    /// against the store and against earlier entries of the payload. Merging the
    /// same payload twice adds nothing the second time.
    pub fn merge_snapshot(&self, payload: &[u8]) -> AppResult<MergeReport> {
        let report = match parse_snapshot(payload)? {
            Snapshot::Books(books) => {
                let mut catalog = self.repository.books.load();
                let result = catalog.bulk_import(books);
                if result.imported > 0 {
                    self.repository.books.save(&catalog)?;
                }
                MergeReport {
                    kind: SnapshotKind::Books,
                    added: result.imported,
                    skipped: result.skipped,
                }
            }
            Snapshot::Users(users) => {
                let legacy = users.iter().filter(|u| PasswordHash::new(&u.password).is_err()).count();
                if legacy > 0 {
                    tracing::warn!("{} imported user(s) carry a legacy password digest and cannot log in", legacy);
                }

                let mut directory = self.repository.users.load();
                let (added, skipped) = directory.merge(users);
                if added > 0 {
                    self.repository.users.save(&directory)?;
                }
                MergeReport {
                    kind: SnapshotKind::Users,
                    added,
                    skipped,
                }
            }
            Snapshot::Loans(records) => {
                let mut ledger = self.repository.loans.load();
                let (added, skipped) = ledger.merge(records);
                if added > 0 {
                    self.repository.loans.save(&ledger)?;
                }
                MergeReport {
                    kind: SnapshotKind::Loans,
                    added,
                    skipped,
                }
            }
        };

        tracing::info!("Merged {}: {} added, {} skipped", report.kind, report.added, report.skipped);
        Ok(report)
    }
}

fn parse_snapshot(payload: &[u8]) -> AppResult<Snapshot> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| AppError::InvalidFormat(format!("Snapshot is not UTF-8: {}", e)))?;
    let text = text.trim_start_matches('\u{feff}').trim();
    if text.is_empty() {
        return Err(AppError::InvalidFormat("Snapshot is empty".to_string()));
    }

    if text.starts_with('[') {
        parse_json_snapshot(text)
    } else {
        parse_ledger_snapshot(text)
    }
}

fn parse_json_snapshot(text: &str) -> AppResult<Snapshot> {
    let values: Vec<serde_json::Value> =
        serde_json::from_str(text).map_err(|e| AppError::InvalidFormat(format!("Malformed JSON snapshot: {}", e)))?;

    let first = values
        .first()
        .and_then(|v| v.as_object())
        .ok_or_else(|| AppError::InvalidFormat("JSON snapshot holds no records".to_string()))?;

    if first.contains_key("id") {
        let books: Vec<Book> = decode_all(values, "id")?;
        for book in &books {
            book.validate()
                .map_err(|e| AppError::InvalidFormat(format!("book {:?}: {}", book.id, e)))?;
        }
        Ok(Snapshot::Books(books))
    } else if first.contains_key("username") {
        let users: Vec<User> = decode_all(values, "username")?;
        if users.iter().any(|u| u.username.trim().is_empty()) {
            return Err(AppError::InvalidFormat("user with an empty username".to_string()));
        }
        Ok(Snapshot::Users(users))
    } else {
        Err(AppError::InvalidFormat(
            "JSON snapshot is neither a book nor a user list".to_string(),
        ))
    }
}

/// Decode every element, requiring `key` on each of them
fn decode_all<T: DeserializeOwned>(values: Vec<serde_json::Value>, key: &str) -> AppResult<Vec<T>> {
    values
        .into_iter()
        .enumerate()
        .map(|(i, value)| {
            if value.get(key).is_none() {
                return Err(AppError::InvalidFormat(format!("record {} has no {} field", i + 1, key)));
            }
            serde_json::from_value(value).map_err(|e| AppError::InvalidFormat(format!("record {}: {}", i + 1, e)))
        })
        .collect()
}

fn parse_ledger_snapshot(text: &str) -> AppResult<Snapshot> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| AppError::InvalidFormat(format!("Cannot read CSV header: {}", e)))?;
    if let Some(missing) = LEDGER_KEY_COLUMNS.iter().find(|c| !headers.iter().any(|h| h == **c)) {
        return Err(AppError::InvalidFormat(format!("Loan snapshot has no {} column", missing)));
    }

    let records = reader
        .deserialize::<LoanRecord>()
        .enumerate()
        .map(|(i, row)| -> AppResult<LoanRecord> {
            let record = row.map_err(|e| AppError::InvalidFormat(format!("row {}: {}", i + 1, e)))?;
            check_loan_row(&record).map_err(|msg| AppError::InvalidFormat(format!("row {}: {}", i + 1, msg)))?;
            Ok(record)
        })
        .collect::<AppResult<Vec<_>>>()?;
    Ok(Snapshot::Loans(records))
}

/// Rows the ledger itself could never have written
fn check_loan_row(record: &LoanRecord) -> Result<(), &'static str> {
    if record.borrower.trim().is_empty() {
        return Err("empty borrower");
    }
    if record.book_id.trim().is_empty() {
        return Err("empty book id");
    }
    if record.due_time < record.borrow_time {
        return Err("due time before borrow time");
    }
    if record.actual_return_time.is_some_and(|returned| returned < record.borrow_time) {
        return Err("return time before borrow time");
    }
    Ok(())
}
