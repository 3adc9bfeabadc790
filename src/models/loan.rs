//! Loan record model and related types

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Column order of the ledger CSV file
pub const LEDGER_HEADER: [&str; 6] = [
    "borrower",
    "book_id",
    "book_title",
    "borrow_time",
    "due_time",
    "actual_return_time",
];

/// Timestamp layout used in the ledger file
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Formats a timestamp the way the ledger stores it
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses a ledger timestamp
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT)
}

mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let value = String::deserialize(deserializer)?;
        super::parse_timestamp(&value).map_err(|e| D::Error::custom(format!("{:?}: {}", value, e)))
    }
}

/// Empty string stands for "not returned yet"
mod optional_timestamp {
    use chrono::NaiveDateTime;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => serializer.serialize_str(&super::format_timestamp(ts)),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error> {
        let value = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        if value.trim().is_empty() {
            return Ok(None);
        }
        super::parse_timestamp(&value)
            .map(Some)
            .map_err(|e| D::Error::custom(format!("{:?}: {}", value, e)))
    }
}

/// One row of the loan ledger.
///
/// There is no status column: a loan is outstanding while `actual_return_time` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRecord {
    pub borrower: String,
    pub book_id: String,
    /// Title at borrow time, never re-joined with the catalog
    #[serde(default)]
    pub book_title: String,
    #[serde(with = "timestamp")]
    pub borrow_time: NaiveDateTime,
    #[serde(with = "timestamp")]
    pub due_time: NaiveDateTime,
    #[serde(with = "optional_timestamp", default)]
    pub actual_return_time: Option<NaiveDateTime>,
}

/// Derived loan state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Outstanding,
    Returned,
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoanStatus::Outstanding => write!(f, "not returned"),
            LoanStatus::Returned => write!(f, "returned"),
        }
    }
}

impl LoanRecord {
    pub fn status(&self) -> LoanStatus {
        if self.actual_return_time.is_some() {
            LoanStatus::Returned
        } else {
            LoanStatus::Outstanding
        }
    }

    pub fn is_outstanding(&self) -> bool {
        self.status() == LoanStatus::Outstanding
    }

    pub fn key(&self) -> LoanKey {
        LoanKey {
            borrower: self.borrower.clone(),
            book_id: self.book_id.clone(),
            borrow_time: self.borrow_time,
        }
    }

    /// Whole days past the due time at `as_of`, if the loan is late by then
    pub fn days_overdue(&self, as_of: NaiveDateTime) -> Option<i64> {
        if as_of > self.due_time {
            Some((as_of - self.due_time).num_days())
        } else {
            None
        }
    }
}

/// Natural key of a loan: borrower, book and borrow time to the second
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoanKey {
    pub borrower: String,
    pub book_id: String,
    #[serde(with = "timestamp")]
    pub borrow_time: NaiveDateTime,
}

impl LoanKey {
    pub fn new(borrower: impl Into<String>, book_id: impl Into<String>, borrow_time: NaiveDateTime) -> Self {
        Self {
            borrower: borrower.into(),
            book_id: book_id.into(),
            borrow_time,
        }
    }

    pub fn matches(&self, record: &LoanRecord) -> bool {
        record.borrower == self.borrower && record.book_id == self.book_id && record.borrow_time == self.borrow_time
    }
}

impl std::fmt::Display for LoanKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} / {} / {}",
            self.borrower,
            self.book_id,
            format_timestamp(&self.borrow_time)
        )
    }
}

/// Result of a return; `overdue_days` is advisory only
#[derive(Debug, Clone, Serialize)]
pub struct ReturnReceipt {
    pub record: LoanRecord,
    pub overdue_days: Option<i64>,
}

/// Outstanding loan past its due time
#[derive(Debug, Clone, Serialize)]
pub struct OverdueLoan {
    pub record: LoanRecord,
    pub days_overdue: i64,
}
