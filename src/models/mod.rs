//! Data models for the circulation tracker

pub mod book;
pub mod import_report;
pub mod loan;
pub mod user;

// Re-export commonly used types
pub use book::{Book, BookListing, BookRow, BookStatus};
pub use import_report::{BulkImportReport, MergeReport, SnapshotKind};
pub use loan::{LoanKey, LoanRecord, LoanStatus, OverdueLoan, ReturnReceipt};
pub use user::{CreateUser, DeleteOutcome, Role, Session, User, UserShort};
