//! End-to-end tests over a temporary data directory

use std::{fs, sync::Arc};

use chrono::NaiveDateTime;
use tempfile::TempDir;

use circulation::{
    config::{AppConfig, StorageConfig},
    error::AppError,
    models::{
        book::Book,
        import_report::SnapshotKind,
        loan::{parse_timestamp, LoanRecord},
        user::{CreateUser, Role},
    },
    services::ManualClock,
    storage, Library,
};

fn ts(value: &str) -> NaiveDateTime {
    parse_timestamp(value).unwrap()
}

/// Helper to open a library over a fresh data directory with a fixed clock
fn open_library(now: &str) -> (TempDir, Arc<ManualClock>, Library) {
    let dir = TempDir::new().unwrap();
    let config = AppConfig {
        storage: StorageConfig {
            data_dir: dir.path().join("data"),
            backup_dir: dir.path().join("backup"),
            auto_backup: true,
        },
        ..Default::default()
    };
    let clock = Arc::new(ManualClock::new(ts(now)));
    let library = Library::with_clock(config, clock.clone()).unwrap();
    (dir, clock, library)
}

fn stock(library: &Library) {
    for (id, title) in [("B1", "Dune"), ("B2", "Emma"), ("B3", "Ulysses")] {
        library.services.catalog.add(Book::new(id, title)).unwrap();
    }
}

fn register(library: &Library, username: &str, role: Role) {
    library
        .services
        .users
        .register(CreateUser {
            username: username.to_string(),
            password: format!("{}-pw", username),
            contact: "555-0100".to_string(),
            id_card: "ID-123456".to_string(),
            role,
        })
        .unwrap();
}

#[test]
fn test_open_creates_data_files() {
    let (dir, _clock, _library) = open_library("2024-01-01 00:00:00");
    let data = dir.path().join("data");

    assert_eq!(fs::read_to_string(data.join("books.json")).unwrap(), "[]");
    assert_eq!(fs::read_to_string(data.join("users.json")).unwrap(), "[]");
    assert_eq!(
        fs::read_to_string(data.join("borrow_records.csv")).unwrap(),
        "borrower,book_id,book_title,borrow_time,due_time,actual_return_time\n"
    );
}

#[test]
fn test_adding_a_book_twice_keeps_one_copy() {
    let (_dir, _clock, library) = open_library("2024-01-01 00:00:00");
    let catalog = &library.services.catalog;

    catalog.add(Book::new("B1", "Dune")).unwrap();
    let err = catalog.add(Book::new("B1", "Dune")).unwrap_err();

    assert!(matches!(err, AppError::DuplicateKey(_)));
    assert_eq!(catalog.list().len(), 1);
}

#[test]
fn test_borrow_return_round_trip() {
    let (_dir, clock, library) = open_library("2024-01-01 00:00:00");
    stock(&library);
    let loans = &library.services.loans;

    let available = |id: &str| loans.available_books("").iter().any(|b| b.id == id);
    assert!(available("B1"));

    let record = loans.borrow("B1", "alice").unwrap();
    assert!(!available("B1"));
    assert!(loans.outstanding_all().iter().any(|r| r.book_id == "B1"));

    clock.set(ts("2024-01-02 09:15:00"));
    let receipt = loans.return_loan(&record.key()).unwrap();
    assert_eq!(receipt.record.actual_return_time, Some(ts("2024-01-02 09:15:00")));
    assert!(available("B1"));
}

#[test]
fn test_renewal_scenario() {
    let (_dir, clock, library) = open_library("2024-01-01 00:00:00");
    stock(&library);
    let loans = &library.services.loans;

    let record = loans.borrow("B1", "alice").unwrap();
    assert_eq!(record.due_time, ts("2024-01-31 00:00:00"));

    clock.set(ts("2024-01-15 00:00:00"));
    let renewed = loans.renew(&record.key()).unwrap();
    assert_eq!(renewed.due_time, ts("2024-02-15 00:00:00"));

    let err = loans.renew(&record.key()).unwrap_err();
    assert!(matches!(err, AppError::RenewalLimitExceeded));
}

#[test]
fn test_renewing_a_lapsed_loan_is_refused() {
    let (_dir, clock, library) = open_library("2024-01-01 00:00:00");
    stock(&library);
    let loans = &library.services.loans;
    let record = loans.borrow("B2", "alice").unwrap();

    clock.set(ts("2024-02-02 00:00:00"));
    assert!(matches!(loans.renew(&record.key()), Err(AppError::AlreadyExpired(_))));

    let overdue = loans.overdue_for("alice");
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].days_overdue, 2);
}

#[test]
fn test_ledger_file_round_trips_through_restart() {
    let (dir, clock, library) = open_library("2024-01-01 10:00:00");
    stock(&library);
    let first = library.services.loans.borrow("B1", "alice").unwrap();
    clock.set(ts("2024-01-03 10:00:00"));
    library.services.loans.return_loan(&first.key()).unwrap();
    library.services.loans.borrow("B2", "bob").unwrap();

    let records: Vec<LoanRecord> = storage::load_csv(&dir.path().join("data").join("borrow_records.csv"));
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].actual_return_time, Some(ts("2024-01-03 10:00:00")));
    assert!(records[1].is_outstanding());

    let config = (*library.config).clone();
    let reopened = Library::with_clock(config, clock).unwrap();
    assert_eq!(reopened.services.loans.outstanding_all().len(), 1);
    assert_eq!(reopened.services.loans.available_books("").len(), 2);
}

#[test]
fn test_corrupt_files_read_as_empty() {
    let (dir, _clock, library) = open_library("2024-01-01 00:00:00");
    fs::write(dir.path().join("data").join("books.json"), "{ not json").unwrap();

    assert!(library.services.catalog.list().is_empty());
    library.services.catalog.add(Book::new("B1", "Dune")).unwrap();
    assert_eq!(library.services.catalog.list().len(), 1);
}

#[test]
fn test_merge_is_idempotent() {
    let (_source_dir, _clock, source) = open_library("2024-01-01 00:00:00");
    stock(&source);
    let loan = source.services.loans.borrow("B1", "alice").unwrap();
    source.services.loans.return_loan(&loan.key()).unwrap();
    source.services.loans.borrow("B3", "bob").unwrap();

    let (dir, _clock, library) = open_library("2024-02-01 00:00:00");
    library.services.catalog.add(Book::new("B1", "Dune")).unwrap();

    let books = serde_json::to_vec(&source.services.catalog.list().into_iter().map(|l| l.book).collect::<Vec<_>>()).unwrap();
    let first = library.services.import.merge_snapshot(&books).unwrap();
    assert_eq!((first.kind, first.added, first.skipped), (SnapshotKind::Books, 2, 1));
    assert_eq!(library.services.import.merge_snapshot(&books).unwrap().added, 0);

    let export = dir.path().join("loans.csv");
    let history = source.services.loans.outstanding_all();
    source.services.loans.export(&history, &export).unwrap();
    let first = library.services.import.merge_file(&export).unwrap();
    assert_eq!((first.kind, first.added), (SnapshotKind::Loans, 1));
    assert_eq!(library.services.import.merge_file(&export).unwrap().added, 0);
    assert!(library.services.loans.available_books("").iter().all(|b| b.id != "B3"));
}

#[test]
fn test_deleting_the_active_user() {
    let (_dir, _clock, library) = open_library("2024-01-01 00:00:00");
    register(&library, "root", Role::Admin);
    register(&library, "alice", Role::User);
    let users = &library.services.users;
    let session = users.authenticate("root", "root-pw").unwrap();

    let outcome = users.delete_users(&["root"], &session).unwrap();
    assert!(outcome.session_invalidated);
    assert_eq!(outcome.removed, vec!["root"]);

    let remaining: Vec<String> = users.list().into_iter().map(|u| u.username).collect();
    assert_eq!(remaining, vec!["alice"]);
    assert!(matches!(users.authenticate("root", "root-pw"), Err(AppError::InvalidCredentials)));
}

#[test]
fn test_history_is_private_to_regular_users() {
    let (_dir, _clock, library) = open_library("2024-01-01 00:00:00");
    stock(&library);
    register(&library, "alice", Role::User);
    register(&library, "root", Role::Admin);
    library.services.loans.borrow("B1", "alice").unwrap();
    library.services.loans.borrow("B2", "bob").unwrap();

    let alice = library.services.users.authenticate("alice", "alice-pw").unwrap();
    let root = library.services.users.authenticate("root", "root-pw").unwrap();

    assert_eq!(library.services.loans.history(&alice, "").len(), 1);
    assert_eq!(library.services.loans.history(&root, "").len(), 2);
}

#[test]
fn test_daily_backup_and_restore() {
    let (dir, clock, library) = open_library("2024-01-01 08:00:00");
    stock(&library);
    let backup = &library.services.backup;

    let taken = backup.auto_backup().unwrap().unwrap();
    assert!(dir.path().join("data").join("backup_20240101.flag").exists());
    assert!(backup.auto_backup().unwrap().is_none());

    library.services.catalog.delete(&["B1", "B2", "B3"]).unwrap();
    clock.set(ts("2024-01-01 09:00:00"));

    let name = taken.file_name().unwrap().to_string_lossy().into_owned();
    backup.restore(&name).unwrap();
    assert_eq!(library.services.catalog.list().len(), 3);
    assert!(matches!(backup.restore("../data"), Err(AppError::NotFound(_))));
}
