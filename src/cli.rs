//! Command line front end: argument parsing, authentication, role gating and output

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;

use circulation::{
    error::AppError,
    models::{
        book::Book,
        loan::{format_timestamp, parse_timestamp, LoanKey, LoanRecord},
        user::{CreateUser, Role, Session},
    },
    Library,
};

/// Book circulation tracker for a single library branch
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Account to act as
    #[arg(short, long, global = true, env = "CIRCULATION_USER")]
    pub user: Option<String>,

    /// Password of that account
    #[arg(short, long, global = true, env = "CIRCULATION_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an account
    Register {
        username: String,
        #[arg(long = "new-password")]
        new_password: String,
        #[arg(long)]
        contact: String,
        #[arg(long)]
        id_card: String,
        #[arg(long, default_value = "user")]
        role: Role,
    },
    /// Check the credentials and show the session
    Whoami,
    /// Catalog management
    #[command(subcommand)]
    Books(BooksCommand),
    /// Borrowing, returns and renewals
    #[command(subcommand)]
    Loans(LoansCommand),
    /// Account administration
    #[command(subcommand)]
    Users(UsersCommand),
    /// Merge an exported books.json, users.json or loan CSV into the live data
    Merge { path: PathBuf },
    /// Backups of the data directory
    #[command(subcommand)]
    Backup(BackupCommand),
}

#[derive(Subcommand, Debug)]
pub enum BooksCommand {
    /// Search on title, author or ISBN; no keyword lists everything
    Search { keyword: Option<String> },
    Show { id: String },
    Add {
        id: String,
        #[command(flatten)]
        fields: BookFields,
    },
    /// Change some fields of a book; the others keep their value
    Edit {
        id: String,
        #[command(flatten)]
        fields: BookFields,
    },
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Bulk import from a CSV file with a header row
    Import { path: PathBuf },
    /// Books per category and library counters
    Stats,
}

#[derive(Args, Debug, Default)]
pub struct BookFields {
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub author: Option<String>,
    #[arg(long)]
    pub isbn: Option<String>,
    #[arg(long)]
    pub publisher: Option<String>,
    #[arg(long)]
    pub publish_date: Option<String>,
    #[arg(long)]
    pub location: Option<String>,
    #[arg(long)]
    pub category: Option<String>,
    #[arg(long)]
    pub price: Option<Decimal>,
    #[arg(long)]
    pub quantity: Option<u32>,
}

impl BookFields {
    /// Overwrite the fields given on the command line
    fn apply(&self, book: &mut Book) {
        let text_fields = [
            (&self.title, &mut book.title),
            (&self.author, &mut book.author),
            (&self.isbn, &mut book.isbn),
            (&self.publisher, &mut book.publisher),
            (&self.publish_date, &mut book.publish_date),
            (&self.location, &mut book.location),
            (&self.category, &mut book.category),
        ];
        for (value, field) in text_fields {
            if let Some(value) = value {
                *field = value.clone();
            }
        }
        if let Some(price) = self.price {
            book.price = Some(price);
        }
        if let Some(quantity) = self.quantity {
            book.quantity = Some(quantity);
        }
    }
}

#[derive(Args, Debug)]
pub struct LoanSelector {
    pub book_id: String,
    /// Borrower of the loan; defaults to the current user
    #[arg(long)]
    pub borrower: Option<String>,
    /// Borrow time of the loan ("YYYY-MM-DD HH:MM:SS"); defaults to the book's outstanding loan
    #[arg(long)]
    pub borrowed_at: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum LoansCommand {
    Borrow {
        book_id: String,
        /// Borrow on behalf of someone else (administrators only)
        #[arg(long)]
        borrower: Option<String>,
    },
    Return(LoanSelector),
    Renew(LoanSelector),
    /// Books that can be borrowed now
    Available { keyword: Option<String> },
    /// Loans not returned yet
    Outstanding { keyword: Option<String> },
    Overdue,
    /// Loan history, optionally filtered on title, borrower or book id
    History { keyword: Option<String> },
    /// Write the loan history as CSV
    Export {
        path: PathBuf,
        #[arg(long)]
        keyword: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum UsersCommand {
    List,
    Delete {
        #[arg(required = true)]
        usernames: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum BackupCommand {
    Create,
    List,
    Restore { name: String },
}

impl Cli {
    pub fn run(&self, library: &Library) -> anyhow::Result<()> {
        match &self.command {
            Command::Register {
                username,
                new_password,
                contact,
                id_card,
                role,
            } => {
                let user = library.services.users.register(CreateUser {
                    username: username.clone(),
                    password: new_password.clone(),
                    contact: contact.clone(),
                    id_card: id_card.clone(),
                    role: *role,
                })?;
                self.print(&user, || println!("Registered {} ({})", user.username, user.role))
            }
            Command::Whoami => {
                let session = self.authenticate(library)?;
                self.print(&session, || println!("{} ({})", session.username, session.role))
            }
            Command::Books(cmd) => self.books(library, &self.authenticate(library)?, cmd),
            Command::Loans(cmd) => self.loans(library, &self.authenticate(library)?, cmd),
            Command::Users(cmd) => self.users(library, &self.authenticate(library)?, cmd),
            Command::Merge { path } => {
                require_admin(&self.authenticate(library)?)?;
                let report = library.services.import.merge_file(path)?;
                self.print(&report, || {
                    println!("Merged {}: {} added, {} skipped", report.kind, report.added, report.skipped)
                })
            }
            Command::Backup(cmd) => self.backup(library, &self.authenticate(library)?, cmd),
        }
    }

    fn authenticate(&self, library: &Library) -> anyhow::Result<Session> {
        let (Some(user), Some(password)) = (&self.user, &self.password) else {
            bail!("--user and --password (or CIRCULATION_USER and CIRCULATION_PASSWORD) are required");
        };
        Ok(library.services.users.authenticate(user, password)?)
    }

    fn books(&self, library: &Library, session: &Session, cmd: &BooksCommand) -> anyhow::Result<()> {
        let catalog = &library.services.catalog;
        match cmd {
            BooksCommand::Search { keyword } => {
                let listings = catalog.search(keyword.as_deref().unwrap_or(""));
                self.print(&listings, || {
                    for l in &listings {
                        println!("{:<12} {:<40} {:<24} {}", l.book.id, l.book.title, l.book.author, l.status);
                    }
                })
            }
            BooksCommand::Show { id } => {
                let book = catalog.get(id)?;
                self.print(&book, || println!("{:#?}", book))
            }
            BooksCommand::Add { id, fields } => {
                require_admin(session)?;
                let mut book = Book::new(id.as_str(), "");
                fields.apply(&mut book);
                let book = catalog.add(book)?;
                self.print(&book, || println!("Added {}", book.id))
            }
            BooksCommand::Edit { id, fields } => {
                require_admin(session)?;
                let mut book = catalog.get(id)?;
                fields.apply(&mut book);
                let book = catalog.edit(id, book)?;
                self.print(&book, || println!("Updated {}", book.id))
            }
            BooksCommand::Delete { ids } => {
                require_admin(session)?;
                let removed = catalog.delete(ids)?;
                self.print(&removed, || println!("Deleted {} book(s)", removed))
            }
            BooksCommand::Import { path } => {
                require_admin(session)?;
                let report = catalog.import_file(path)?;
                self.print(&report, || println!("{}", report.summary()))
            }
            BooksCommand::Stats => {
                let stats = library.services.stats.summary();
                let categories = library.services.stats.category_counts();
                self.print(&(&stats, &categories), || {
                    println!(
                        "{} book(s), {} available, {} on loan; {} loan record(s), {} overdue; {} user(s)",
                        stats.total_books,
                        stats.available_books,
                        stats.on_loan,
                        stats.total_loans,
                        stats.overdue_loans,
                        stats.users
                    );
                    for entry in &categories {
                        println!("{:<24} {}", entry.label, entry.value);
                    }
                })
            }
        }
    }

    fn loans(&self, library: &Library, session: &Session, cmd: &LoansCommand) -> anyhow::Result<()> {
        let loans = &library.services.loans;
        match cmd {
            LoansCommand::Borrow { book_id, borrower } => {
                let borrower = acting_for(session, borrower.as_deref())?;
                let record = loans.borrow(book_id, borrower)?;
                self.print(&record, || {
                    println!(
                        "{} borrowed {}, due {}",
                        record.borrower,
                        record.book_title,
                        format_timestamp(&record.due_time)
                    )
                })
            }
            LoansCommand::Return(selector) => {
                let key = self.select_loan(library, session, selector)?;
                let receipt = loans.return_loan(&key)?;
                self.print(&receipt, || match receipt.overdue_days {
                    Some(days) => println!("Returned {} ({} day(s) overdue)", receipt.record.book_title, days),
                    None => println!("Returned {}", receipt.record.book_title),
                })
            }
            LoansCommand::Renew(selector) => {
                let key = self.select_loan(library, session, selector)?;
                let record = loans.renew(&key)?;
                self.print(&record, || {
                    println!("Renewed {}, now due {}", record.book_title, format_timestamp(&record.due_time))
                })
            }
            LoansCommand::Available { keyword } => {
                let books = loans.available_books(keyword.as_deref().unwrap_or(""));
                self.print(&books, || {
                    for b in &books {
                        println!("{:<12} {:<40} {}", b.id, b.title, b.author);
                    }
                })
            }
            LoansCommand::Outstanding { keyword } => {
                let records = loans.search_outstanding_visible_to(session, keyword.as_deref().unwrap_or(""));
                self.print(&records, || print_records(&records))
            }
            LoansCommand::Overdue => {
                let overdue = loans.overdue_visible_to(session);
                self.print(&overdue, || {
                    for o in &overdue {
                        println!(
                            "{:<16} {:<12} {:<32} due {} ({} day(s) overdue)",
                            o.record.borrower,
                            o.record.book_id,
                            o.record.book_title,
                            format_timestamp(&o.record.due_time),
                            o.days_overdue
                        );
                    }
                })
            }
            LoansCommand::History { keyword } => {
                let records = loans.history(session, keyword.as_deref().unwrap_or(""));
                self.print(&records, || print_records(&records))
            }
            LoansCommand::Export { path, keyword } => {
                require_admin(session)?;
                let records = loans.history(session, keyword.as_deref().unwrap_or(""));
                let count = loans.export(&records, path)?;
                self.print(&count, || println!("Exported {} record(s) to {}", count, path.display()))
            }
        }
    }

    /// Resolve the loan a return or renewal refers to
    fn select_loan(&self, library: &Library, session: &Session, selector: &LoanSelector) -> anyhow::Result<LoanKey> {
        let borrower = acting_for(session, selector.borrower.as_deref())?;

        if let Some(borrowed_at) = &selector.borrowed_at {
            let borrow_time = parse_timestamp(borrowed_at)
                .map_err(|e| AppError::InvalidFormat(format!("borrow time {:?}: {}", borrowed_at, e)))?;
            return Ok(LoanKey::new(borrower, selector.book_id.as_str(), borrow_time));
        }

        library
            .services
            .loans
            .outstanding_for(borrower)
            .into_iter()
            .find(|r| r.book_id == selector.book_id)
            .map(|r| r.key())
            .with_context(|| format!("{} has no outstanding loan of {}", borrower, selector.book_id))
    }

    fn users(&self, library: &Library, session: &Session, cmd: &UsersCommand) -> anyhow::Result<()> {
        require_admin(session)?;
        let users = &library.services.users;
        match cmd {
            UsersCommand::List => {
                let list = users.list();
                self.print(&list, || {
                    for u in &list {
                        println!("{:<16} {:<6} {:<20} {}", u.username, u.role, u.contact, u.id_card);
                    }
                })
            }
            UsersCommand::Delete { usernames } => {
                let outcome = users.delete_users(usernames, session)?;
                self.print(&outcome, || {
                    println!("Deleted {} user(s)", outcome.removed.len());
                    if outcome.session_invalidated {
                        println!("Your own account was deleted; you are now logged out");
                    }
                })
            }
        }
    }

    fn backup(&self, library: &Library, session: &Session, cmd: &BackupCommand) -> anyhow::Result<()> {
        require_admin(session)?;
        let backup = &library.services.backup;
        match cmd {
            BackupCommand::Create => {
                let path = backup.backup_now()?;
                self.print(&path, || println!("Backup written to {}", path.display()))
            }
            BackupCommand::List => {
                let backups = backup.list()?;
                self.print(&backups, || {
                    for b in &backups {
                        println!("{}  {}", b.name, b.files.join(", "));
                    }
                })
            }
            BackupCommand::Restore { name } => {
                let restored = backup.restore(name)?;
                self.print(&restored, || println!("Restored {}", restored.join(", ")))
            }
        }
    }

    fn print<T: Serialize + ?Sized>(&self, value: &T, human: impl FnOnce()) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            human();
        }
        Ok(())
    }
}

fn require_admin(session: &Session) -> anyhow::Result<()> {
    if !session.is_admin() {
        bail!("{} is not an administrator", session.username);
    }
    Ok(())
}

/// Only administrators may act on someone else's loans
fn acting_for<'a>(session: &'a Session, borrower: Option<&'a str>) -> anyhow::Result<&'a str> {
    match borrower {
        Some(other) if other != session.username && !session.is_admin() => {
            bail!("{} may only manage their own loans", session.username)
        }
        Some(other) => Ok(other),
        None => Ok(&session.username),
    }
}

fn print_records(records: &[LoanRecord]) {
    for r in records {
        println!(
            "{:<16} {:<12} {:<32} {}  due {}  {}",
            r.borrower,
            r.book_id,
            r.book_title,
            format_timestamp(&r.borrow_time),
            format_timestamp(&r.due_time),
            match &r.actual_return_time {
                Some(ts) => format!("returned {}", format_timestamp(ts)),
                None => r.status().to_string(),
            }
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_book_fields_only_override_given_values() {
        let mut book = Book::new("B1", "Dune");
        book.author = "Herbert".to_string();

        let fields = BookFields {
            title: Some("Dune Messiah".to_string()),
            quantity: Some(2),
            ..Default::default()
        };
        fields.apply(&mut book);
        assert_eq!(book.title, "Dune Messiah");
        assert_eq!(book.author, "Herbert");
        assert_eq!(book.quantity, Some(2));
    }

    #[test]
    fn test_acting_for() {
        let user = Session {
            username: "alice".to_string(),
            role: Role::User,
        };
        assert_eq!(acting_for(&user, None).unwrap(), "alice");
        assert!(acting_for(&user, Some("bob")).is_err());

        let admin = Session {
            username: "root".to_string(),
            role: Role::Admin,
        };
        assert_eq!(acting_for(&admin, Some("bob")).unwrap(), "bob");
    }

    #[test]
    fn test_parse_loan_commands() {
        let cli = Cli::parse_from([
            "circulation",
            "--user",
            "alice",
            "--password",
            "pw",
            "loans",
            "renew",
            "B1",
            "--borrowed-at",
            "2024-01-01 00:00:00",
        ]);
        match cli.command {
            Command::Loans(LoansCommand::Renew(selector)) => {
                assert_eq!(selector.book_id, "B1");
                assert_eq!(selector.borrowed_at.as_deref(), Some("2024-01-01 00:00:00"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
