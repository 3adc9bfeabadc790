//! Repository layer: in-memory snapshots of the three collections and their files

pub mod books;
pub mod loans;
pub mod users;

pub use books::Catalog;
pub use loans::{Ledger, LoanPolicy};
pub use users::UserDirectory;

use crate::storage::Storage;

/// Main repository struct holding the storage location
#[derive(Clone)]
pub struct Repository {
    pub storage: Storage,
    pub books: books::BooksRepository,
    pub users: users::UsersRepository,
    pub loans: loans::LoansRepository,
}

impl Repository {
    /// Create a new repository over the given storage
    pub fn new(storage: Storage) -> Self {
        Self {
            books: books::BooksRepository::new(storage.clone()),
            users: users::UsersRepository::new(storage.clone()),
            loans: loans::LoansRepository::new(storage.clone()),
            storage,
        }
    }
}
