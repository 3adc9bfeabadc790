//! Business logic services
//!
//! Every mutating operation loads the whole collection, applies the change in
//! memory and writes the whole collection back.

pub mod backup;
pub mod catalog;
pub mod import;
pub mod loans;
pub mod stats;
pub mod users;

use std::sync::{Arc, Mutex};

use chrono::{Local, NaiveDateTime};

use crate::{config::AppConfig, repository::Repository};

/// Source of "now" for loan timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall clock; the ledger stores naive local timestamps
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: NaiveDateTime) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub catalog: catalog::CatalogService,
    pub loans: loans::LoansService,
    pub users: users::UsersService,
    pub stats: stats::StatsService,
    pub import: import::ImportService,
    pub backup: backup::BackupService,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            catalog: catalog::CatalogService::new(repository.clone()),
            loans: loans::LoansService::new(repository.clone(), config.loans.into(), clock.clone()),
            users: users::UsersService::new(repository.clone()),
            stats: stats::StatsService::new(repository.clone(), clock.clone()),
            import: import::ImportService::new(repository.clone()),
            backup: backup::BackupService::new(repository, config.storage.auto_backup, clock),
        }
    }
}
