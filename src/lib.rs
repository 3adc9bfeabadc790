//! Circulation
//!
//! Book circulation tracker for a single library branch: catalog management,
//! the borrow/return/renew workflow and user accounts, kept in flat JSON and
//! CSV files.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;
pub mod storage;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

use repository::Repository;
use services::{Clock, Services, SystemClock};
use storage::Storage;

/// Application state shared by every front end
#[derive(Clone)]
pub struct Library {
    pub config: Arc<AppConfig>,
    pub services: Arc<Services>,
}

impl Library {
    /// Open the data directory named by `config`, creating missing files
    pub fn open(config: AppConfig) -> AppResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: AppConfig, clock: Arc<dyn Clock>) -> AppResult<Self> {
        let storage = Storage::open(&config.storage)?;
        tracing::debug!("Data directory: {}", storage.data_dir().display());

        let services = Services::new(Repository::new(storage), &config, clock);
        Ok(Self {
            config: Arc::new(config),
            services: Arc::new(services),
        })
    }
}
