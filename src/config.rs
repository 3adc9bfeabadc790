//! Configuration management for the circulation tracker

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding books.json, users.json and borrow_records.csv
    pub data_dir: PathBuf,
    /// Directory receiving timestamped backup folders
    pub backup_dir: PathBuf,
    /// Take one automatic backup per calendar day at startup
    pub auto_backup: bool,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct LoansConfig {
    pub loan_days: i64,
    pub renewal_days: i64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    /// When set, a daily rolling log file is written there as well
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub loans: LoansConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config/default")
    }

    /// Same as [`AppConfig::load`] with an explicit base file (extension optional)
    pub fn load_from(base: &str) -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config = Config::builder()
            .add_source(File::with_name(base).required(false))
            // Layer on the environment-specific file
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // CIRCULATION_STORAGE__DATA_DIR=/srv/library ...
            .add_source(
                Environment::with_prefix("CIRCULATION")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("storage.data_dir", env::var("LIBRARY_DATA_DIR").ok())?
            .build()?;

        config.try_deserialize()
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            backup_dir: PathBuf::from("backup"),
            auto_backup: true,
        }
    }
}

impl Default for LoansConfig {
    fn default() -> Self {
        Self {
            loan_days: 30,
            renewal_days: 15,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            directory: None,
        }
    }
}
