//! Flat-file persistence: whole-collection JSON/CSV snapshots, backups and restore.
//!
//! Reads fail open. A missing or unreadable file yields an empty collection and a
//! record that cannot be decoded is skipped, both with a warning. Writes always
//! replace the whole file through a sibling temporary file and a rename, and report
//! failures as [`AppError::StorageUnavailable`].

use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    config::StorageConfig,
    error::{AppError, AppResult},
    models::loan::{format_timestamp, LEDGER_HEADER},
};

pub const BOOKS_FILE: &str = "books.json";
pub const USERS_FILE: &str = "users.json";
pub const LEDGER_FILE: &str = "borrow_records.csv";
const MANIFEST_FILE: &str = "manifest.json";
const BACKUP_NAME_FORMAT: &str = "%Y%m%d%H%M%S";

/// Checksums written next to the copied files of a backup
#[derive(Debug, Serialize, Deserialize)]
struct BackupManifest {
    created_at: String,
    /// file name -> sha256 (hex)
    files: BTreeMap<String, String>,
}

/// A backup folder found under the backup directory
#[derive(Debug, Clone, Serialize)]
pub struct BackupInfo {
    pub name: String,
    pub path: PathBuf,
    pub files: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Storage {
    data_dir: PathBuf,
    backup_dir: PathBuf,
}

impl Storage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            backup_dir: config.backup_dir.clone(),
        }
    }

    /// Create the storage and make sure the directories and data files exist
    pub fn open(config: &StorageConfig) -> AppResult<Self> {
        let storage = Self::new(config);
        storage.init()?;
        Ok(storage)
    }

    /// Create missing directories and empty data files
    pub fn init(&self) -> AppResult<()> {
        fs::create_dir_all(&self.data_dir)?;
        fs::create_dir_all(&self.backup_dir)?;

        for path in [self.books_path(), self.users_path()] {
            if !path.exists() {
                tracing::info!("Creating empty {}", path.display());
                write_atomic(&path, b"[]")?;
            }
        }
        let ledger = self.ledger_path();
        if !ledger.exists() {
            tracing::info!("Creating empty {}", ledger.display());
            write_csv::<crate::models::LoanRecord>(&ledger, &LEDGER_HEADER, &[])?;
        }
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn books_path(&self) -> PathBuf {
        self.data_dir.join(BOOKS_FILE)
    }

    pub fn users_path(&self) -> PathBuf {
        self.data_dir.join(USERS_FILE)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join(LEDGER_FILE)
    }

    /// Take a backup of the three data files into `<backup_dir>/<YYYYMMDDHHMMSS>`
    pub fn backup(&self, now: NaiveDateTime) -> AppResult<PathBuf> {
        let target = self.backup_dir.join(now.format(BACKUP_NAME_FORMAT).to_string());
        fs::create_dir_all(&target)?;

        let mut manifest = BackupManifest {
            created_at: format_timestamp(&now),
            files: BTreeMap::new(),
        };

        for name in [BOOKS_FILE, USERS_FILE, LEDGER_FILE] {
            let source = self.data_dir.join(name);
            if !source.exists() {
                continue;
            }
            let bytes = fs::read(&source)?;
            write_atomic(&target.join(name), &bytes)?;
            manifest.files.insert(name.to_string(), sha256_hex(&bytes));
        }

        let manifest_json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| AppError::Internal(format!("Failed to serialize backup manifest: {}", e)))?;
        write_atomic(&target.join(MANIFEST_FILE), &manifest_json)?;

        tracing::info!("Backup written to {}", target.display());
        Ok(target)
    }

    /// Back up once per calendar day, guarded by a `backup_YYYYMMDD.flag` file
    pub fn check_auto_backup(&self, now: NaiveDateTime) -> AppResult<Option<PathBuf>> {
        let flag = self.auto_backup_flag(now.date());
        if flag.exists() {
            tracing::debug!("Automatic backup already taken today ({})", flag.display());
            return Ok(None);
        }

        let target = self.backup(now)?;
        write_atomic(&flag, b"")?;
        Ok(Some(target))
    }

    fn auto_backup_flag(&self, today: NaiveDate) -> PathBuf {
        self.data_dir.join(format!("backup_{}.flag", today.format("%Y%m%d")))
    }

    /// Backups found under the backup directory, newest first
    pub fn list_backups(&self) -> AppResult<Vec<BackupInfo>> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();
        for entry in fs::read_dir(&self.backup_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let files = [BOOKS_FILE, USERS_FILE, LEDGER_FILE]
                .into_iter()
                .filter(|f| entry.path().join(f).exists())
                .map(str::to_string)
                .collect();
            backups.push(BackupInfo {
                name,
                path: entry.path(),
                files,
            });
        }

        backups.sort_by(|a, b| b.name.cmp(&a.name));
        Ok(backups)
    }

    /// Copy the files of backup `name` back over the live data files.
    ///
    /// When the backup carries a manifest, every file is checked against its
    /// checksum before anything is overwritten.
    pub fn restore(&self, name: &str) -> AppResult<Vec<String>> {
        let source = self.backup_dir.join(name);
        let is_plain_name = !name.is_empty() && !name.starts_with('.') && !name.contains(|c| c == '/' || c == '\\');
        if !is_plain_name || !source.is_dir() {
            return Err(AppError::NotFound(format!("Backup {} not found", name)));
        }

        let manifest: Option<BackupManifest> = match fs::read(source.join(MANIFEST_FILE)) {
            Ok(bytes) => Some(
                serde_json::from_slice(&bytes)
                    .map_err(|e| AppError::InvalidFormat(format!("backup manifest: {}", e)))?,
            ),
            Err(_) => None,
        };

        let mut contents = Vec::new();
        for file in [BOOKS_FILE, USERS_FILE, LEDGER_FILE] {
            let path = source.join(file);
            if !path.exists() {
                continue;
            }
            let bytes = fs::read(&path)?;
            if let Some(expected) = manifest.as_ref().and_then(|m| m.files.get(file)) {
                if *expected != sha256_hex(&bytes) {
                    return Err(AppError::InvalidFormat(format!(
                        "Checksum mismatch for {} in backup {}",
                        file, name
                    )));
                }
            }
            contents.push((file, bytes));
        }

        if contents.is_empty() {
            return Err(AppError::NotFound(format!("Backup {} holds no data files", name)));
        }

        fs::create_dir_all(&self.data_dir)?;
        let mut restored = Vec::new();
        for (file, bytes) in contents {
            write_atomic(&self.data_dir.join(file), &bytes)?;
            restored.push(file.to_string());
        }

        tracing::info!("Restored {} from backup {}", restored.join(", "), name);
        Ok(restored)
    }
}

/// Load a JSON array, skipping elements that do not decode
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            if path.exists() {
                tracing::warn!("Cannot read {}: {}; using an empty collection", path.display(), e);
            }
            return Vec::new();
        }
    };

    let values: Vec<serde_json::Value> = match serde_json::from_slice(&bytes) {
        Ok(values) => values,
        Err(e) => {
            tracing::warn!("Corrupt JSON in {}: {}; using an empty collection", path.display(), e);
            return Vec::new();
        }
    };

    let total = values.len();
    let items: Vec<T> = values
        .into_iter()
        .enumerate()
        .filter_map(|(i, value)| match serde_json::from_value(value) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!("Skipping entry {} of {}: {}", i, path.display(), e);
                None
            }
        })
        .collect();

    tracing::debug!("Loaded {}/{} entries from {}", items.len(), total, path.display());
    items
}

/// Replace `path` with a pretty-printed JSON array
pub fn save_json<T: Serialize>(path: &Path, items: &[T]) -> AppResult<()> {
    let bytes = serde_json::to_vec_pretty(items)
        .map_err(|e| AppError::Internal(format!("Failed to serialize {}: {}", path.display(), e)))?;
    write_atomic(path, &bytes)
}

/// Load a CSV table with a header row, skipping rows that do not decode
pub fn load_csv<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let mut reader = match csv::ReaderBuilder::new().flexible(true).from_path(path) {
        Ok(reader) => reader,
        Err(e) => {
            if path.exists() {
                tracing::warn!("Cannot read {}: {}; using an empty collection", path.display(), e);
            }
            return Vec::new();
        }
    };

    let mut rows = Vec::new();
    for (i, row) in reader.deserialize().enumerate() {
        match row {
            Ok(row) => rows.push(row),
            Err(e) => tracing::warn!("Skipping row {} of {}: {}", i + 1, path.display(), e),
        }
    }
    tracing::debug!("Loaded {} rows from {}", rows.len(), path.display());
    rows
}

/// Replace `path` with a CSV table. The header is written even when `rows` is empty.
pub fn write_csv<T: Serialize>(path: &Path, header: &[&str], rows: &[T]) -> AppResult<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    writer.write_record(header).map_err(csv_error)?;
    for row in rows {
        writer.serialize(row).map_err(csv_error)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::StorageUnavailable(e.to_string()))?;
    write_atomic(path, &bytes)
}

fn csv_error(e: csv::Error) -> AppError {
    AppError::StorageUnavailable(format!("CSV write failed: {}", e))
}

/// Write to a sibling temporary file, then rename it over `path`
fn write_atomic(path: &Path, bytes: &[u8]) -> AppResult<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| AppError::StorageUnavailable(format!("Invalid file path {}", path.display())))?;
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    let result = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(e) = result {
        // best effort, the original file is untouched
        let _ = fs::remove_file(&tmp);
        tracing::error!("Failed to write {}: {}", path.display(), e);
        return Err(AppError::StorageUnavailable(format!("{}: {}", path.display(), e)));
    }
    Ok(())
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{loan::parse_timestamp, Book, LoanRecord};
    use tempfile::TempDir;

    fn storage(dir: &TempDir) -> Storage {
        Storage::open(&StorageConfig {
            data_dir: dir.path().join("data"),
            backup_dir: dir.path().join("backup"),
            auto_backup: true,
        })
        .unwrap()
    }

    #[test]
    fn test_init_creates_empty_files() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        assert_eq!(fs::read_to_string(storage.books_path()).unwrap(), "[]");
        assert_eq!(
            fs::read_to_string(storage.ledger_path()).unwrap(),
            "borrower,book_id,book_title,borrow_time,due_time,actual_return_time\n"
        );
        assert!(load_json::<Book>(&storage.users_path()).is_empty());
    }

    #[test]
    fn test_load_fails_open() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        fs::write(storage.books_path(), "{ not json").unwrap();
        assert!(load_json::<Book>(&storage.books_path()).is_empty());

        assert!(load_json::<Book>(&dir.path().join("missing.json")).is_empty());
        assert!(load_csv::<LoanRecord>(&dir.path().join("missing.csv")).is_empty());
    }

    #[test]
    fn test_load_skips_bad_entries() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        fs::write(storage.books_path(), r#"[{"id":"B1"},{"title":"no id"},{"id":"B2"}]"#).unwrap();
        let books: Vec<Book> = load_json(&storage.books_path());
        assert_eq!(books.len(), 2);

        fs::write(
            storage.ledger_path(),
            "borrower,book_id,book_title,borrow_time,due_time,actual_return_time\n\
             ann,B1,Dune,2024-01-01 00:00:00,2024-01-31 00:00:00,\n\
             ann,B2,Emma,yesterday,2024-01-31 00:00:00,\n",
        )
        .unwrap();
        let loans: Vec<LoanRecord> = load_csv(&storage.ledger_path());
        assert_eq!(loans.len(), 1);
        assert_eq!(loans[0].book_id, "B1");
    }

    #[test]
    fn test_save_json_keeps_non_ascii() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        save_json(&storage.books_path(), &[Book::new("B1", "红楼梦")]).unwrap();
        let text = fs::read_to_string(storage.books_path()).unwrap();
        assert!(text.contains("红楼梦"));
        assert!(!dir.path().join("data").join(".books.json.tmp").exists());
    }

    #[test]
    fn test_write_to_missing_directory_is_storage_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope").join("books.json");
        let err = save_json::<Book>(&path, &[]).unwrap_err();
        assert!(matches!(err, AppError::StorageUnavailable(_)));
    }

    #[test]
    fn test_auto_backup_once_per_day() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        let morning = parse_timestamp("2024-06-01 08:00:00").unwrap();
        let evening = parse_timestamp("2024-06-01 20:00:00").unwrap();
        let next_day = parse_timestamp("2024-06-02 08:00:00").unwrap();

        assert!(storage.check_auto_backup(morning).unwrap().is_some());
        assert!(storage.check_auto_backup(evening).unwrap().is_none());
        assert!(storage.data_dir().join("backup_20240601.flag").exists());
        assert!(storage.check_auto_backup(next_day).unwrap().is_some());

        let backups = storage.list_backups().unwrap();
        assert_eq!(backups.len(), 2);
        assert_eq!(backups[0].name, "20240602080000");
        assert_eq!(backups[0].files.len(), 3);
    }

    #[test]
    fn test_backup_and_restore() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        save_json(&storage.books_path(), &[Book::new("B1", "Dune")]).unwrap();
        let now = parse_timestamp("2024-06-01 08:00:00").unwrap();
        storage.backup(now).unwrap();

        save_json::<Book>(&storage.books_path(), &[]).unwrap();
        let restored = storage.restore("20240601080000").unwrap();
        assert_eq!(restored, vec![BOOKS_FILE, USERS_FILE, LEDGER_FILE]);

        let books: Vec<Book> = load_json(&storage.books_path());
        assert_eq!(books.len(), 1);

        assert!(matches!(storage.restore("19990101000000"), Err(AppError::NotFound(_))));
        assert!(matches!(storage.restore("../data"), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_restore_rejects_tampered_backup() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        let now = parse_timestamp("2024-06-01 08:00:00").unwrap();
        let target = storage.backup(now).unwrap();
        fs::write(target.join(BOOKS_FILE), r#"[{"id":"X"}]"#).unwrap();

        assert!(matches!(
            storage.restore("20240601080000"),
            Err(AppError::InvalidFormat(_))
        ));
    }
}
