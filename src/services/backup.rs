//! Backup and restore of the data directory

use std::{path::PathBuf, sync::Arc};

use crate::{error::AppResult, repository::Repository, storage::BackupInfo};

use super::Clock;

#[derive(Clone)]
pub struct BackupService {
    repository: Repository,
    auto_backup: bool,
    clock: Arc<dyn Clock>,
}

impl BackupService {
    pub fn new(repository: Repository, auto_backup: bool, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            auto_backup,
            clock,
        }
    }

    /// Take a backup right now
    pub fn backup_now(&self) -> AppResult<PathBuf> {
        self.repository.storage.backup(self.clock.now())
    }

    /// Take the daily backup if automatic backups are enabled and none was taken today
    pub fn auto_backup(&self) -> AppResult<Option<PathBuf>> {
        if !self.auto_backup {
            return Ok(None);
        }
        self.repository.storage.check_auto_backup(self.clock.now())
    }

    pub fn list(&self) -> AppResult<Vec<BackupInfo>> {
        self.repository.storage.list_backups()
    }

    /// Copy a backup back over the live data files
    pub fn restore(&self, name: &str) -> AppResult<Vec<String>> {
        tracing::warn!("Restoring backup {} over the live data", name);
        self.repository.storage.restore(name)
    }
}

#[cfg(test)]
mod tests {
    use crate::{error::AppError, models::book::Book, services::testing::Fixture};

    #[test]
    fn test_auto_backup_once_per_day() {
        let fx = Fixture::new("2024-01-01 08:00:00");
        let backup = &fx.services.backup;

        assert!(backup.auto_backup().unwrap().is_some());
        fx.set_now("2024-01-01 18:00:00");
        assert!(backup.auto_backup().unwrap().is_none());
        fx.set_now("2024-01-02 08:00:00");
        assert!(backup.auto_backup().unwrap().is_some());

        let names: Vec<String> = backup.list().unwrap().into_iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["20240102080000", "20240101080000"]);
    }

    #[test]
    fn test_restore_brings_back_deleted_books() {
        let fx = Fixture::new("2024-01-01 08:00:00");
        fx.services.catalog.add(Book::new("B1", "Dune")).unwrap();
        let target = fx.services.backup.backup_now().unwrap();
        let name = target.file_name().unwrap().to_string_lossy().into_owned();

        fx.services.catalog.delete(&["B1"]).unwrap();
        assert!(fx.services.catalog.search("").is_empty());

        let restored = fx.services.backup.restore(&name).unwrap();
        assert_eq!(restored.len(), 3);
        assert_eq!(fx.services.catalog.get("B1").unwrap().title, "Dune");

        assert!(matches!(fx.services.backup.restore("19990101000000"), Err(AppError::NotFound(_))));
    }
}
