//! Pre-write backups.
//!
//! Each backup is `<file name>_<unix millis>.bak`, created with create-new
//! semantics and synced before the path is returned, so a backup reference
//! recorded in the audit log always points at durable content.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::StorageError;

/// Snapshot store for file contents.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BackupStore: Send + Sync {
    /// Save `content` as the prior state of `target`. Returns the backup path.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backup is not durably written.
    async fn snapshot(&self, target: &Path, content: &str) -> Result<PathBuf, StorageError>;

    /// Read a backup.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::BackupNotFound`] if it does not exist.
    async fn read(&self, backup: &Path) -> Result<String, StorageError>;

    /// Newest backup for a file name, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backup directory cannot be read.
    async fn latest_for(&self, file_name: &str) -> Result<Option<PathBuf>, StorageError>;
}

/// Backups as plain files in one directory.
#[derive(Debug, Clone)]
pub struct FileBackupStore {
    dir: PathBuf,
}

impl FileBackupStore {
    /// Store rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Backup directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Millisecond stamp of a backup named `<file_name>_<millis>.bak`.
    fn stamp_of(backup_name: &str, file_name: &str) -> Option<i64> {
        backup_name
            .strip_prefix(file_name)?
            .strip_prefix('_')?
            .strip_suffix(".bak")?
            .parse()
            .ok()
    }
}

#[async_trait]
impl BackupStore for FileBackupStore {
    async fn snapshot(&self, target: &Path, content: &str) -> Result<PathBuf, StorageError> {
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| StorageError::Io {
                path: target.display().to_string(),
                message: "target has no file name".into(),
            })?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StorageError::io(&self.dir, &e))?;

        let mut stamp = Utc::now().timestamp_millis();
        loop {
            let path = self.dir.join(format!("{name}_{stamp}.bak"));
            let mut file = match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    stamp += 1;
                    continue;
                }
                Err(e) => return Err(StorageError::io(&path, &e)),
            };

            let written = async {
                file.write_all(content.as_bytes()).await?;
                file.sync_all().await
            }
            .await;
            if let Err(e) = written {
                drop(file);
                let _ = tokio::fs::remove_file(&path).await;
                return Err(StorageError::io(&path, &e));
            }
            debug!(backup = %path.display(), "Backup written");
            return Ok(path);
        }
    }

    async fn read(&self, backup: &Path) -> Result<String, StorageError> {
        match tokio::fs::read_to_string(backup).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::BackupNotFound {
                    path: backup.display().to_string(),
                })
            }
            Err(e) => Err(StorageError::io(backup, &e)),
        }
    }

    async fn latest_for(&self, file_name: &str) -> Result<Option<PathBuf>, StorageError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(&self.dir, &e)),
        };

        let mut newest: Option<(i64, PathBuf)> = None;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&self.dir, &e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(stamp) = Self::stamp_of(&name, file_name) {
                if newest.as_ref().is_none_or(|(best, _)| stamp > *best) {
                    newest = Some((stamp, entry.path()));
                }
            }
        }
        Ok(newest.map(|(_, path)| path))
    }
}
