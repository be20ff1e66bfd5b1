//! Undoing applied fixes from their backups.
//!
//! The audit log is the undo stack: every `fix_applied` entry names the file,
//! its backup and a `fix_id`; every successful restore appends
//! `fix_rolled_back` with the same `fix_id`. Pending fixes are the applied
//! ones with no matching rollback, newest first.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::StorageError;
use crate::storage::{write_atomic, AuditEntry, AuditEvent, AuditLog, BackupStore};

/// Outcome of a rollback request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackReport {
    /// Fixes selected for undo.
    pub attempted: usize,
    /// Fixes restored.
    pub restored: usize,
    /// Files restored, in order.
    pub files: Vec<PathBuf>,
    /// One message per failed restore.
    pub failures: Vec<String>,
}

impl RollbackReport {
    /// True if at least one fix was selected and all were restored.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.attempted > 0 && self.restored == self.attempted
    }

    /// One-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.attempted == 0 {
            "No fix to rollback".to_string()
        } else {
            format!("Rolled back {}/{} fix(es)", self.restored, self.attempted)
        }
    }
}

/// Identity of a `fix_applied` entry. Entries without a `fix_id` fall back
/// to timestamp and file.
fn fix_key(entry: &AuditEntry) -> String {
    entry.detail_str("fix_id").map_or_else(
        || {
            format!(
                "{}|{}",
                entry.ts.to_rfc3339(),
                entry.detail_str("file").unwrap_or_default()
            )
        },
        ToString::to_string,
    )
}

/// Restores files from backups recorded in the audit log.
pub struct RollbackManager {
    audit: AuditLog,
    backups: Arc<dyn BackupStore>,
}

impl std::fmt::Debug for RollbackManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollbackManager")
            .field("audit", &self.audit)
            .finish_non_exhaustive()
    }
}

impl RollbackManager {
    /// Create a manager over an audit log and backup store.
    #[must_use]
    pub fn new(audit: AuditLog, backups: Arc<dyn BackupStore>) -> Self {
        Self { audit, backups }
    }

    /// Applied fixes not yet rolled back, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the audit log cannot be read.
    pub fn pending(&self) -> Result<Vec<AuditEntry>, StorageError> {
        let entries = self.audit.entries()?;
        let undone: HashSet<String> = entries
            .iter()
            .filter(|e| e.event == AuditEvent::FixRolledBack)
            .filter_map(|e| e.detail_str("fix_id").map(ToString::to_string))
            .collect();
        Ok(entries
            .into_iter()
            .rev()
            .filter(|e| e.event == AuditEvent::FixApplied && !undone.contains(&fix_key(e)))
            .collect())
    }

    /// Restore the most recent pending fix.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the audit log cannot be read.
    pub async fn restore_last(&self) -> Result<RollbackReport, StorageError> {
        self.restore_n(1).await
    }

    /// Restore the `n` most recent pending fixes, newest first.
    ///
    /// A failed restore is recorded and the next one is still attempted.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the audit log cannot be read.
    pub async fn restore_n(&self, n: usize) -> Result<RollbackReport, StorageError> {
        let selected: Vec<AuditEntry> = self.pending()?.into_iter().take(n).collect();
        let mut report = RollbackReport {
            attempted: selected.len(),
            ..RollbackReport::default()
        };

        for fix in &selected {
            match self.restore_one(fix).await {
                Ok(file) => {
                    report.restored += 1;
                    report.files.push(file);
                }
                Err(message) => {
                    warn!(run_id = %fix.run_id, error = %message, "Rollback of fix failed");
                    report.failures.push(message);
                }
            }
        }

        info!(
            attempted = report.attempted,
            restored = report.restored,
            "Rollback finished"
        );
        Ok(report)
    }

    async fn backup_content(&self, file: &Path, recorded: Option<&str>) -> Result<(PathBuf, String), String> {
        if let Some(backup) = recorded.map(PathBuf::from) {
            match self.backups.read(&backup).await {
                Ok(content) => return Ok((backup, content)),
                Err(e) => warn!(backup = %backup.display(), error = %e, "Recorded backup unusable, searching by file name"),
            }
        }

        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| format!("{} has no file name", file.display()))?;
        let latest = self
            .backups
            .latest_for(&name)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("No backup found for {}", file.display()))?;
        let content = self.backups.read(&latest).await.map_err(|e| e.to_string())?;
        Ok((latest, content))
    }

    async fn restore_one(&self, fix: &AuditEntry) -> Result<PathBuf, String> {
        let file = fix
            .detail_str("file")
            .map(PathBuf::from)
            .ok_or_else(|| "No file path in fix entry".to_string())?;
        let (backup, content) = self.backup_content(&file, fix.detail_str("backup")).await?;

        if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("{}: {e}", parent.display()))?;
        }
        write_atomic(&file, &content).await.map_err(|e| e.to_string())?;

        let entry = AuditEntry::new(AuditEvent::FixRolledBack, fix.run_id.clone(), fix.provider.clone())
            .with_detail("fix_id", fix_key(fix))
            .with_detail("file", file.display().to_string())
            .with_detail("backup", backup.display().to_string());
        self.audit
            .append_async(entry)
            .await
            .map_err(|e| format!("restored {} but audit failed: {e}", file.display()))?;

        info!(file = %file.display(), backup = %backup.display(), "Restored file from backup");
        Ok(file)
    }
}
