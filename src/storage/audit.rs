//! Append-only audit log.
//!
//! One JSON object per line: `{ts, event, run_id, provider, details}`.
//! Appends take an exclusive advisory lock so concurrent writers (threads or
//! processes) never interleave lines, and are synced before returning.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::fs::{append_json_line, read_json_lines};
use crate::error::StorageError;

/// Audit event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    /// A run reached the analysis stage.
    AnalysisStarted,
    /// No usable diagnosis was produced.
    AnalysisFailed,
    /// A fix was written to disk.
    FixApplied,
    /// Confidence did not clear the threshold.
    NeedsHumanReview,
    /// The target path or generated code was refused by a guardrail.
    GuardrailBlocked,
    /// Generated code contained a secret.
    SecretBlocked,
    /// The candidate failed pre-apply verification.
    PreVerifyFailed,
    /// The backup could not be written; nothing was changed.
    BackupFailed,
    /// Target resolution, read, fix generation or write failed.
    ApplyFailed,
    /// Shutdown was requested before the run finished.
    RunCancelled,
    /// A previously applied fix was restored from backup.
    FixRolledBack,
    /// An event written by a newer version.
    #[serde(other)]
    Unknown,
}

impl AuditEvent {
    /// The serialized name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AnalysisStarted => "analysis_started",
            Self::AnalysisFailed => "analysis_failed",
            Self::FixApplied => "fix_applied",
            Self::NeedsHumanReview => "needs_human_review",
            Self::GuardrailBlocked => "guardrail_blocked",
            Self::SecretBlocked => "secret_blocked",
            Self::PreVerifyFailed => "pre_verify_failed",
            Self::BackupFailed => "backup_failed",
            Self::ApplyFailed => "apply_failed",
            Self::RunCancelled => "run_cancelled",
            Self::FixRolledBack => "fix_rolled_back",
            Self::Unknown => "unknown",
        }
    }
}

/// One audit line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the entry was written.
    pub ts: DateTime<Utc>,
    /// What happened.
    pub event: AuditEvent,
    /// CI run identifier.
    pub run_id: String,
    /// CI provider name.
    pub provider: String,
    /// Event-specific fields.
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl AuditEntry {
    /// New entry stamped now.
    #[must_use]
    pub fn new(event: AuditEvent, run_id: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            event,
            run_id: run_id.into(),
            provider: provider.into(),
            details: Map::new(),
        }
    }

    /// Add a detail field.
    #[must_use]
    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    /// A detail field as a string.
    #[must_use]
    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.details.get(key).and_then(Value::as_str)
    }
}

/// Handle to an audit log file.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    /// Log at `path`. The file and its directory are created on first append.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Log file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry durably. Blocking.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the line is not written and synced.
    pub fn append(&self, entry: &AuditEntry) -> Result<(), StorageError> {
        append_json_line(&self.path, entry)?;
        debug!(event = entry.event.as_str(), run_id = %entry.run_id, "Audit entry appended");
        Ok(())
    }

    /// [`AuditLog::append`] on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the line is not written and synced.
    pub async fn append_async(&self, entry: AuditEntry) -> Result<(), StorageError> {
        let log = self.clone();
        tokio::task::spawn_blocking(move || log.append(&entry))
            .await
            .map_err(|e| StorageError::Io {
                path: self.path.display().to_string(),
                message: format!("audit writer task failed: {e}"),
            })?
    }

    /// All readable entries in file order. Malformed lines are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the file exists but cannot be read.
    pub fn entries(&self) -> Result<Vec<AuditEntry>, StorageError> {
        read_json_lines(&self.path)
    }

    /// `fix_applied` entries in file order.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the file exists but cannot be read.
    pub fn fix_history(&self) -> Result<Vec<AuditEntry>, StorageError> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|e| e.event == AuditEvent::FixApplied)
            .collect())
    }
}
