//! Service level tracking: one record per engine run.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage::{append_json_line, read_json_lines};

/// One engine run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SloRecord {
    /// When the run finished.
    pub ts: DateTime<Utc>,
    /// Whether the run healed the failure.
    pub success: bool,
    /// Wall time of the run.
    pub latency_ms: f64,
    /// CI run identifier.
    #[serde(default)]
    pub run_id: String,
    /// Terminal outcome name.
    #[serde(default)]
    pub outcome: String,
}

/// Aggregates over a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SloMetrics {
    /// Successful runs / total runs, 0 when empty.
    pub success_rate: f64,
    /// Mean latency, 0 when empty.
    pub avg_latency_ms: f64,
    /// Runs in the window.
    pub total: usize,
}

/// JSON-lines ledger of [`SloRecord`].
#[derive(Debug, Clone)]
pub struct SloLedger {
    path: PathBuf,
}

impl SloLedger {
    /// Ledger at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Ledger file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the record is not written.
    pub async fn record(&self, record: SloRecord) -> Result<(), StorageError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || append_json_line(&path, &record))
            .await
            .map_err(|e| StorageError::Io {
                path: self.path.display().to_string(),
                message: format!("slo writer task failed: {e}"),
            })?
    }

    /// Metrics over records newer than `now - window`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the ledger exists but cannot be read.
    pub fn metrics(&self, window: Duration, now: DateTime<Utc>) -> Result<SloMetrics, StorageError> {
        let cutoff = now - window;
        let records: Vec<SloRecord> = read_json_lines::<SloRecord>(&self.path)?
            .into_iter()
            .filter(|r| r.ts >= cutoff)
            .collect();
        Ok(aggregate(&records))
    }
}

#[allow(clippy::cast_precision_loss)]
fn aggregate(records: &[SloRecord]) -> SloMetrics {
    if records.is_empty() {
        return SloMetrics::default();
    }
    let total = records.len();
    let success = records.iter().filter(|r| r.success).count();
    let latency: f64 = records.iter().map(|r| r.latency_ms).sum();
    SloMetrics {
        success_rate: success as f64 / total as f64,
        avg_latency_ms: latency / total as f64,
        total,
    }
}
