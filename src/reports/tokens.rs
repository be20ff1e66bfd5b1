//! Token usage ledger.
//!
//! Usage is approximated as one token per four characters of prompt or
//! answer, which is close enough for budget alerts and cost trending.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::StorageError;
use crate::storage::{append_json_line, read_json_lines};

/// Approximate tokens for `chars` characters.
#[must_use]
pub const fn approx_tokens(chars: usize) -> u64 {
    (chars / 4) as u64
}

/// One model call's usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// When the call finished.
    pub ts: DateTime<Utc>,
    /// CI run identifier.
    #[serde(default)]
    pub run_id: String,
    /// Model used.
    pub model: String,
    /// Prompt tokens.
    pub input_tokens: u64,
    /// Answer tokens.
    pub output_tokens: u64,
    /// `input_tokens + output_tokens`.
    pub total: u64,
    /// Engine run correlation id.
    #[serde(default)]
    pub correlation_id: Option<String>,
}

impl TokenUsage {
    /// Usage stamped now.
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        model: impl Into<String>,
        input_tokens: u64,
        output_tokens: u64,
        correlation_id: Option<String>,
    ) -> Self {
        Self {
            ts: Utc::now(),
            run_id: run_id.into(),
            model: model.into(),
            input_tokens,
            output_tokens,
            total: input_tokens + output_tokens,
            correlation_id,
        }
    }
}

/// JSON-lines ledger of [`TokenUsage`].
#[derive(Debug, Clone)]
pub struct TokenLedger {
    path: PathBuf,
    budget: u64,
}

impl TokenLedger {
    /// Ledger at `path` alerting at `budget` tokens per correlation id.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, budget: u64) -> Self {
        Self {
            path: path.into(),
            budget,
        }
    }

    /// Ledger file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Per-correlation-id alert threshold.
    #[must_use]
    pub const fn budget(&self) -> u64 {
        self.budget
    }

    /// Append one usage record.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the record is not written.
    pub async fn record(&self, usage: TokenUsage) -> Result<(), StorageError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || append_json_line(&path, &usage))
            .await
            .map_err(|e| StorageError::Io {
                path: self.path.display().to_string(),
                message: format!("token writer task failed: {e}"),
            })?
    }

    /// Every readable record.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the ledger exists but cannot be read.
    pub fn entries(&self) -> Result<Vec<TokenUsage>, StorageError> {
        read_json_lines(&self.path)
    }

    /// Tokens spent under `correlation_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the ledger exists but cannot be read.
    pub fn total_for(&self, correlation_id: &str) -> Result<u64, StorageError> {
        Ok(self
            .entries()?
            .iter()
            .filter(|u| u.correlation_id.as_deref() == Some(correlation_id))
            .map(|u| u.total)
            .sum())
    }

    /// Record usage and report whether the correlation id is now at or over budget.
    ///
    /// Ledger failures are logged; accounting never fails a run.
    pub async fn record_and_check(&self, usage: TokenUsage) -> bool {
        let correlation_id = usage.correlation_id.clone();
        if let Err(e) = self.record(usage).await {
            warn!(error = %e, "Failed to record token usage");
            return false;
        }
        let Some(cid) = correlation_id else {
            return false;
        };
        match self.total_for(&cid) {
            Ok(total) if total >= self.budget => {
                warn!(correlation_id = %cid, total, budget = self.budget, "Token budget threshold exceeded");
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!(error = %e, "Failed to read token ledger");
                false
            }
        }
    }
}
