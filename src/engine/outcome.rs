//! Inputs and terminal results of one engine run.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::providers::Provider;
use crate::reports::ErrorCategory;
use crate::traits::Diagnosis;

/// What to heal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// CI run identifier.
    pub run_id: String,
    /// Where the logs came from.
    pub provider: Provider,
    /// Provider context line given to the model.
    pub context: String,
    /// Raw failure log.
    pub logs: String,
    /// Stop before any write.
    pub dry_run: bool,
}

impl RunRequest {
    /// A request that applies fixes.
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        provider: Provider,
        context: impl Into<String>,
        logs: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            provider,
            context: context.into(),
            logs: logs.into(),
            dry_run: false,
        }
    }

    /// Toggle dry-run.
    #[must_use]
    pub const fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Stage at which a shutdown request stopped the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Before the cache check and model call.
    Analyzing,
    /// After the confidence gate, before any file access.
    Applying,
}

impl Stage {
    /// Stage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Analyzing => "analyzing",
            Self::Applying => "applying",
        }
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The fix was written.
    Applied {
        /// Resolved target.
        file: PathBuf,
        /// Snapshot of the prior content.
        backup: PathBuf,
        /// Model explanation.
        explanation: String,
    },
    /// Dry run: every check passed, nothing was written.
    DryRun {
        /// Resolved target.
        file: PathBuf,
        /// Model explanation.
        explanation: String,
    },
    /// Confidence did not clear the threshold.
    NeedsReview {
        /// Diagnosis confidence.
        confidence: f64,
    },
    /// No usable diagnosis.
    AnalysisFailed {
        /// Error message.
        reason: String,
        /// Failure category.
        category: ErrorCategory,
    },
    /// The path or generated code was refused by policy.
    GuardrailBlocked {
        /// Policy reason.
        reason: String,
    },
    /// Generated code contained a secret.
    SecretBlocked {
        /// Finding description.
        reason: String,
    },
    /// The candidate failed its syntax check.
    PreVerifyFailed {
        /// Checker output.
        message: String,
    },
    /// The backup could not be written; the target is unchanged.
    BackupFailed {
        /// Error message.
        reason: String,
    },
    /// Resolution, read, fix generation or write failed.
    ApplyFailed {
        /// Error message.
        reason: String,
    },
    /// Shutdown was requested.
    Cancelled {
        /// Where the run stopped.
        stage: Stage,
    },
}

impl RunOutcome {
    /// Outcome name as written to the SLO ledger.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Applied { .. } => "applied",
            Self::DryRun { .. } => "dry_run",
            Self::NeedsReview { .. } => "needs_review",
            Self::AnalysisFailed { .. } => "analysis_failed",
            Self::GuardrailBlocked { .. } => "guardrail_blocked",
            Self::SecretBlocked { .. } => "secret_blocked",
            Self::PreVerifyFailed { .. } => "pre_verify_failed",
            Self::BackupFailed { .. } => "backup_failed",
            Self::ApplyFailed { .. } => "apply_failed",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    /// True for outcomes that produced a usable fix.
    #[must_use]
    pub const fn is_healed(&self) -> bool {
        matches!(self, Self::Applied { .. } | Self::DryRun { .. })
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied { file, .. } => write!(f, "applied fix to {}", file.display()),
            Self::DryRun { file, .. } => write!(f, "dry run: would fix {}", file.display()),
            Self::NeedsReview { confidence } => {
                write!(f, "needs human review (confidence {confidence:.2})")
            }
            Self::AnalysisFailed { reason, category } => {
                write!(f, "analysis failed [{category}]: {reason}")
            }
            Self::GuardrailBlocked { reason } => write!(f, "guardrail blocked: {reason}"),
            Self::SecretBlocked { reason } => write!(f, "secret blocked: {reason}"),
            Self::PreVerifyFailed { message } => write!(f, "pre-verify failed: {message}"),
            Self::BackupFailed { reason } => write!(f, "backup failed: {reason}"),
            Self::ApplyFailed { reason } => write!(f, "apply failed: {reason}"),
            Self::Cancelled { stage } => write!(f, "cancelled before {}", stage.as_str()),
        }
    }
}

/// Everything known about a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// `heal-<run_id>-<unix secs>`.
    pub correlation_id: String,
    /// CI run identifier.
    pub run_id: String,
    /// Provider.
    pub provider: Provider,
    /// Diagnosis used, if analysis succeeded.
    pub diagnosis: Option<Diagnosis>,
    /// Whether the diagnosis came from the cache.
    pub cached: bool,
    /// Terminal state.
    #[serde(flatten)]
    pub outcome: RunOutcome,
    /// Wall time.
    #[serde(skip)]
    pub elapsed: Duration,
}
