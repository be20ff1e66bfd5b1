//! Shared types for the traits module.
//!
//! This module defines the values exchanged with external capabilities:
//! - [`Diagnosis`]: The model's analysis of a failure log
//! - [`CodeFix`]: Full replacement content for one file
//! - [`DiagnosisRequest`] / [`FixRequest`]: Model call inputs
//! - [`ResolvedFile`]: A target located under the project root
//! - [`VerifyOutcome`]: Result of a pre-apply check

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The model's analysis of a failure.
///
/// Immutable once returned; cached by log fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    /// Short description of the root cause.
    pub root_cause: String,
    /// What should be changed.
    pub suggested_fix: String,
    /// Target file, relative to the project root.
    pub file_path: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

impl Diagnosis {
    /// Create a new diagnosis.
    #[must_use]
    pub fn new(
        root_cause: impl Into<String>,
        suggested_fix: impl Into<String>,
        file_path: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            root_cause: root_cause.into(),
            suggested_fix: suggested_fix.into(),
            file_path: file_path.into(),
            confidence,
        }
    }

    /// Returns true if confidence is strictly above `threshold`.
    #[must_use]
    pub fn exceeds(&self, threshold: f64) -> bool {
        self.confidence > threshold
    }
}

/// Full replacement text of one file plus a human explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeFix {
    /// New content of the whole file.
    pub corrected_content: String,
    /// Why the change fixes the failure.
    pub explanation: String,
}

impl CodeFix {
    /// Create a new code fix.
    #[must_use]
    pub fn new(corrected_content: impl Into<String>, explanation: impl Into<String>) -> Self {
        Self {
            corrected_content: corrected_content.into(),
            explanation: explanation.into(),
        }
    }
}

/// Input for a diagnosis call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosisRequest {
    /// Prepared (masked, truncated) log text.
    pub logs: String,
    /// Provider context line, e.g. `"GitHub Actions (owner/repo)"`.
    pub context: String,
}

impl DiagnosisRequest {
    /// Create a new diagnosis request.
    #[must_use]
    pub fn new(logs: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            logs: logs.into(),
            context: context.into(),
        }
    }

    /// Approximate prompt size in characters.
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.logs.chars().count() + self.context.chars().count()
    }
}

/// Input for a code fix call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixRequest {
    /// File name shown to the model.
    pub filename: String,
    /// Current file content.
    pub file_content: String,
    /// The diagnosis' suggested fix.
    pub suggestion: String,
}

impl FixRequest {
    /// Create a new fix request.
    #[must_use]
    pub fn new(
        filename: impl Into<String>,
        file_content: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            file_content: file_content.into(),
            suggestion: suggestion.into(),
        }
    }
}

/// A file located under the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    /// Path on disk.
    pub path: PathBuf,
    /// Path relative to the project root, `/`-separated.
    pub relative: String,
}

impl ResolvedFile {
    /// Locate `relative` under `root`.
    #[must_use]
    pub fn under(root: &std::path::Path, relative: &std::path::Path) -> Self {
        Self {
            path: root.join(relative),
            relative: relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
        }
    }
}

/// Result of a pre-apply verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOutcome {
    /// Whether the candidate may be written.
    pub passed: bool,
    /// Checker output or reason.
    pub message: String,
}

impl VerifyOutcome {
    /// A passing outcome.
    #[must_use]
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
        }
    }

    /// A failing outcome.
    #[must_use]
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
        }
    }
}
