//! Capability traits for the remediation engine's collaborators.
//!
//! The engine depends only on these narrow interfaces:
//! - [`ModelClient`]: diagnosis and code fix generation
//! - [`LogSource`] / [`LogSources`]: per-provider log fetching
//! - [`FileResolver`]: mapping a model-proposed path to a real file
//! - [`Notifier`]: outbound alerts
//! - [`PreVerifier`]: syntax check of a candidate before it is written
//!
//! # Mocking
//!
//! All traits are annotated with `#[cfg_attr(test, mockall::automock)]`
//! which generates mock implementations automatically for testing.

mod types;

pub use types::{CodeFix, Diagnosis, DiagnosisRequest, FixRequest, ResolvedFile, VerifyOutcome};

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ModelError, ProviderError};
use crate::providers::Provider;

/// Generative model access.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Diagnose a failure log with the given model.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if the call fails or the answer cannot be parsed.
    async fn diagnose(
        &self,
        model: &str,
        request: &DiagnosisRequest,
    ) -> Result<Diagnosis, ModelError>;

    /// Produce the full corrected content of one file.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if the call fails or the answer cannot be parsed.
    async fn generate_fix(&self, model: &str, request: &FixRequest)
        -> Result<CodeFix, ModelError>;
}

/// Log access for one CI provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Fetch the raw log text of a run.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if the run id is invalid or the API fails.
    async fn fetch_logs(&self, run_id: &str) -> Result<String, ProviderError>;

    /// One-line description of where the logs come from.
    fn context(&self) -> String;

    /// Check that the provider's required environment is present.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::MissingEnv`] naming what is missing.
    fn validate_env(&self) -> Result<(), ProviderError>;
}

/// Lookup of a [`LogSource`] by provider.
#[cfg_attr(test, mockall::automock)]
pub trait LogSources: Send + Sync {
    /// Return the log source for `provider`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if the provider cannot be constructed.
    fn source_for(&self, provider: Provider) -> Result<Arc<dyn LogSource>, ProviderError>;
}

/// Maps a relative path proposed by the model to an existing file.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileResolver: Send + Sync {
    /// Resolve `relative` to a file under the project root, or `None` if
    /// nothing matches.
    async fn resolve(&self, relative: &str) -> Option<ResolvedFile>;
}

/// Outbound notification channel.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send `event` with `payload`. Returns true if delivered.
    async fn notify(&self, event: &str, payload: &Value) -> bool;
}

/// Pre-apply verification of candidate content.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PreVerifier: Send + Sync {
    /// Check whether `candidate` is acceptable as the new content of `target`.
    async fn verify(&self, target: &Path, candidate: &str) -> VerifyOutcome;
}

/// A notifier that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _event: &str, _payload: &Value) -> bool {
        false
    }
}

/// A verifier that accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipVerifier;

#[async_trait]
impl PreVerifier for SkipVerifier {
    async fn verify(&self, _target: &Path, _candidate: &str) -> VerifyOutcome {
        VerifyOutcome::pass("pre-verify skipped")
    }
}
