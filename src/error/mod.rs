//! Error types for the CI healer.
//!
//! This module defines a hierarchical error system:
//! - [`AppError`]: Top-level application errors
//! - [`ModelError`]: Generative model call errors (including breaker and quorum)
//! - [`StorageError`]: Audit log, backup, cache and queue errors
//! - [`ProviderError`]: CI provider log fetching errors
//! - [`ConfigError`]: Configuration errors
//!
//! All errors implement `Send + Sync` for async compatibility.

use thiserror::Error;

/// Top-level application error.
///
/// This is the main error type returned by public API functions.
/// It wraps all subsystem errors for unified error handling.
#[derive(Debug, Error)]
pub enum AppError {
    /// Model call error.
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Storage error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// CI provider error.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Generative model errors.
///
/// These errors represent failures when asking the model for a diagnosis or a
/// code fix, plus the two gating failures layered on top of raw calls.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Authentication failed due to invalid API key.
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    /// Request was rate limited.
    #[error("Rate limited: retry after {retry_after_seconds}s")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_seconds: u64,
    },

    /// The requested model is overloaded.
    #[error("Model overloaded: {model}")]
    ModelOverloaded {
        /// The model that is overloaded.
        model: String,
    },

    /// Request timed out.
    #[error("Request timeout after {timeout_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// Invalid request parameters.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of what's invalid.
        message: String,
    },

    /// Network communication error.
    #[error("Network error: {message}")]
    Network {
        /// Description of the network error.
        message: String,
    },

    /// Unexpected response from the API.
    #[error("Unexpected response: {message}")]
    UnexpectedResponse {
        /// Description of what was unexpected.
        message: String,
    },

    /// The model answered but the structured payload could not be parsed.
    #[error("Failed to parse model output: {message}")]
    ParseFailed {
        /// Description of the parsing error.
        message: String,
    },

    /// The circuit breaker is open; the call was not attempted.
    #[error("Circuit breaker is OPEN after {failures} consecutive failures; model calls temporarily disabled")]
    CircuitOpen {
        /// Consecutive failures recorded when the call was rejected.
        failures: u32,
    },

    /// Independent diagnosis runs did not agree on a target file.
    #[error("No quorum: {successes} successful runs, no file path agreed by at least two")]
    NoQuorum {
        /// Number of runs that returned a diagnosis.
        successes: usize,
    },
}

impl ModelError {
    /// Returns true if this error is transient. Recorded with every
    /// `analysis_failed` audit entry.
    ///
    /// Rate limiting, overload, timeout and network errors are transient.
    /// Authentication, invalid request and gating errors are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::ModelOverloaded { .. }
                | Self::Timeout { .. }
                | Self::Network { .. }
        )
    }

    /// Returns true if the call was rejected by an open circuit breaker.
    #[must_use]
    pub const fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}

/// Storage errors.
///
/// These errors represent failures reading or writing durable state:
/// the audit log, backups, the analysis cache and the job queue.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Filesystem operation failed.
    #[error("I/O error on {path}: {message}")]
    Io {
        /// The path involved.
        path: String,
        /// Description of the failure.
        message: String,
    },

    /// A record could not be encoded or decoded.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the failure.
        message: String,
    },

    /// Failed to connect to the database.
    #[error("Database connection failed: {message}")]
    ConnectionFailed {
        /// Description of the connection failure.
        message: String,
    },

    /// A database query failed.
    #[error("Query failed: {query} - {message}")]
    QueryFailed {
        /// The query that failed (may be truncated).
        query: String,
        /// Description of the failure.
        message: String,
    },

    /// Database migration failed.
    #[error("Migration failed: {version} - {message}")]
    MigrationFailed {
        /// The migration version that failed.
        version: String,
        /// Description of the failure.
        message: String,
    },

    /// A referenced backup does not exist.
    #[error("Backup not found: {path}")]
    BackupNotFound {
        /// The backup path that was not found.
        path: String,
    },
}

impl StorageError {
    /// Build an [`StorageError::Io`] from a path and an I/O error.
    pub fn io(path: impl AsRef<std::path::Path>, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

/// CI provider errors.
///
/// These errors represent failures fetching logs from a CI system.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// A required environment variable is not set.
    #[error("{provider}: {message}")]
    MissingEnv {
        /// The provider name.
        provider: String,
        /// What is missing.
        message: String,
    },

    /// The run identifier is not valid for this provider.
    #[error("{provider}: invalid run id '{run_id}': {reason}")]
    InvalidRunId {
        /// The provider name.
        provider: String,
        /// The rejected run id.
        run_id: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The provider API returned an error.
    #[error("{provider} API error: {message}")]
    Api {
        /// The provider name.
        provider: String,
        /// Description of the failure.
        message: String,
    },

    /// The provider name is not known.
    #[error("Unknown provider: {name}")]
    UnknownProvider {
        /// The unknown name.
        name: String,
    },
}

/// Configuration errors.
///
/// These errors represent failures in configuration loading and validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Required configuration is missing.
    #[error("Missing required: {var}")]
    MissingRequired {
        /// The missing variable name.
        var: String,
    },

    /// Configuration value is invalid.
    #[error("Invalid value for {var}: {reason}")]
    InvalidValue {
        /// The variable name.
        var: String,
        /// Why the value is invalid.
        reason: String,
    },
}
