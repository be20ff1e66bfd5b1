//! Configuration validation.
//!
//! This module provides validation logic for configuration values,
//! ensuring they are within acceptable ranges.

use super::Config;
use crate::error::ConfigError;

/// Minimum allowed timeout in milliseconds (1 second).
pub const MIN_TIMEOUT_MS: u64 = 1000;

/// Maximum allowed timeout in milliseconds (5 minutes).
pub const MAX_TIMEOUT_MS: u64 = 300_000;

/// Maximum allowed attempts per model call.
pub const MAX_RETRIES: u32 = 10;

/// Smallest useful log budget.
pub const MIN_LOG_CHARS: usize = 1_000;

/// Largest log budget sent to the model.
pub const MAX_LOG_CHARS: usize = 200_000;

/// Largest quorum size.
pub const MAX_QUORUM_SIZE: usize = 9;

fn invalid(var: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        var: var.into(),
        reason: reason.into(),
    }
}

/// Validate configuration values.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] if any value is out of range:
/// - `CONFIDENCE_THRESHOLD` must be within `[0, 1]`
/// - `LLM_REQUEST_TIMEOUT_MS` must be between 1000 and 300000
/// - `LLM_MAX_RETRIES` must be between 1 and 10
/// - `LLM_BACKOFF_FACTOR` must be at least 1
/// - `LOG_MAX_CHARS` must be between 1000 and 200000
/// - `QUORUM_SIZE` must not exceed 9
/// - `CIRCUIT_BREAKER_THRESHOLD` and `ALERT_FAILURE_THRESHOLD` must be positive
#[must_use = "validation result should be checked"]
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let threshold = config.pipeline.confidence_threshold;
    if !(0.0..=1.0).contains(&threshold) {
        return Err(invalid("CONFIDENCE_THRESHOLD", "must be between 0 and 1"));
    }

    let timeout = config.model.request_timeout_ms;
    if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&timeout) {
        return Err(invalid(
            "LLM_REQUEST_TIMEOUT_MS",
            format!("must be between {MIN_TIMEOUT_MS} and {MAX_TIMEOUT_MS} ms"),
        ));
    }

    if config.model.max_retries == 0 || config.model.max_retries > MAX_RETRIES {
        return Err(invalid(
            "LLM_MAX_RETRIES",
            format!("must be between 1 and {MAX_RETRIES}"),
        ));
    }

    if !config.model.backoff_factor.is_finite() || config.model.backoff_factor < 1.0 {
        return Err(invalid("LLM_BACKOFF_FACTOR", "must be at least 1.0"));
    }

    let log_chars = config.pipeline.log_max_chars;
    if !(MIN_LOG_CHARS..=MAX_LOG_CHARS).contains(&log_chars) {
        return Err(invalid(
            "LOG_MAX_CHARS",
            format!("must be between {MIN_LOG_CHARS} and {MAX_LOG_CHARS}"),
        ));
    }

    if config.pipeline.quorum_size > MAX_QUORUM_SIZE {
        return Err(invalid(
            "QUORUM_SIZE",
            format!("must not exceed {MAX_QUORUM_SIZE}"),
        ));
    }

    if config.breaker.failure_threshold == 0 {
        return Err(invalid("CIRCUIT_BREAKER_THRESHOLD", "must be at least 1"));
    }

    if config.breaker.alert_failure_threshold == 0 {
        return Err(invalid("ALERT_FAILURE_THRESHOLD", "must be at least 1"));
    }

    let costs = [
        config.state.cost_input_per_1k,
        config.state.cost_output_per_1k,
    ];
    if costs.iter().any(|c| !c.is_finite() || *c < 0.0) {
        return Err(invalid("COST_INPUT_PER_1K", "costs must be non-negative"));
    }

    Ok(())
}
