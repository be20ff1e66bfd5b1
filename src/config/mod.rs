//! Configuration management.
//!
//! This module handles:
//! - Environment variable loading (with `.env` support)
//! - Configuration validation
//! - Default value handling
//! - Secure credential storage via [`SecretString`]
//!
//! # Example
//!
//! ```
//! use ci_healer::config::{Config, SecretString};
//!
//! // Start from defaults (use Config::from_env() in production)
//! let mut config = Config::default();
//! config.model.api_key = Some(SecretString::new("sk-ant-example-key"));
//!
//! assert!((config.pipeline.confidence_threshold - 0.8).abs() < f64::EPSILON);
//! let debug = format!("{config:?}");
//! assert!(debug.contains("<REDACTED>"));
//! assert!(!debug.contains("sk-ant-example-key"));
//! ```

mod secret;
mod validation;

pub use secret::SecretString;
pub use validation::{
    validate_config, MAX_LOG_CHARS, MAX_QUORUM_SIZE, MAX_RETRIES, MAX_TIMEOUT_MS, MIN_LOG_CHARS,
    MIN_TIMEOUT_MS,
};

use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ConfigError;

/// Default Anthropic API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Default primary model.
pub const DEFAULT_PRIMARY_MODEL: &str = "claude-sonnet-4-20250514";

/// Default fallback model.
pub const DEFAULT_FALLBACK_MODEL: &str = "claude-3-5-haiku-20241022";

/// Default state directory for audit log, backups, cache and queue.
pub const DEFAULT_STATE_DIR: &str = "logs";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default per-call model timeout in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 60_000;

/// Default number of attempts per model call.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default confidence threshold (exclusive) for automatic application.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.8;

/// Default maximum log characters sent to the model.
pub const DEFAULT_LOG_MAX_CHARS: usize = 16_000;

/// Log length above which the large model is used.
pub const DEFAULT_ROUTING_THRESHOLD_CHARS: usize = 8_000;

/// Which durable store backs the analysis cache and the job queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// One file per cache entry / job under the state directory.
    #[default]
    File,
    /// A shared `SQLite` database, safe for several worker processes.
    Sqlite,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "file" | "" => Ok(Self::File),
            "sqlite" | "db" => Ok(Self::Sqlite),
            other => Err(ConfigError::InvalidValue {
                var: "STATE_BACKEND".into(),
                reason: format!("unknown backend '{other}' (expected 'file' or 'sqlite')"),
            }),
        }
    }
}

/// Model access and call-wrapping settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    /// Anthropic API key. Only required for commands that call the model.
    pub api_key: Option<SecretString>,
    /// API base URL.
    pub base_url: String,
    /// Primary tier model.
    pub primary_model: String,
    /// Fallback tier model.
    pub fallback_model: String,
    /// Model used for large logs on the primary tier.
    pub large_model: String,
    /// Model used for small logs on the primary tier.
    pub small_model: String,
    /// Log length (chars) above which `large_model` is chosen.
    pub routing_threshold_chars: usize,
    /// Per-call timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Attempts per call (including the first).
    pub max_retries: u32,
    /// Base retry delay in milliseconds.
    pub retry_delay_ms: u64,
    /// Exponential backoff factor.
    pub backoff_factor: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.into(),
            primary_model: DEFAULT_PRIMARY_MODEL.into(),
            fallback_model: DEFAULT_FALLBACK_MODEL.into(),
            large_model: DEFAULT_PRIMARY_MODEL.into(),
            small_model: DEFAULT_FALLBACK_MODEL.into(),
            routing_threshold_chars: DEFAULT_ROUTING_THRESHOLD_CHARS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: 1_000,
            backoff_factor: 2.0,
        }
    }
}

impl ModelConfig {
    /// Return the API key or a [`ConfigError::MissingRequired`].
    ///
    /// # Errors
    ///
    /// Returns an error if `ANTHROPIC_API_KEY` was not provided or is blank.
    pub fn require_api_key(&self) -> Result<&SecretString, ConfigError> {
        self.api_key
            .as_ref()
            .filter(|k| !k.is_blank())
            .ok_or_else(|| ConfigError::MissingRequired {
                var: "ANTHROPIC_API_KEY".into(),
            })
    }
}

/// Remediation pipeline behaviour.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// A diagnosis must be strictly above this to be applied.
    pub confidence_threshold: f64,
    /// Maximum log characters sent to the model.
    pub log_max_chars: usize,
    /// Number of independent diagnosis runs; below 2 disables quorum.
    pub quorum_size: usize,
    /// Allow edits to restricted files (lockfiles, `.gitignore`).
    pub allow_restricted_files: bool,
    /// Skip the pre-apply syntax check.
    pub skip_pre_verify: bool,
    /// Root of the project whose files may be fixed.
    pub project_root: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            log_max_chars: DEFAULT_LOG_MAX_CHARS,
            quorum_size: 0,
            allow_restricted_files: false,
            skip_pre_verify: false,
            project_root: PathBuf::from("."),
        }
    }
}

/// Circuit breaker and alerting thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// Cool-down in seconds before a call is attempted again.
    pub cooldown_secs: u64,
    /// Consecutive failures at which alerts are sent.
    pub alert_failure_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_secs: 60,
            alert_failure_threshold: 3,
        }
    }
}

/// Durable state locations and accounting settings.
#[derive(Debug, Clone, PartialEq)]
pub struct StateConfig {
    /// Backend for cache and queue.
    pub backend: StoreBackend,
    /// Append-only audit log (JSON lines).
    pub audit_log_path: PathBuf,
    /// Directory of pre-write backups.
    pub backup_dir: PathBuf,
    /// Directory of cached diagnoses (file backend).
    pub cache_dir: PathBuf,
    /// Directory of queued jobs (file backend).
    pub queue_dir: PathBuf,
    /// `SQLite` database (sqlite backend).
    pub database_path: PathBuf,
    /// Token usage ledger (JSON lines).
    pub token_log_path: PathBuf,
    /// SLO ledger (JSON lines).
    pub slo_log_path: PathBuf,
    /// Disable the analysis cache.
    pub cache_disabled: bool,
    /// Cache entry lifetime for the sqlite backend, in seconds.
    pub cache_ttl_secs: u64,
    /// Token total per correlation id that triggers a budget warning.
    pub token_budget_alert: u64,
    /// USD per 1K input tokens.
    pub cost_input_per_1k: f64,
    /// USD per 1K output tokens.
    pub cost_output_per_1k: f64,
}

impl StateConfig {
    /// Lay out all state files under one directory.
    #[must_use]
    pub fn under(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            backend: StoreBackend::File,
            audit_log_path: dir.join("agent_audit.jsonl"),
            backup_dir: dir.join("backups"),
            cache_dir: dir.join("cache"),
            queue_dir: dir.join("queue"),
            database_path: dir.join("healer.db"),
            token_log_path: dir.join("token_usage.jsonl"),
            slo_log_path: dir.join("slo.jsonl"),
            cache_disabled: false,
            cache_ttl_secs: 86_400,
            token_budget_alert: 100_000,
            cost_input_per_1k: 0.003,
            cost_output_per_1k: 0.015,
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self::under(DEFAULT_STATE_DIR)
    }
}

/// Notification targets. Every field is optional; unset targets are skipped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NotifyConfig {
    /// Slack incoming webhook URL.
    pub slack_webhook_url: Option<SecretString>,
    /// `PagerDuty` Events v2 routing key.
    pub pagerduty_routing_key: Option<SecretString>,
    /// Generic JSON webhook URL.
    pub webhook_url: Option<String>,
    /// Value sent as `X-Webhook-Secret`.
    pub webhook_secret: Option<SecretString>,
}

/// Queue worker polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Bounded wait for one dequeue, in milliseconds.
    pub dequeue_wait_ms: u64,
    /// Interval between empty-queue polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// Logs carried by a job are capped to this many characters.
    pub max_job_log_chars: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            dequeue_wait_ms: 2_000,
            poll_interval_ms: 250,
            max_job_log_chars: 50_000,
        }
    }
}

/// Application configuration.
///
/// Use [`Config::from_env`] to load configuration from environment variables.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config {
    /// Model access.
    pub model: ModelConfig,
    /// Pipeline behaviour.
    pub pipeline: PipelineConfig,
    /// Circuit breaker.
    pub breaker: BreakerConfig,
    /// Durable state.
    pub state: StateConfig,
    /// Notifications.
    pub notify: NotifyConfig,
    /// Queue worker.
    pub worker: WorkerConfig,
    /// Log level filter (error, warn, info, debug, trace).
    pub log_level: String,
    /// Emit JSON log lines.
    pub log_json: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is loaded first if present.
    /// Every variable is optional.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a value cannot be parsed or fails
    /// [`validate_config`].
    #[must_use = "configuration should be used"]
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let defaults = ModelConfig::default();
        let primary_model = env_string("LLM_PRIMARY_MODEL", &defaults.primary_model);
        let fallback_model = env_string("LLM_FALLBACK_MODEL", &defaults.fallback_model);
        let model = ModelConfig {
            api_key: env_opt("ANTHROPIC_API_KEY").map(SecretString::new),
            base_url: env_string("ANTHROPIC_BASE_URL", DEFAULT_BASE_URL),
            large_model: env_string("LLM_LARGE_MODEL", &primary_model),
            small_model: env_string("LLM_SMALL_MODEL", &fallback_model),
            primary_model,
            fallback_model,
            routing_threshold_chars: parse_env("MODEL_ROUTING_THRESHOLD", DEFAULT_ROUTING_THRESHOLD_CHARS)?,
            request_timeout_ms: parse_env("LLM_REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT_MS)?,
            max_retries: parse_env("LLM_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            retry_delay_ms: parse_env("LLM_RETRY_DELAY_MS", defaults.retry_delay_ms)?,
            backoff_factor: parse_env("LLM_BACKOFF_FACTOR", defaults.backoff_factor)?,
        };

        let pipeline = PipelineConfig {
            confidence_threshold: parse_env("CONFIDENCE_THRESHOLD", DEFAULT_CONFIDENCE_THRESHOLD)?,
            log_max_chars: parse_env("LOG_MAX_CHARS", DEFAULT_LOG_MAX_CHARS)?,
            quorum_size: parse_env("QUORUM_SIZE", 0)?,
            allow_restricted_files: env_flag("ALLOW_RESTRICTED_FILES"),
            skip_pre_verify: env_flag("SKIP_PRE_VERIFY"),
            project_root: PathBuf::from(env_string("PROJECT_ROOT", ".")),
        };

        let breaker_defaults = BreakerConfig::default();
        let breaker = BreakerConfig {
            failure_threshold: parse_env("CIRCUIT_BREAKER_THRESHOLD", breaker_defaults.failure_threshold)?,
            cooldown_secs: parse_env("CIRCUIT_BREAKER_TIMEOUT", breaker_defaults.cooldown_secs)?,
            alert_failure_threshold: parse_env(
                "ALERT_FAILURE_THRESHOLD",
                breaker_defaults.alert_failure_threshold,
            )?,
        };

        let state_dir = PathBuf::from(env_string("STATE_DIR", DEFAULT_STATE_DIR));
        let layout = StateConfig::under(&state_dir);
        let state = StateConfig {
            backend: env_opt("STATE_BACKEND")
                .map_or(Ok(StoreBackend::File), |v| v.parse())?,
            audit_log_path: env_path("AUDIT_LOG_PATH", layout.audit_log_path),
            backup_dir: env_path("BACKUP_DIR", layout.backup_dir),
            cache_dir: env_path("ANALYSIS_CACHE_DIR", layout.cache_dir),
            queue_dir: env_path("QUEUE_DIR", layout.queue_dir),
            database_path: env_path("DATABASE_PATH", layout.database_path),
            token_log_path: env_path("TOKEN_LOG_PATH", layout.token_log_path),
            slo_log_path: env_path("SLO_LOG_PATH", layout.slo_log_path),
            cache_disabled: env_flag("CACHE_DISABLED"),
            cache_ttl_secs: parse_env("CACHE_TTL_SECS", layout.cache_ttl_secs)?,
            token_budget_alert: parse_env("TOKEN_BUDGET_ALERT", layout.token_budget_alert)?,
            cost_input_per_1k: parse_env("COST_INPUT_PER_1K", layout.cost_input_per_1k)?,
            cost_output_per_1k: parse_env("COST_OUTPUT_PER_1K", layout.cost_output_per_1k)?,
        };

        let notify = NotifyConfig {
            slack_webhook_url: env_opt("SLACK_WEBHOOK_URL").map(SecretString::new),
            pagerduty_routing_key: env_opt("PAGERDUTY_ROUTING_KEY").map(SecretString::new),
            webhook_url: env_opt("WEBHOOK_URL"),
            webhook_secret: env_opt("WEBHOOK_SECRET").map(SecretString::new),
        };

        let worker_defaults = WorkerConfig::default();
        let worker = WorkerConfig {
            dequeue_wait_ms: parse_env("WORKER_DEQUEUE_WAIT_MS", worker_defaults.dequeue_wait_ms)?,
            poll_interval_ms: parse_env("WORKER_POLL_INTERVAL_MS", worker_defaults.poll_interval_ms)?,
            max_job_log_chars: worker_defaults.max_job_log_chars,
        };

        let config = Self {
            model,
            pipeline,
            breaker,
            state,
            notify,
            worker,
            log_level: env_string("LOG_LEVEL", DEFAULT_LOG_LEVEL),
            log_json: env_flag("LOG_JSON"),
        };

        validate_config(&config)?;
        Ok(config)
    }
}

/// `1`, `true` and `yes` (any case) are truthy.
#[must_use]
pub fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}

/// A trimmed, non-empty environment variable.
pub(crate) fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn env_string(name: &str, default: &str) -> String {
    env_opt(name).unwrap_or_else(|| default.to_string())
}

fn env_path(name: &str, default: PathBuf) -> PathBuf {
    env_opt(name).map_or(default, PathBuf::from)
}

fn env_flag(name: &str) -> bool {
    env_opt(name).is_some_and(|v| is_truthy(&v))
}

/// Parse an environment variable, using a default if not set.
fn parse_env<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    env_opt(name).map_or(Ok(default), |val| {
        val.parse().map_err(|_| ConfigError::InvalidValue {
            var: name.into(),
            reason: format!("cannot parse '{val}'"),
        })
    })
}
