//! The remediation engine.
//!
//! One run moves through a fixed sequence of gated stages:
//!
//! ```text
//! Received → CacheCheck → Analyzing → {AnalysisFailed | Analyzed}
//!          → ConfidenceGate → {NeedsReview | Applying}
//!          → {GuardrailBlocked | SecretBlocked | PreVerifyFailed | BackupFailed | ApplyFailed | Applied}
//! ```
//!
//! Every terminal state except `Applied` is audited with its reason; `Applied`
//! is audited as `fix_applied`, and failing to append that entry fails the
//! run. No stage is retried by the engine itself.
//!
//! Concurrency: runs with the same log fingerprint are serialized so at most
//! one model inference happens per distinct failure, and backup-then-write is
//! serialized per target path.

mod analysis;
mod apply;
mod outcome;

pub use outcome::{RunOutcome, RunReport, RunRequest, Stage};

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::json;
use tracing::{info, info_span, warn, Instrument};

use crate::config::Config;
use crate::error::AppError;
use crate::notify::EVENT_NEEDS_REVIEW;
use crate::reports::{SloLedger, SloRecord, TokenLedger, TokenUsage};
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, ModelRouter, RetryPolicy};
use crate::shutdown::ShutdownSignal;
use crate::storage::{AuditEntry, AuditEvent, AuditLog, BackupStore, ContentCache, KeyedLocks, Stores};
use crate::traits::{
    Diagnosis, FileResolver, ModelClient, NoopNotifier, Notifier, PreVerifier, SkipVerifier,
};

/// Tunables for a [`RemediationEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Diagnoses must be strictly above this to be applied.
    pub confidence_threshold: f64,
    /// Log characters kept for the model after masking.
    pub log_max_chars: usize,
    /// Independent diagnosis runs; below 2 disables quorum.
    pub quorum_size: usize,
    /// Permit lock files, `.gitignore` and similar as targets.
    pub allow_restricted_files: bool,
    /// Alert once consecutive breaker failures reach this.
    pub alert_failure_threshold: u32,
    /// Per-call model deadline.
    pub request_timeout: Duration,
    /// Retry schedule for model calls.
    pub retry: RetryPolicy,
    /// Model selection.
    pub router: ModelRouter,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl EngineSettings {
    /// Settings from application configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            confidence_threshold: config.pipeline.confidence_threshold,
            log_max_chars: config.pipeline.log_max_chars,
            quorum_size: config.pipeline.quorum_size,
            allow_restricted_files: config.pipeline.allow_restricted_files,
            alert_failure_threshold: config.breaker.alert_failure_threshold,
            request_timeout: Duration::from_millis(config.model.request_timeout_ms),
            retry: RetryPolicy::from(&config.model),
            router: ModelRouter::from(&config.model),
        }
    }
}

/// Per-run identity shared by every stage.
#[derive(Debug, Clone, Copy)]
struct RunCtx<'a> {
    request: &'a RunRequest,
    correlation_id: &'a str,
}

impl RunCtx<'_> {
    fn entry(&self, event: AuditEvent) -> AuditEntry {
        AuditEntry::new(event, self.request.run_id.clone(), self.request.provider.as_str())
            .with_detail("correlation_id", self.correlation_id)
    }

    fn usage(&self, model: &str, input: u64, output: u64) -> TokenUsage {
        TokenUsage::new(
            self.request.run_id.clone(),
            model,
            input,
            output,
            Some(self.correlation_id.to_string()),
        )
    }
}

/// Orchestrates one remediation run at a time per call; safe to share.
pub struct RemediationEngine {
    model: Arc<dyn ModelClient>,
    resolver: Arc<dyn FileResolver>,
    notifier: Arc<dyn Notifier>,
    verifier: Arc<dyn PreVerifier>,
    cache: Arc<dyn ContentCache>,
    backups: Arc<dyn BackupStore>,
    audit: AuditLog,
    breaker: Arc<CircuitBreaker>,
    settings: EngineSettings,
    tokens: Option<TokenLedger>,
    slo: Option<SloLedger>,
    shutdown: ShutdownSignal,
    fingerprint_locks: KeyedLocks,
    path_locks: KeyedLocks,
}

impl std::fmt::Debug for RemediationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemediationEngine")
            .field("settings", &self.settings)
            .field("audit", &self.audit)
            .finish_non_exhaustive()
    }
}

impl RemediationEngine {
    /// Create an engine over `stores`, with a fresh breaker, no
    /// notifications, no pre-verify and no ledgers.
    #[must_use]
    pub fn new(
        model: Arc<dyn ModelClient>,
        resolver: Arc<dyn FileResolver>,
        stores: &Stores,
        settings: EngineSettings,
    ) -> Self {
        Self {
            model,
            resolver,
            notifier: Arc::new(NoopNotifier),
            verifier: Arc::new(SkipVerifier),
            cache: Arc::clone(&stores.cache),
            backups: Arc::clone(&stores.backups),
            audit: stores.audit.clone(),
            breaker: Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default())),
            settings,
            tokens: None,
            slo: None,
            shutdown: ShutdownSignal::new(),
            fingerprint_locks: KeyedLocks::new(),
            path_locks: KeyedLocks::new(),
        }
    }

    /// Share a circuit breaker.
    #[must_use]
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = breaker;
        self
    }

    /// Send events to `notifier`.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Check candidates with `verifier` before writing.
    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn PreVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Record token usage and run latency.
    #[must_use]
    pub fn with_ledgers(mut self, tokens: TokenLedger, slo: SloLedger) -> Self {
        self.tokens = Some(tokens);
        self.slo = Some(slo);
        self
    }

    /// Observe `shutdown` between stages.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// The engine's circuit breaker.
    #[must_use]
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Engine settings.
    #[must_use]
    pub const fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run the pipeline to a terminal state.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Storage`] if an audit entry cannot be durably
    /// appended. Every other failure is a terminal [`RunOutcome`].
    pub async fn run(&self, request: RunRequest) -> Result<RunReport, AppError> {
        let started = Instant::now();
        let correlation_id = format!("heal-{}-{}", request.run_id, Utc::now().timestamp());
        let span = info_span!(
            "heal",
            correlation_id = %correlation_id,
            run_id = %request.run_id,
            provider = %request.provider,
        );

        let report = self
            .run_stages(&request, &correlation_id, started)
            .instrument(span)
            .await?;

        info!(
            correlation_id = %report.correlation_id,
            outcome = report.outcome.name(),
            elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
            "Run finished"
        );
        self.record_slo(&report).await;
        Ok(report)
    }

    async fn run_stages(
        &self,
        request: &RunRequest,
        correlation_id: &str,
        started: Instant,
    ) -> Result<RunReport, AppError> {
        let ctx = RunCtx {
            request,
            correlation_id,
        };
        let finish = |diagnosis: Option<Diagnosis>, cached: bool, outcome: RunOutcome| RunReport {
            correlation_id: correlation_id.to_string(),
            run_id: request.run_id.clone(),
            provider: request.provider,
            diagnosis,
            cached,
            outcome,
            elapsed: started.elapsed(),
        };

        info!(dry_run = request.dry_run, log_chars = request.logs.len(), "Run received");

        if let Some(outcome) = self.cancelled(ctx, Stage::Analyzing).await? {
            return Ok(finish(None, false, outcome));
        }

        let (diagnosis, cached) = match self.diagnosis_for(ctx).await? {
            Ok(found) => found,
            Err(outcome) => return Ok(finish(None, false, outcome)),
        };
        info!(
            cached,
            confidence = diagnosis.confidence,
            file = %diagnosis.file_path,
            root_cause = %diagnosis.root_cause.chars().take(100).collect::<String>(),
            "Analysis complete"
        );

        if !diagnosis.exceeds(self.settings.confidence_threshold) {
            let outcome = self.needs_review(ctx, &diagnosis).await?;
            return Ok(finish(Some(diagnosis), cached, outcome));
        }

        if let Some(outcome) = self.cancelled(ctx, Stage::Applying).await? {
            return Ok(finish(Some(diagnosis), cached, outcome));
        }

        let outcome = self.apply(ctx, &diagnosis).await?;
        Ok(finish(Some(diagnosis), cached, outcome))
    }

    async fn cancelled(&self, ctx: RunCtx<'_>, stage: Stage) -> Result<Option<RunOutcome>, AppError> {
        if !self.shutdown.is_requested() {
            return Ok(None);
        }
        warn!(stage = stage.as_str(), "Shutdown requested, stopping run");
        self.record(ctx.entry(AuditEvent::RunCancelled).with_detail("stage", stage.as_str()))
            .await?;
        Ok(Some(RunOutcome::Cancelled { stage }))
    }

    async fn needs_review(
        &self,
        ctx: RunCtx<'_>,
        diagnosis: &Diagnosis,
    ) -> Result<RunOutcome, AppError> {
        info!(
            confidence = diagnosis.confidence,
            threshold = self.settings.confidence_threshold,
            "Confidence too low for auto-fix"
        );
        self.record(
            ctx.entry(AuditEvent::NeedsHumanReview)
                .with_detail("confidence", diagnosis.confidence)
                .with_detail("threshold", self.settings.confidence_threshold)
                .with_detail("file_path", diagnosis.file_path.clone())
                .with_detail("root_cause", diagnosis.root_cause.clone()),
        )
        .await?;
        self.notifier
            .notify(
                EVENT_NEEDS_REVIEW,
                &json!({
                    "message": format!(
                        "Run {} needs human review (confidence {:.2})",
                        ctx.request.run_id, diagnosis.confidence
                    ),
                    "run_id": ctx.request.run_id,
                    "correlation_id": ctx.correlation_id,
                    "root_cause": diagnosis.root_cause,
                    "file_path": diagnosis.file_path,
                }),
            )
            .await;
        Ok(RunOutcome::NeedsReview {
            confidence: diagnosis.confidence,
        })
    }

    /// Append an audit entry durably.
    async fn record(&self, entry: AuditEntry) -> Result<(), AppError> {
        self.audit.append_async(entry).await.map_err(AppError::from)
    }

    /// Append to the token ledger, if configured. Never fails the run.
    async fn record_tokens(&self, usage: TokenUsage) {
        if let Some(ledger) = &self.tokens {
            ledger.record_and_check(usage).await;
        }
    }

    async fn record_slo(&self, report: &RunReport) {
        let Some(ledger) = &self.slo else {
            return;
        };
        let record = SloRecord {
            ts: Utc::now(),
            success: report.outcome.is_healed(),
            latency_ms: report.elapsed.as_secs_f64() * 1000.0,
            run_id: report.run_id.clone(),
            outcome: report.outcome.name().to_string(),
        };
        if let Err(e) = ledger.record(record).await {
            warn!(error = %e, "Failed to record SLO entry");
        }
    }
}

#[cfg(test)]
mod tests;
