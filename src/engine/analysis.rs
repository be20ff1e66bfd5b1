//! Cache check and model diagnosis.

use serde_json::json;
use tracing::{debug, error, info, warn};

use super::{RemediationEngine, RunCtx, RunOutcome};
use crate::error::{AppError, ModelError};
use crate::notify::EVENT_HEAL_FAILURE;
use crate::reports::{approx_tokens, categorize};
use crate::resilience::{run_with_quorum, with_retry, with_timeout, ModelTier, QuorumOutcome};
use crate::safety::prepare_logs;
use crate::storage::{AuditEvent, LogFingerprint};
use crate::traits::{Diagnosis, DiagnosisRequest};

/// A diagnosis and whether it came from the cache, or the terminal outcome.
pub(super) type Analysis = Result<(Diagnosis, bool), RunOutcome>;

impl RemediationEngine {
    /// Look the logs up in the cache, diagnosing them on a miss.
    ///
    /// Holds the fingerprint lock across lookup, model call and cache write,
    /// so a second run with the same logs waits and then hits the cache.
    pub(super) async fn diagnosis_for(&self, ctx: RunCtx<'_>) -> Result<Analysis, AppError> {
        let fingerprint = LogFingerprint::of(&ctx.request.logs);
        let _guard = self.fingerprint_locks.lock(fingerprint.as_str()).await;

        match self.cache.get(&fingerprint).await {
            Ok(Some(diagnosis)) => {
                info!(fingerprint = fingerprint.short(), "Analysis cache hit");
                return Ok(Ok((diagnosis, true)));
            }
            Ok(None) => debug!(fingerprint = fingerprint.short(), "Analysis cache miss"),
            Err(e) => warn!(error = %e, "Analysis cache unreadable, treating as miss"),
        }

        self.record(
            ctx.entry(AuditEvent::AnalysisStarted)
                .with_detail("fingerprint", fingerprint.short()),
        )
        .await?;

        match self.analyze(ctx).await {
            Ok(diagnosis) => {
                if let Err(e) = self.cache.put(&fingerprint, &diagnosis).await {
                    warn!(error = %e, "Failed to cache diagnosis");
                }
                Ok(Ok((diagnosis, false)))
            }
            Err(e) => self.analysis_failed(ctx, &e).await.map(Err),
        }
    }

    async fn analyze(&self, ctx: RunCtx<'_>) -> Result<Diagnosis, ModelError> {
        let logs = prepare_logs(&ctx.request.logs, self.settings.log_max_chars);
        let request = DiagnosisRequest::new(logs, ctx.request.context.clone());
        let chars = request.char_len();

        let (model, diagnosis) = if self.settings.quorum_size >= 2 {
            self.diagnose_by_quorum(&request, chars).await?
        } else {
            self.diagnose_with_fallback(&request, chars).await?
        };

        let output_chars = diagnosis.root_cause.len() + diagnosis.suggested_fix.len();
        self.record_tokens(ctx.usage(
            model,
            approx_tokens(chars),
            approx_tokens(output_chars),
        ))
        .await;
        Ok(diagnosis)
    }

    /// One retried, deadline-bounded diagnosis call.
    async fn diagnose_once(&self, model: &str, request: &DiagnosisRequest) -> Result<Diagnosis, ModelError> {
        with_retry(&self.settings.retry, || {
            with_timeout(self.settings.request_timeout, self.model.diagnose(model, request))
        })
        .await
    }

    async fn diagnose_with_fallback<'a>(
        &'a self,
        request: &DiagnosisRequest,
        chars: usize,
    ) -> Result<(&'a str, Diagnosis), ModelError> {
        let primary = self.settings.router.route(ModelTier::Primary, chars);
        let err = match self.breaker.execute(|| self.diagnose_once(primary, request)).await {
            Ok(diagnosis) => return Ok((primary, diagnosis)),
            Err(e) if e.is_circuit_open() => return Err(e),
            Err(e) => e,
        };

        let fallback = self.settings.router.route(ModelTier::Fallback, chars);
        if fallback == primary {
            return Err(err);
        }
        warn!(primary, fallback, error = %err, "Primary model failed, trying fallback");
        self.breaker
            .execute(|| self.diagnose_once(fallback, request))
            .await
            .map(|diagnosis| (fallback, diagnosis))
    }

    async fn diagnose_by_quorum<'a>(
        &'a self,
        request: &DiagnosisRequest,
        chars: usize,
    ) -> Result<(&'a str, Diagnosis), ModelError> {
        let model = self.settings.router.route(ModelTier::Primary, chars);
        match run_with_quorum(self.settings.quorum_size, || self.diagnose_once(model, request)).await {
            QuorumOutcome::Agreed { value, votes } => {
                info!(votes, runs = self.settings.quorum_size, "Quorum agreed on target file");
                Ok((model, value))
            }
            QuorumOutcome::Sole(value) => Ok((model, value)),
            QuorumOutcome::NoQuorum { successes } => Err(ModelError::NoQuorum { successes }),
        }
    }

    async fn analysis_failed(&self, ctx: RunCtx<'_>, err: &ModelError) -> Result<RunOutcome, AppError> {
        let reason = err.to_string();
        let category = categorize(&reason);
        let breaker = self.breaker.stats().await;
        error!(
            error = %reason,
            category = category.as_str(),
            retryable = err.is_retryable(),
            breaker = breaker.state.as_str(),
            "Analysis failed"
        );

        self.record(
            ctx.entry(AuditEvent::AnalysisFailed)
                .with_detail("error", reason.clone())
                .with_detail("category", category.as_str())
                .with_detail("retryable", err.is_retryable())
                .with_detail("breaker_state", breaker.state.as_str()),
        )
        .await?;

        let failures = breaker.consecutive_failures;
        if failures >= self.settings.alert_failure_threshold {
            warn!(failures, rejected = breaker.rejected, "Consecutive model failures reached alert threshold");
            self.notifier
                .notify(
                    EVENT_HEAL_FAILURE,
                    &json!({
                        "message": format!(
                            "Healing failed for run {}: {reason}",
                            ctx.request.run_id
                        ),
                        "run_id": ctx.request.run_id,
                        "correlation_id": ctx.correlation_id,
                        "consecutive_failures": failures,
                        "breaker_state": breaker.state.as_str(),
                        "category": category.as_str(),
                    }),
                )
                .await;
        }

        Ok(RunOutcome::AnalysisFailed { reason, category })
    }
}
