//! Guarded application of a fix.

use std::path::Path;

use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{RemediationEngine, RunCtx, RunOutcome};
use crate::error::{AppError, ModelError};
use crate::notify::EVENT_FIX_APPLIED;
use crate::reports::approx_tokens;
use crate::resilience::{with_retry, with_timeout, ModelTier};
use crate::safety::{check_output, check_path, scan_for_secrets};
use crate::storage::{write_atomic, AuditEvent};
use crate::traits::{CodeFix, Diagnosis, FixRequest};

impl RemediationEngine {
    /// Turn an accepted diagnosis into a written fix.
    ///
    /// The path policy applies to both the proposed and the resolved path.
    /// Every check runs before the backup, and the backup must be durable
    /// before the target is touched.
    pub(super) async fn apply(&self, ctx: RunCtx<'_>, diagnosis: &Diagnosis) -> Result<RunOutcome, AppError> {
        let proposed = diagnosis.file_path.as_str();

        let verdict = check_path(proposed, self.settings.allow_restricted_files);
        if !verdict.allowed {
            return self.guardrail_blocked(ctx, proposed, verdict.reason).await;
        }

        let Some(resolved) = self.resolver.resolve(proposed).await else {
            return self
                .apply_failed(ctx, proposed, format!("Target file not found: {proposed}"))
                .await;
        };

        // the resolver may pick a file in a directory the proposal never named
        let verdict = check_path(&resolved.relative, self.settings.allow_restricted_files);
        if !verdict.allowed {
            return self
                .guardrail_blocked(ctx, &resolved.relative, verdict.reason)
                .await;
        }

        let target = resolved.path;
        let target_name = target.display().to_string();
        info!(proposed, resolved = %target_name, "Target resolved");

        let current = match tokio::fs::read_to_string(&target).await {
            Ok(content) => content,
            Err(e) => {
                return self
                    .apply_failed(ctx, &target_name, format!("Failed to read {target_name}: {e}"))
                    .await;
            }
        };

        let fix = match self.generate_fix(ctx, &target, &current, diagnosis).await {
            Ok(fix) => fix,
            Err(e) => {
                return self
                    .apply_failed(ctx, &target_name, format!("Fix generation failed: {e}"))
                    .await;
            }
        };

        let verdict = check_output(&fix.corrected_content);
        if !verdict.allowed {
            return self.guardrail_blocked(ctx, &target_name, verdict.reason).await;
        }

        if let Some(finding) = scan_for_secrets(&fix.corrected_content) {
            let reason = finding.to_string();
            warn!(file = %target_name, %reason, "Generated code contains a secret");
            self.record(
                ctx.entry(AuditEvent::SecretBlocked)
                    .with_detail("file", target_name)
                    .with_detail("reason", reason.clone()),
            )
            .await?;
            return Ok(RunOutcome::SecretBlocked { reason });
        }

        let verified = self.verifier.verify(&target, &fix.corrected_content).await;
        if !verified.passed {
            warn!(file = %target_name, message = %verified.message, "Pre-verify failed");
            self.record(
                ctx.entry(AuditEvent::PreVerifyFailed)
                    .with_detail("file", target_name)
                    .with_detail("message", verified.message.clone()),
            )
            .await?;
            return Ok(RunOutcome::PreVerifyFailed {
                message: verified.message,
            });
        }

        if ctx.request.dry_run {
            info!(file = %target_name, "Dry run, not writing");
            return Ok(RunOutcome::DryRun {
                file: target,
                explanation: fix.explanation,
            });
        }

        let _guard = self.path_locks.lock(&target_name).await;

        // another run may have written the file since it was read
        let current = match tokio::fs::read_to_string(&target).await {
            Ok(content) => content,
            Err(e) => {
                return self
                    .apply_failed(ctx, &target_name, format!("Failed to re-read {target_name}: {e}"))
                    .await;
            }
        };
        let backup = match self.backups.snapshot(&target, &current).await {
            Ok(path) => path,
            Err(e) => {
                error!(file = %target_name, error = %e, "Backup failed, target left unchanged");
                self.record(
                    ctx.entry(AuditEvent::BackupFailed)
                        .with_detail("file", target_name)
                        .with_detail("error", e.to_string()),
                )
                .await?;
                return Ok(RunOutcome::BackupFailed {
                    reason: e.to_string(),
                });
            }
        };

        if let Err(e) = write_atomic(&target, &fix.corrected_content).await {
            return self
                .apply_failed(ctx, &target_name, format!("Write failed: {e}"))
                .await;
        }

        self.record(
            ctx.entry(AuditEvent::FixApplied)
                .with_detail("fix_id", Uuid::new_v4().to_string())
                .with_detail("file", target_name.clone())
                .with_detail("backup", backup.display().to_string())
                .with_detail("explanation", fix.explanation.clone())
                .with_detail("confidence", diagnosis.confidence)
                .with_detail("root_cause", diagnosis.root_cause.clone()),
        )
        .await?;
        info!(file = %target_name, backup = %backup.display(), "Fix applied");

        self.notifier
            .notify(
                EVENT_FIX_APPLIED,
                &json!({
                    "message": format!("Fix applied to {target_name} for run {}", ctx.request.run_id),
                    "run_id": ctx.request.run_id,
                    "correlation_id": ctx.correlation_id,
                    "file": target_name,
                    "explanation": fix.explanation,
                }),
            )
            .await;

        Ok(RunOutcome::Applied {
            file: target,
            backup,
            explanation: fix.explanation,
        })
    }

    /// Request the corrected file: primary tier with retry, then the fallback
    /// tier once. Not gated by the breaker.
    async fn generate_fix(
        &self,
        ctx: RunCtx<'_>,
        target: &Path,
        current: &str,
        diagnosis: &Diagnosis,
    ) -> Result<CodeFix, ModelError> {
        let filename = target
            .file_name()
            .map_or_else(|| diagnosis.file_path.clone(), |n| n.to_string_lossy().into_owned());
        let request = FixRequest::new(filename, current, diagnosis.suggested_fix.clone());
        let chars = request.file_content.chars().count() + request.suggestion.chars().count();

        let primary = self.settings.router.route(ModelTier::Primary, chars);
        let (model, fix) = match self.fix_once(primary, &request).await {
            Ok(fix) => (primary, fix),
            Err(e) => {
                let fallback = self.settings.router.route(ModelTier::Fallback, chars);
                if fallback == primary {
                    return Err(e);
                }
                warn!(primary, fallback, error = %e, "Primary model failed fix generation, trying fallback");
                (fallback, self.fix_once(fallback, &request).await?)
            }
        };

        self.record_tokens(ctx.usage(
            model,
            approx_tokens(chars),
            approx_tokens(fix.corrected_content.len() + fix.explanation.len()),
        ))
        .await;
        Ok(fix)
    }

    async fn fix_once(&self, model: &str, request: &FixRequest) -> Result<CodeFix, ModelError> {
        with_retry(&self.settings.retry, || {
            with_timeout(self.settings.request_timeout, self.model.generate_fix(model, request))
        })
        .await
    }

    async fn guardrail_blocked(
        &self,
        ctx: RunCtx<'_>,
        file: &str,
        reason: String,
    ) -> Result<RunOutcome, AppError> {
        warn!(file, %reason, "Guardrail blocked");
        self.record(
            ctx.entry(AuditEvent::GuardrailBlocked)
                .with_detail("file", file)
                .with_detail("reason", reason.clone()),
        )
        .await?;
        Ok(RunOutcome::GuardrailBlocked { reason })
    }

    async fn apply_failed(&self, ctx: RunCtx<'_>, file: &str, reason: String) -> Result<RunOutcome, AppError> {
        error!(file, %reason, "Apply failed");
        self.record(
            ctx.entry(AuditEvent::ApplyFailed)
                .with_detail("file", file)
                .with_detail("reason", reason.clone()),
        )
        .await?;
        Ok(RunOutcome::ApplyFailed { reason })
    }
}
