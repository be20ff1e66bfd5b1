//! Single-run pipeline workflows.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use ci_healer::config::StoreBackend;
use ci_healer::engine::RunOutcome;
use ci_healer::error::ModelError;
use ci_healer::storage::AuditEvent;
use ci_healer::traits::CodeFix;
use pretty_assertions::assert_eq;

use super::support::{
    dockerfile_diagnosis, dockerfile_with, request, Sandbox, StubModel, FIX_APPLIED_LOG,
    ORIGINAL_DOCKERFILE,
};

#[tokio::test]
async fn test_missing_env_log_is_healed() {
    let sandbox = Sandbox::new(StoreBackend::File).await;
    let model = Arc::new(StubModel::new(
        dockerfile_diagnosis(0.95),
        [dockerfile_with("ENV FIX_APPLIED=true")],
    ));
    let engine = sandbox.engine(Arc::clone(&model));

    let report = engine.run(request("local-simulation", FIX_APPLIED_LOG)).await.unwrap();

    let RunOutcome::Applied { file, backup, explanation } = &report.outcome else {
        panic!("expected Applied, got {:?}", report.outcome);
    };
    assert_eq!(file, &sandbox.path("Dockerfile"));
    assert_eq!(explanation, "Add ENV FIX_APPLIED=true");
    assert!(sandbox.read("Dockerfile").contains("ENV FIX_APPLIED=true"));
    assert_eq!(sandbox.backups(), vec![backup.clone()]);
    assert_eq!(std::fs::read_to_string(backup).unwrap(), ORIGINAL_DOCKERFILE);

    let applied = sandbox.stores.audit.fix_history().unwrap();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].run_id, "local-simulation");
    assert_eq!(applied[0].provider, "local");
}

#[tokio::test]
async fn test_second_identical_failure_skips_model() {
    let sandbox = Sandbox::new(StoreBackend::Sqlite).await;
    let model = Arc::new(StubModel::new(dockerfile_diagnosis(0.5), []));
    let engine = sandbox.engine(Arc::clone(&model));

    let first = engine.run(request("1", FIX_APPLIED_LOG)).await.unwrap();
    let second = engine.run(request("2", FIX_APPLIED_LOG)).await.unwrap();

    assert_eq!(model.diagnoses(), 1);
    assert_eq!(first.diagnosis, second.diagnosis);
    assert!(second.cached);
    assert_eq!(second.outcome, RunOutcome::NeedsReview { confidence: 0.5 });
}

#[tokio::test]
async fn test_low_confidence_never_touches_files() {
    let sandbox = Sandbox::new(StoreBackend::File).await;
    let model = Arc::new(StubModel::new(
        dockerfile_diagnosis(0.8),
        [dockerfile_with("ENV FIX_APPLIED=true")],
    ));
    let engine = sandbox.engine(Arc::clone(&model));

    let report = engine.run(request("1", FIX_APPLIED_LOG)).await.unwrap();

    assert!(matches!(report.outcome, RunOutcome::NeedsReview { .. }));
    assert_eq!(sandbox.read("Dockerfile"), ORIGINAL_DOCKERFILE);
    assert_eq!(model.fix_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert!(sandbox.backups().is_empty());
}

#[tokio::test]
async fn test_secret_in_fix_is_refused() {
    let sandbox = Sandbox::new(StoreBackend::File).await;
    let leaked = CodeFix::new(
        format!("{ORIGINAL_DOCKERFILE}ENV API_KEY=\"sk_live_0123456789abcdef\"\n"),
        "hardcode key",
    );
    let model = Arc::new(StubModel::new(dockerfile_diagnosis(0.95), [leaked]));
    let engine = sandbox.engine(model);

    let report = engine.run(request("1", FIX_APPLIED_LOG)).await.unwrap();

    assert!(matches!(report.outcome, RunOutcome::SecretBlocked { .. }));
    assert_eq!(sandbox.read("Dockerfile"), ORIGINAL_DOCKERFILE);
    let events: Vec<_> = sandbox
        .stores
        .audit
        .entries()
        .unwrap()
        .into_iter()
        .map(|e| e.event)
        .collect();
    assert_eq!(events, vec![AuditEvent::AnalysisStarted, AuditEvent::SecretBlocked]);
}

#[tokio::test]
async fn test_model_outage_is_analysis_failure() {
    let sandbox = Sandbox::new(StoreBackend::File).await;
    let model = Arc::new(StubModel::failing(ModelError::RateLimited {
        retry_after_seconds: 1,
    }));
    let engine = sandbox.engine(Arc::clone(&model));

    let report = engine.run(request("1", "npm ERR! 429")).await.unwrap();

    assert!(matches!(report.outcome, RunOutcome::AnalysisFailed { .. }));
    // two attempts on the primary tier, two on the fallback tier
    assert_eq!(model.diagnoses(), 4);
    assert_eq!(engine.breaker().consecutive_failures().await, 2);
    let failed = sandbox.stores.audit.entries().unwrap();
    assert_eq!(failed.last().unwrap().detail_str("category"), Some("rate_limit"));
}

#[tokio::test]
async fn test_report_serializes_outcome_inline() {
    let sandbox = Sandbox::new(StoreBackend::File).await;
    let model = Arc::new(StubModel::new(dockerfile_diagnosis(0.3), []));
    let report = sandbox
        .engine(model)
        .run(request("7", FIX_APPLIED_LOG))
        .await
        .unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["outcome"], "needs_review");
    assert_eq!(json["run_id"], "7");
    assert_eq!(json["provider"], "local");
    assert_eq!(json["diagnosis"]["file_path"], "Dockerfile");
}
