//! Apply then undo.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use ci_healer::config::StoreBackend;
use ci_healer::engine::RunOutcome;
use ci_healer::rollback::RollbackManager;
use ci_healer::storage::AuditEvent;

use super::support::{
    dockerfile_diagnosis, dockerfile_with, request, Sandbox, StubModel, ORIGINAL_DOCKERFILE,
};

async fn apply_two_fixes(sandbox: &Sandbox) {
    let model = Arc::new(StubModel::new(
        dockerfile_diagnosis(0.95),
        [
            dockerfile_with("ENV FIX_APPLIED=true"),
            dockerfile_with("ENV FIX_APPLIED=true\nENV NODE_ENV=test"),
        ],
    ));
    let engine = sandbox.engine(model);
    for (run, logs) in [("1", "first failure"), ("2", "second failure")] {
        let report = engine.run(request(run, logs)).await.unwrap();
        assert!(matches!(report.outcome, RunOutcome::Applied { .. }), "{run}");
    }
}

fn manager(sandbox: &Sandbox) -> RollbackManager {
    RollbackManager::new(sandbox.stores.audit.clone(), Arc::clone(&sandbox.stores.backups))
}

#[tokio::test]
async fn test_restore_last_walks_back_one_fix_at_a_time() {
    let sandbox = Sandbox::new(StoreBackend::File).await;
    apply_two_fixes(&sandbox).await;
    assert!(sandbox.read("Dockerfile").contains("NODE_ENV"));

    let manager = manager(&sandbox);
    let first = manager.restore_last().await.unwrap();
    assert!(first.is_success());
    let content = sandbox.read("Dockerfile");
    assert!(content.contains("FIX_APPLIED") && !content.contains("NODE_ENV"));

    let second = manager.restore_last().await.unwrap();
    assert!(second.is_success());
    assert_eq!(sandbox.read("Dockerfile"), ORIGINAL_DOCKERFILE);

    let third = manager.restore_last().await.unwrap();
    assert!(!third.is_success());
    assert_eq!(third.summary(), "No fix to rollback");
}

#[tokio::test]
async fn test_restore_n_returns_to_original() {
    let sandbox = Sandbox::new(StoreBackend::Sqlite).await;
    apply_two_fixes(&sandbox).await;

    let report = manager(&sandbox).restore_n(2).await.unwrap();

    assert_eq!(report.attempted, 2);
    assert_eq!(report.restored, 2);
    assert_eq!(sandbox.read("Dockerfile"), ORIGINAL_DOCKERFILE);
    let rolled_back = sandbox
        .stores
        .audit
        .entries()
        .unwrap()
        .into_iter()
        .filter(|e| e.event == AuditEvent::FixRolledBack)
        .count();
    assert_eq!(rolled_back, 2);
}
