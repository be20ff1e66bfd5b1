//! Integration tests for the CI healer.
//!
//! These tests drive the command-line surface end to end:
//! - Configuration from the environment
//! - Heal, dry run and rollback through `execute`
//! - Wiring errors surfaced as `AppError`

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use ci_healer::cli::{execute, App, Cli};
use ci_healer::config::{Config, StateConfig};
use ci_healer::error::{AppError, ConfigError, ModelError};
use ci_healer::shutdown::ShutdownSignal;
use ci_healer::storage::{AuditEvent, AuditLog};
use ci_healer::traits::{CodeFix, Diagnosis, DiagnosisRequest, FixRequest, ModelClient};
use clap::Parser;
use serial_test::serial;
use tempfile::TempDir;

// ============================================================================
// Test Utilities
// ============================================================================

const ENV_VARS: &[&str] = &["STATE_DIR", "PROJECT_ROOT", "SKIP_PRE_VERIFY", "CONFIDENCE_THRESHOLD"];

/// Always proposes adding `FIX_APPLIED` to the Dockerfile.
struct DockerfileModel;

#[async_trait]
impl ModelClient for DockerfileModel {
    async fn diagnose(&self, _model: &str, request: &DiagnosisRequest) -> Result<Diagnosis, ModelError> {
        assert!(request.logs.contains("FIX_APPLIED"), "unexpected logs: {}", request.logs);
        Ok(Diagnosis::new(
            "Missing FIX_APPLIED environment variable",
            "Add ENV FIX_APPLIED=true",
            "Dockerfile",
            0.95,
        ))
    }

    async fn generate_fix(&self, _model: &str, request: &FixRequest) -> Result<CodeFix, ModelError> {
        Ok(CodeFix::new(
            format!("{}ENV FIX_APPLIED=true\n", request.file_content),
            "Define FIX_APPLIED",
        ))
    }
}

fn project(dir: &Path) {
    std::fs::create_dir_all(dir.join("project/docker")).unwrap();
    std::fs::write(dir.join("project/docker/Dockerfile"), "FROM node:18\n").unwrap();
}

fn cli(args: &[&str]) -> Cli {
    Cli::parse_from(std::iter::once("ci-healer").chain(args.iter().copied()))
}

fn clear_env() {
    for var in ENV_VARS {
        std::env::remove_var(var);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
#[serial]
async fn test_env_configured_heal_then_rollback() {
    let dir = TempDir::new().unwrap();
    project(dir.path());
    clear_env();
    std::env::set_var("STATE_DIR", dir.path().join("state"));
    std::env::set_var("PROJECT_ROOT", dir.path().join("project"));
    std::env::set_var("SKIP_PRE_VERIFY", "true");

    let config = Config::from_env().expect("config");
    clear_env();
    assert_eq!(config.state.audit_log_path, dir.path().join("state/agent_audit.jsonl"));

    let app = App::open(config, ShutdownSignal::new())
        .await
        .unwrap()
        .with_model(Arc::new(DockerfileModel));
    let dockerfile = dir.path().join("project/docker/Dockerfile");

    assert_eq!(execute(cli(&["--simulate-failure"]), &app).await.unwrap(), 0);
    assert_eq!(
        std::fs::read_to_string(&dockerfile).unwrap(),
        "FROM node:18\nENV FIX_APPLIED=true\n"
    );

    let audit = AuditLog::new(dir.path().join("state/agent_audit.jsonl"));
    let history = audit.fix_history().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(
        history[0].detail_str("file"),
        Some(dockerfile.display().to_string().as_str())
    );

    assert_eq!(execute(cli(&["--rollback"]), &app).await.unwrap(), 0);
    assert_eq!(std::fs::read_to_string(&dockerfile).unwrap(), "FROM node:18\n");
    assert!(audit
        .entries()
        .unwrap()
        .iter()
        .any(|e| e.event == AuditEvent::FixRolledBack));
}

#[tokio::test]
#[serial]
async fn test_dry_run_reports_without_writing() {
    let dir = TempDir::new().unwrap();
    project(dir.path());
    let mut config = Config::default();
    config.state = StateConfig::under(dir.path().join("state"));
    config.pipeline.project_root = dir.path().join("project");
    config.pipeline.skip_pre_verify = true;
    let app = App::open(config, ShutdownSignal::new())
        .await
        .unwrap()
        .with_model(Arc::new(DockerfileModel));

    let status = execute(
        cli(&["--dry-run", "--logs", "Environment variable 'FIX_APPLIED' is missing."]),
        &app,
    )
    .await
    .unwrap();

    assert_eq!(status, 0);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("project/docker/Dockerfile")).unwrap(),
        "FROM node:18\n"
    );
    assert!(app.stores.audit.fix_history().unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn test_heal_without_api_key_is_config_error() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.state = StateConfig::under(dir.path().join("state"));
    config.model.api_key = None;
    let app = App::open(config, ShutdownSignal::new()).await.unwrap();

    let err = execute(cli(&["--logs", "boom"]), &app).await.unwrap_err();

    match err {
        AppError::Config(ConfigError::MissingRequired { var }) => {
            assert_eq!(var, "ANTHROPIC_API_KEY");
        }
        other => panic!("Expected MissingRequired, got: {other:?}"),
    }
}

#[tokio::test]
#[serial]
async fn test_jenkins_without_env_fails_before_model() {
    let dir = TempDir::new().unwrap();
    std::env::remove_var("JENKINS_URL");
    let mut config = Config::default();
    config.state = StateConfig::under(dir.path().join("state"));
    let app = App::open(config, ShutdownSignal::new())
        .await
        .unwrap()
        .with_model(Arc::new(DockerfileModel));

    let err = execute(cli(&["--provider", "jenkins", "--run-id", "app/7"]), &app)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Provider(_)), "{err:?}");
}
