//! Stub capabilities and fixtures shared by the workflow tests.

#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ci_healer::config::{StateConfig, StoreBackend};
use ci_healer::engine::{EngineSettings, RemediationEngine, RunRequest};
use ci_healer::error::ModelError;
use ci_healer::providers::Provider;
use ci_healer::resilience::{ModelRouter, RetryPolicy};
use ci_healer::resolver::ProjectFileResolver;
use ci_healer::storage::Stores;
use ci_healer::traits::{CodeFix, Diagnosis, DiagnosisRequest, FixRequest, ModelClient};
use tempfile::TempDir;

pub const FIX_APPLIED_LOG: &str = "❌ CRITICAL ERROR: Environment variable 'FIX_APPLIED' is missing.";
pub const ORIGINAL_DOCKERFILE: &str = "FROM node:18\nWORKDIR /app\nCMD [\"npm\", \"test\"]\n";

/// Model stub: one diagnosis for every log, fixes served in order.
pub struct StubModel {
    diagnosis: Result<Diagnosis, ModelError>,
    fixes: Mutex<VecDeque<CodeFix>>,
    pub diagnose_calls: AtomicUsize,
    pub fix_calls: AtomicUsize,
}

impl StubModel {
    pub fn new(diagnosis: Diagnosis, fixes: impl IntoIterator<Item = CodeFix>) -> Self {
        Self {
            diagnosis: Ok(diagnosis),
            fixes: Mutex::new(fixes.into_iter().collect()),
            diagnose_calls: AtomicUsize::new(0),
            fix_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: ModelError) -> Self {
        Self {
            diagnosis: Err(error),
            fixes: Mutex::new(VecDeque::new()),
            diagnose_calls: AtomicUsize::new(0),
            fix_calls: AtomicUsize::new(0),
        }
    }

    pub fn diagnoses(&self) -> usize {
        self.diagnose_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for StubModel {
    async fn diagnose(&self, _model: &str, _request: &DiagnosisRequest) -> Result<Diagnosis, ModelError> {
        self.diagnose_calls.fetch_add(1, Ordering::SeqCst);
        self.diagnosis.clone()
    }

    async fn generate_fix(&self, _model: &str, _request: &FixRequest) -> Result<CodeFix, ModelError> {
        self.fix_calls.fetch_add(1, Ordering::SeqCst);
        self.fixes
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ModelError::UnexpectedResponse {
                message: "no fix scripted".into(),
            })
    }
}

pub fn dockerfile_diagnosis(confidence: f64) -> Diagnosis {
    Diagnosis::new(
        "FIX_APPLIED is not defined in the container environment",
        "Add ENV FIX_APPLIED=true before CMD",
        "Dockerfile",
        confidence,
    )
}

pub fn dockerfile_with(line: &str) -> CodeFix {
    CodeFix::new(
        format!("FROM node:18\nWORKDIR /app\n{line}\nCMD [\"npm\", \"test\"]\n"),
        format!("Add {line}"),
    )
}

pub fn settings() -> EngineSettings {
    EngineSettings {
        confidence_threshold: 0.8,
        log_max_chars: 16_000,
        quorum_size: 0,
        allow_restricted_files: false,
        alert_failure_threshold: 3,
        request_timeout: Duration::from_secs(5),
        retry: RetryPolicy::immediate(2),
        router: ModelRouter::new("large", "small", "fallback", 15_000),
    }
}

/// Project and state directories under one temp dir.
pub struct Sandbox {
    dir: TempDir,
    pub stores: Stores,
}

impl Sandbox {
    pub async fn new(backend: StoreBackend) -> Self {
        let dir = TempDir::new().expect("temp dir");
        std::fs::create_dir_all(dir.path().join("project")).unwrap();
        std::fs::write(dir.path().join("project/Dockerfile"), ORIGINAL_DOCKERFILE).unwrap();
        let mut state = StateConfig::under(dir.path().join("state"));
        state.backend = backend;
        let stores = Stores::open(&state).await.expect("stores");
        Self { dir, stores }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("project")
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }

    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.path(relative)).unwrap()
    }

    pub fn backups(&self) -> Vec<PathBuf> {
        list(&self.dir.path().join("state/backups"))
    }

    pub fn engine(&self, model: Arc<StubModel>) -> RemediationEngine {
        RemediationEngine::new(
            model,
            Arc::new(ProjectFileResolver::new(self.root())),
            &self.stores,
            settings(),
        )
    }
}

pub fn request(run_id: &str, logs: &str) -> RunRequest {
    RunRequest::new(run_id, Provider::Local, "Local Docker Environment", logs)
}

fn list(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir).map_or_else(
        |_| Vec::new(),
        |entries| entries.filter_map(Result::ok).map(|e| e.path()).collect(),
    )
}
