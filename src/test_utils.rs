//! Test utilities and mock factories.
//!
//! This module provides shared testing infrastructure:
//! - Mock model clients with fixed answers
//! - A project directory with files to fix and isolated state stores
//! - Engine settings that never sleep
//!
//! Only compiled for tests (`#[cfg(test)]`).

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use crate::config::StateConfig;
use crate::engine::{EngineSettings, RemediationEngine, RunRequest};
use crate::error::ModelError;
use crate::providers::Provider;
use crate::resilience::{ModelRouter, RetryPolicy};
use crate::resolver::ProjectFileResolver;
use crate::storage::Stores;
use crate::traits::{CodeFix, Diagnosis, MockModelClient};

/// The canonical failing log line.
pub const FIX_APPLIED_LOG: &str = "❌ CRITICAL ERROR: Environment variable 'FIX_APPLIED' is missing.";

/// A diagnosis targeting `file_path`.
#[must_use]
pub fn sample_diagnosis(file_path: &str, confidence: f64) -> Diagnosis {
    Diagnosis::new(
        "Environment variable FIX_APPLIED is not set in the image",
        "Add ENV FIX_APPLIED=true to the Dockerfile",
        file_path,
        confidence,
    )
}

/// A mock model that always returns `diagnosis` and `fix`.
#[must_use]
pub fn mock_model(diagnosis: Diagnosis, fix: CodeFix) -> MockModelClient {
    let mut mock = MockModelClient::new();
    mock.expect_diagnose()
        .returning(move |_, _| Ok(diagnosis.clone()));
    mock.expect_generate_fix()
        .returning(move |_, _| Ok(fix.clone()));
    mock
}

/// A mock model whose diagnosis calls all fail with `error`.
#[must_use]
pub fn failing_model(error: ModelError) -> MockModelClient {
    let mut mock = MockModelClient::new();
    mock.expect_diagnose()
        .returning(move |_, _| Err(error.clone()));
    mock.expect_generate_fix().never();
    mock
}

/// Engine settings with one attempt per call and distinct primary/fallback models.
#[must_use]
pub fn fast_settings() -> EngineSettings {
    EngineSettings {
        confidence_threshold: 0.8,
        log_max_chars: 20_000,
        quorum_size: 0,
        allow_restricted_files: false,
        alert_failure_threshold: 3,
        request_timeout: Duration::from_secs(5),
        retry: RetryPolicy::immediate(1),
        router: ModelRouter::new("large-model", "primary-model", "fallback-model", 15_000),
    }
}

/// A temporary project plus its state directory.
pub struct Workspace {
    dir: TempDir,
    /// Stores rooted under `<tmp>/state`.
    pub stores: Stores,
}

impl Workspace {
    /// A workspace containing a `Dockerfile`.
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("project")).unwrap();
        let stores = Stores::open(&StateConfig::under(dir.path().join("state")))
            .await
            .unwrap();
        let ws = Self { dir, stores };
        ws.write("Dockerfile", "FROM node:18\nCMD [\"node\", \"app.js\"]\n");
        ws
    }

    /// Project root.
    pub fn root(&self) -> PathBuf {
        self.dir.path().join("project")
    }

    /// State directory.
    pub fn state_dir(&self) -> PathBuf {
        self.dir.path().join("state")
    }

    /// Write a project file, creating parents.
    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    /// Read a project file.
    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.root().join(relative)).unwrap()
    }

    /// Number of files in the backup directory.
    pub fn backup_count(&self) -> usize {
        count_files(&self.state_dir().join("backups"))
    }

    /// Engine over this workspace with `model`.
    pub fn engine(&self, model: MockModelClient) -> RemediationEngine {
        RemediationEngine::new(
            Arc::new(model),
            Arc::new(ProjectFileResolver::new(self.root())),
            &self.stores,
            fast_settings(),
        )
    }
}

/// A local run request for `logs`.
#[must_use]
pub fn local_request(run_id: &str, logs: &str) -> RunRequest {
    RunRequest::new(run_id, Provider::Local, "Local simulation", logs)
}

fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).map_or(0, |entries| entries.filter_map(Result::ok).count())
}
