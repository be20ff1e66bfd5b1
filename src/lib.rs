//! CI Healer
//!
//! Autonomous remediation of failed CI/CD runs: fetch the failure log,
//! diagnose it with a generative model, and apply a guarded single-file fix
//! with a durable backup and an append-only audit trail.
//!
//! # Features
//!
//! - Diagnosis through the Anthropic Messages API with retry, tier fallback,
//!   a circuit breaker and optional quorum
//! - Content-addressed analysis cache so identical failures cost one model call
//! - Path and output guardrails plus a secret scanner before anything is written
//! - Backup before every write, atomic replacement, and rollback from the audit log
//! - GitHub Actions, Jenkins, GitLab CI and Azure DevOps log sources
//! - Durable job queue (file or `SQLite`) drained by a worker
//!
//! # Quick Start
//!
//! ```bash
//! ANTHROPIC_API_KEY=sk-ant-xxx ci-healer --provider local
//! ci-healer --rollback
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  logs   ┌───────────────────┐  diagnose/fix  ┌───────────────┐
//! │ CLI / Worker │────────▶│ RemediationEngine │───────────────▶│ Anthropic API │
//! └──────┬───────┘         └─────────┬─────────┘                └───────────────┘
//!        │ JobQueue                  │ backup, write, audit
//!        ▼                           ▼
//!   file / SQLite          project files, logs/ state
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod llm;
pub mod notify;
pub mod providers;
pub mod reports;
pub mod resilience;
pub mod resolver;
pub mod rollback;
pub mod safety;
pub mod shutdown;
pub mod storage;
pub mod traits;
pub mod verify;
pub mod worker;

#[cfg(test)]
mod test_utils;
