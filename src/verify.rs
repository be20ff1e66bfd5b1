//! Syntax checks of candidate content before it replaces a file.
//!
//! The candidate is staged in a scratch directory outside the project with
//! the target's extension, checked, and removed again, so verifying never
//! touches the project tree. A checker that is not installed counts as a
//! skipped check, not a failure.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::traits::{PreVerifier, VerifyOutcome};

/// Default bound on one check.
pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// How one file type is checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxCheck {
    /// Parse as JSON in process.
    Json,
    /// Run `program args... <staged file>`; exit status 0 passes.
    Command {
        /// Executable name.
        program: String,
        /// Arguments placed before the staged path.
        args: Vec<String>,
    },
}

impl SyntaxCheck {
    fn command(program: &str, args: &[&str]) -> Self {
        Self::Command {
            program: program.to_string(),
            args: args.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Pre-verifier running a syntax check chosen by file extension.
#[derive(Debug, Clone)]
pub struct CommandPreVerifier {
    checks: HashMap<String, SyntaxCheck>,
    timeout: Duration,
    staging_dir: PathBuf,
}

impl Default for CommandPreVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_VERIFY_TIMEOUT)
    }
}

impl CommandPreVerifier {
    /// Create a verifier with the built-in checks.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let node = SyntaxCheck::command("node", &["--check"]);
        let python = SyntaxCheck::command(
            "python3",
            &["-c", "import ast,sys; ast.parse(open(sys.argv[1]).read(), sys.argv[1])"],
        );
        let shell = SyntaxCheck::command("bash", &["-n"]);

        let checks = [
            ("js", node.clone()),
            ("mjs", node.clone()),
            ("cjs", node),
            ("py", python),
            ("sh", shell.clone()),
            ("bash", shell),
            ("json", SyntaxCheck::Json),
        ]
        .into_iter()
        .map(|(ext, check)| (ext.to_string(), check))
        .collect();

        Self {
            checks,
            timeout,
            staging_dir: std::env::temp_dir(),
        }
    }

    /// Stage candidates under `dir` instead of the system temp directory.
    #[must_use]
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = dir.into();
        self
    }

    /// Register or replace the check for an extension (without the dot).
    #[must_use]
    pub fn with_check(mut self, extension: &str, check: SyntaxCheck) -> Self {
        self.checks.insert(extension.to_ascii_lowercase(), check);
        self
    }

    fn check_for(&self, target: &Path) -> Option<(&str, &SyntaxCheck)> {
        let ext = target.extension()?.to_str()?.to_ascii_lowercase();
        self.checks
            .get_key_value(ext.as_str())
            .map(|(k, v)| (k.as_str(), v))
    }

    fn staging_path(&self, target: &Path, extension: &str) -> PathBuf {
        let stem = target
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("candidate");
        self.staging_dir
            .join(format!("ci-healer-{stem}.{}.verify.{extension}", Uuid::new_v4().simple()))
    }

    async fn run_command(&self, program: &str, args: &[String], staged: &Path) -> VerifyOutcome {
        let child = Command::new(program)
            .args(args)
            .arg(staged)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(program, "Checker not installed, skipping pre-verify");
                return VerifyOutcome::pass(format!("skipped: {program} not found"));
            }
            Err(e) => return VerifyOutcome::fail(format!("failed to run {program}: {e}")),
        };

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Err(_) => VerifyOutcome::fail("Verification timeout"),
            Ok(Err(e)) => VerifyOutcome::fail(format!("{program} failed: {e}")),
            Ok(Ok(output)) if output.status.success() => VerifyOutcome::pass("OK"),
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let stdout = String::from_utf8_lossy(&output.stdout);
                let detail = [stderr.trim(), stdout.trim()]
                    .into_iter()
                    .find(|s| !s.is_empty())
                    .unwrap_or("Check failed");
                VerifyOutcome::fail(detail.to_string())
            }
        }
    }
}

#[async_trait]
impl PreVerifier for CommandPreVerifier {
    async fn verify(&self, target: &Path, candidate: &str) -> VerifyOutcome {
        let Some((extension, check)) = self.check_for(target) else {
            debug!(target = %target.display(), "No syntax check for file type");
            return VerifyOutcome::pass("OK");
        };

        let (program, args) = match check {
            SyntaxCheck::Json => {
                return match serde_json::from_str::<serde_json::Value>(candidate) {
                    Ok(_) => VerifyOutcome::pass("OK"),
                    Err(e) => VerifyOutcome::fail(format!("invalid JSON: {e}")),
                };
            }
            SyntaxCheck::Command { program, args } => (program, args),
        };

        if let Err(e) = tokio::fs::create_dir_all(&self.staging_dir).await {
            return VerifyOutcome::fail(format!("cannot create staging dir: {e}"));
        }
        let staged = self.staging_path(target, extension);
        if let Err(e) = tokio::fs::write(&staged, candidate).await {
            return VerifyOutcome::fail(format!("cannot stage candidate: {e}"));
        }
        let outcome = self.run_command(program, args, &staged).await;
        if let Err(e) = tokio::fs::remove_file(&staged).await {
            warn!(path = %staged.display(), error = %e, "Failed to remove staged candidate");
        }
        outcome
    }
}
