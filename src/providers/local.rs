//! Local provider and simulated failures for development runs.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use tracing::info;

use crate::error::ProviderError;
use crate::traits::LogSource;

/// Failure log the local provider returns.
pub const LOCAL_FAILURE_LOG: &str = "\
Step 4/5 : RUN npm test
> target-app@1.0.0 test
> node test.js

Running comprehensive test suite...
Checking environment configuration...
❌ CRITICAL ERROR: Environment variable 'FIX_APPLIED' is missing.
Test suite failed.
npm ERR! Test failed.
";

/// Kinds of failure `--simulate-failure` can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedFailure {
    /// A required environment variable is missing.
    MissingEnv,
    /// An npm package cannot be found.
    NpmNotFound,
    /// A JavaScript syntax error.
    SyntaxError,
}

impl SimulatedFailure {
    const fn marker(self) -> &'static str {
        match self {
            Self::MissingEnv => "Environment variable 'FIX_APPLIED' is missing. Test suite failed.",
            Self::NpmNotFound => "npm ERR! 404 Not Found: package 'typo-pkg@1.0.0'",
            Self::SyntaxError => "SyntaxError: Unexpected token in test.js:42",
        }
    }
}

impl fmt::Display for SimulatedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MissingEnv => "missing-env",
            Self::NpmNotFound => "npm-404",
            Self::SyntaxError => "syntax-error",
        })
    }
}

impl FromStr for SimulatedFailure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = s.trim().to_lowercase();
        if kind.contains("fix_applied") || kind.contains("env") {
            Ok(Self::MissingEnv)
        } else if kind.contains("npm") || kind.contains("404") {
            Ok(Self::NpmNotFound)
        } else if kind.contains("syntax") {
            Ok(Self::SyntaxError)
        } else {
            Err(format!(
                "unknown failure kind '{s}' (expected missing-env, npm-404 or syntax-error)"
            ))
        }
    }
}

/// Build a short failure log of the given kind.
#[must_use]
pub fn simulated_logs(kind: SimulatedFailure) -> String {
    format!(
        "> node test.js\n❌ CRITICAL ERROR: {}\nnpm ERR! Test failed.\n",
        kind.marker()
    )
}

/// Provider for local runs: always returns a canned failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSource {
    simulate: Option<SimulatedFailure>,
}

impl LocalSource {
    /// Source returning [`LOCAL_FAILURE_LOG`].
    #[must_use]
    pub const fn new() -> Self {
        Self { simulate: None }
    }

    /// Source returning a simulated failure of `kind`.
    #[must_use]
    pub const fn simulating(kind: SimulatedFailure) -> Self {
        Self {
            simulate: Some(kind),
        }
    }
}

#[async_trait]
impl LogSource for LocalSource {
    async fn fetch_logs(&self, run_id: &str) -> Result<String, ProviderError> {
        info!(run_id, simulate = ?self.simulate, "Returning local logs");
        Ok(self
            .simulate
            .map_or_else(|| LOCAL_FAILURE_LOG.to_string(), simulated_logs))
    }

    fn context(&self) -> String {
        "Local Docker Environment".into()
    }

    fn validate_env(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("missing-env", SimulatedFailure::MissingEnv ; "env")]
    #[test_case("FIX_APPLIED", SimulatedFailure::MissingEnv ; "marker")]
    #[test_case("npm-404", SimulatedFailure::NpmNotFound ; "npm")]
    #[test_case("SyntaxError", SimulatedFailure::SyntaxError ; "syntax")]
    fn test_parse_kind(input: &str, expected: SimulatedFailure) {
        assert_eq!(input.parse::<SimulatedFailure>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_kind() {
        assert!("segfault".parse::<SimulatedFailure>().is_err());
    }

    #[test]
    fn test_simulated_log_contains_marker() {
        let log = simulated_logs(SimulatedFailure::NpmNotFound);
        assert!(log.contains("❌ CRITICAL ERROR: npm ERR! 404"));
        assert!(log.ends_with("npm ERR! Test failed.\n"));
    }

    #[tokio::test]
    async fn test_local_source_default_log() {
        let logs = LocalSource::new().fetch_logs("1").await.unwrap();
        assert!(logs.contains("❌ CRITICAL ERROR: Environment variable 'FIX_APPLIED' is missing."));
    }

    #[tokio::test]
    async fn test_local_source_simulating() {
        let logs = LocalSource::simulating(SimulatedFailure::SyntaxError)
            .fetch_logs("1")
            .await
            .unwrap();
        assert!(logs.contains("SyntaxError"));
    }
}
