//! Coarse classification of failure messages for trending.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Failure category recorded with `analysis_failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Missing package, file or symbol.
    MissingDependency,
    /// Syntax or parse error.
    SyntaxError,
    /// Something timed out.
    Timeout,
    /// Permission denied.
    Permission,
    /// Rate limited.
    RateLimit,
    /// Connection refused.
    Connection,
    /// Configuration or environment.
    Config,
    /// Memory or other resource exhaustion.
    Resource,
    /// Anything else.
    Other,
}

impl ErrorCategory {
    /// The serialized name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingDependency => "missing_dependency",
            Self::SyntaxError => "syntax_error",
            Self::Timeout => "timeout",
            Self::Permission => "permission",
            Self::RateLimit => "rate_limit",
            Self::Connection => "connection",
            Self::Config => "config",
            Self::Resource => "resource",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checked in order; the first match wins.
const RULES: &[(&str, ErrorCategory)] = &[
    (r"missing|not found|undefined|404", ErrorCategory::MissingDependency),
    (r"syntax|parse|invalid", ErrorCategory::SyntaxError),
    (r"timeout|timed out", ErrorCategory::Timeout),
    (r"permission|denied|403", ErrorCategory::Permission),
    (r"rate limit|429", ErrorCategory::RateLimit),
    (r"connection refused|econnrefused", ErrorCategory::Connection),
    (r"env|environment variable", ErrorCategory::Config),
    (r"memory|\boom\b", ErrorCategory::Resource),
];

static COMPILED: LazyLock<Vec<(Regex, ErrorCategory)>> = LazyLock::new(|| {
    RULES
        .iter()
        .filter_map(|(pattern, category)| {
            Regex::new(&format!("(?i){pattern}"))
                .ok()
                .map(|re| (re, *category))
        })
        .collect()
});

/// Categorize a failure message.
#[must_use]
pub fn categorize(message: &str) -> ErrorCategory {
    COMPILED
        .iter()
        .find(|(re, _)| re.is_match(message))
        .map_or(ErrorCategory::Other, |(_, category)| *category)
}
