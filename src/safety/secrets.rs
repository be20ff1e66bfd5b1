//! Credential leak detection in generated code.
//!
//! Runs independently of the guardrails: code that passes [`check_output`]
//! can still be refused here.
//!
//! [`check_output`]: super::check_output

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// Kind of secret a pattern detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKind {
    /// Run of 40+ base64 characters.
    EncodedBlob,
    /// `password = "..."`, `api_key: ...` and similar.
    CredentialAssignment,
    /// `Bearer <token>`.
    BearerToken,
    /// PEM-armoured key or certificate.
    PemBlock,
}

impl fmt::Display for SecretKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::EncodedBlob => "long base64 string",
            Self::CredentialAssignment => "credential assignment",
            Self::BearerToken => "bearer token",
            Self::PemBlock => "PEM block",
        };
        f.write_str(label)
    }
}

/// First secret found in a piece of content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretFinding {
    /// What matched.
    pub kind: SecretKind,
    /// Byte offset of the match.
    pub offset: usize,
}

impl fmt::Display for SecretFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Possible secret: {} at byte {}", self.kind, self.offset)
    }
}

const PATTERNS: &[(SecretKind, &str)] = &[
    (SecretKind::PemBlock, r"-----BEGIN [A-Z ]+-----[\s\S]+?-----END [A-Z ]+-----"),
    (
        SecretKind::CredentialAssignment,
        r#"(?i)(password|secret|api[_-]?key|token)\s*[:=]\s*["']?[^\s"']{8,}"#,
    ),
    (SecretKind::BearerToken, r"(?i)Bearer\s+[A-Za-z0-9\-_.]{20,}"),
    (SecretKind::EncodedBlob, r"[A-Za-z0-9+/]{40,}={0,2}"),
];

static RULES: LazyLock<Vec<(SecretKind, Regex)>> = LazyLock::new(|| {
    PATTERNS
        .iter()
        .filter_map(|(kind, pattern)| Regex::new(pattern).ok().map(|re| (*kind, re)))
        .collect()
});

/// Return the first secret-like match in `content`, if any.
#[must_use]
pub fn scan_for_secrets(content: &str) -> Option<SecretFinding> {
    RULES.iter().find_map(|(kind, re)| {
        re.find(content).map(|m| SecretFinding {
            kind: *kind,
            offset: m.start(),
        })
    })
}
