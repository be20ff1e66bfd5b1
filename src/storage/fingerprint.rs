//! Content fingerprints for the analysis cache.

use std::fmt;

use sha2::{Digest, Sha256};

/// SHA-256 hex digest of raw log text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogFingerprint(String);

impl LogFingerprint {
    /// Fingerprint raw (unprepared) log text.
    #[must_use]
    pub fn of(logs: &str) -> Self {
        Self(hex::encode(Sha256::digest(logs.as_bytes())))
    }

    /// Full hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for log fields.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for LogFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
