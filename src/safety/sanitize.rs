//! Log preparation before a model call.
//!
//! Logs are capped in bytes, secret-masked, then truncated to a character
//! budget keeping the head (setup context) and the tail (where failures
//! usually are).

use std::sync::LazyLock;

use regex::Regex;

/// Hard cap on raw log input.
pub const MAX_INPUT_BYTES: usize = 10 * 1024 * 1024;

const REDACTED: &str = "***REDACTED***";

const TRUNCATION_MARKER: &str = "\n... [TRUNCATED - middle portion omitted] ...\n";

const MASKS: &[(&str, &str)] = &[
    (
        r#"(?i)(password|passwd|pwd|secret|token|api[_-]?key|auth)\s*[:=]\s*["']?([^\s"']+)"#,
        "${1}=***REDACTED***",
    ),
    (r"Bearer\s+[A-Za-z0-9\-_.]+", "Bearer ***REDACTED***"),
    (
        r"(-----BEGIN [A-Z ]+-----)[\s\S]+?(-----END [A-Z ]+-----)",
        "${1}***REDACTED***${2}",
    ),
    (r"[A-Za-z0-9+/]{50,}={0,2}", REDACTED),
];

static MASK_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    MASKS
        .iter()
        .filter_map(|(pattern, repl)| Regex::new(pattern).ok().map(|re| (re, *repl)))
        .collect()
});

/// Redact common secret patterns from `text`.
#[must_use]
pub fn mask_secrets(text: &str) -> String {
    MASK_RULES
        .iter()
        .fold(text.to_string(), |acc, (re, repl)| {
            re.replace_all(&acc, *repl).into_owned()
        })
}

/// Cap `logs` at `max_bytes` (on a char boundary) and mask secrets.
#[must_use]
pub fn sanitize_logs(logs: &str, max_bytes: usize) -> String {
    if logs.len() <= max_bytes {
        return mask_secrets(logs);
    }
    let mut cut = max_bytes;
    while cut > 0 && !logs.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut capped = logs[..cut].to_string();
    capped.push_str("\n...[truncated]");
    mask_secrets(&capped)
}

/// Keep the first quarter of the budget and the tail, dropping the middle.
#[must_use]
pub fn truncate_logs_smart(logs: &str, max_chars: usize) -> String {
    let total = logs.chars().count();
    if total <= max_chars {
        return logs.to_string();
    }
    let header_chars = max_chars / 4;
    let tail_chars = max_chars.saturating_sub(header_chars).saturating_sub(200);

    let header: String = logs.chars().take(header_chars).collect();
    let tail: String = logs.chars().skip(total - tail_chars).collect();
    format!("{header}{TRUNCATION_MARKER}{tail}")
}

/// Full preparation: byte cap, masking, then smart truncation.
#[must_use]
pub fn prepare_logs(logs: &str, max_chars: usize) -> String {
    truncate_logs_smart(&sanitize_logs(logs, MAX_INPUT_BYTES), max_chars)
}
