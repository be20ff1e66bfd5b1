//! Path and output guardrails.

use std::sync::LazyLock;

use regex::Regex;

/// Files that are never edited unless explicitly allowed.
pub const RESTRICTED_FILES: &[&str] = &["package-lock.json", "yarn.lock", ".env", ".gitignore"];

/// Extensions that are never edited.
pub const SENSITIVE_EXTENSIONS: &[&str] = &["pem", "key", "crt", "p12"];

const SYSTEM_PREFIXES: &[&str] = &[
    "/etc", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/boot", "/proc", "/sys", "/dev",
];

const OUTPUT_PATTERNS: &[(&str, &str)] = &[
    (r"os\.system\s*\(", "shell execution"),
    (
        r"subprocess\.(run|call|Popen|check_output|check_call)\s*\(",
        "subprocess invocation",
    ),
    (r"child_process\.exec", "subprocess invocation"),
    (r"\beval\s*\(", "dynamic eval"),
    (r"\bexec\s*\(", "dynamic exec"),
    (r"__import__\s*\(", "dynamic import"),
];

static OUTPUT_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    OUTPUT_PATTERNS
        .iter()
        .filter_map(|(pattern, label)| Regex::new(pattern).ok().map(|re| (re, *label)))
        .collect()
});

/// Outcome of a policy check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyVerdict {
    /// Whether the input passed.
    pub allowed: bool,
    /// Why it was blocked; empty when allowed.
    pub reason: String,
}

impl PolicyVerdict {
    /// A passing verdict.
    #[must_use]
    pub const fn allow() -> Self {
        Self {
            allowed: true,
            reason: String::new(),
        }
    }

    /// A blocking verdict.
    #[must_use]
    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// Decide whether the model may modify `path`.
///
/// `allow_restricted` lifts the lockfile/`.gitignore` restriction only;
/// dotenv files and sensitive extensions stay blocked.
#[must_use]
pub fn check_path(path: &str, allow_restricted: bool) -> PolicyVerdict {
    let normalized = path.trim().replace('\\', "/");
    if normalized.is_empty() {
        return PolicyVerdict::block("Blocked: empty path");
    }

    if normalized.contains("..") {
        return PolicyVerdict::block("Blocked: path traversal");
    }

    let collapsed = collapse_leading_space(&normalized);
    if let Some(prefix) = SYSTEM_PREFIXES
        .iter()
        .find(|p| collapsed == **p || collapsed.starts_with(&format!("{p}/")))
    {
        return PolicyVerdict::block(format!("Blocked: system path {prefix}"));
    }

    if normalized.contains(".aws/credentials") {
        return PolicyVerdict::block("Blocked: AWS credentials file");
    }

    let name = normalized.rsplit('/').next().unwrap_or(&normalized);
    let lower_name = name.to_lowercase();
    if lower_name == ".env" || lower_name.ends_with(".env") || lower_name.starts_with(".env.") {
        return PolicyVerdict::block(format!("Blocked: dotenv file {name}"));
    }

    if !allow_restricted && RESTRICTED_FILES.contains(&name) {
        return PolicyVerdict::block(format!("Blocked: restricted file {name}"));
    }

    if let Some((_, ext)) = lower_name.rsplit_once('.') {
        if SENSITIVE_EXTENSIONS.contains(&ext) {
            return PolicyVerdict::block(format!("Blocked: sensitive extension .{ext}"));
        }
    }

    PolicyVerdict::allow()
}

/// `"/ bin/sh"` is treated like `"/bin/sh"`.
fn collapse_leading_space(path: &str) -> String {
    path.strip_prefix('/').map_or_else(
        || path.to_string(),
        |rest| format!("/{}", rest.trim_start()),
    )
}

/// Decide whether generated code is safe to write.
#[must_use]
pub fn check_output(code: &str) -> PolicyVerdict {
    OUTPUT_RULES
        .iter()
        .find(|(re, _)| re.is_match(code))
        .map_or_else(PolicyVerdict::allow, |(_, label)| {
            PolicyVerdict::block(format!("Suspicious: {label}"))
        })
}
