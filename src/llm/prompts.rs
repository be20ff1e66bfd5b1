//! Prompt templates for diagnosis and code fix generation.

use crate::traits::{DiagnosisRequest, FixRequest};

/// System prompt for log diagnosis.
pub const DIAGNOSIS_SYSTEM: &str =
    "You are an expert DevOps engineer diagnosing CI/CD failures. Respond with JSON only.";

/// System prompt for code fix generation.
pub const FIX_SYSTEM: &str =
    "You are an expert software engineer. Return the COMPLETE corrected file content as JSON only.";

/// Worked examples included in every diagnosis prompt.
pub const FEW_SHOT_EXAMPLES: &str = r#"EXAMPLE 1:
LOGS:
> node test.js
❌ CRITICAL ERROR: Environment variable 'FIX_APPLIED' is missing.
Test suite failed.
ANSWER:
{"root_cause": "Missing required environment variable FIX_APPLIED in Dockerfile or test setup.", "suggested_fix": "Add ENV FIX_APPLIED=true to the Dockerfile or set the variable before running tests.", "file_path": "Dockerfile", "confidence": 0.95}

EXAMPLE 2:
LOGS:
npm ERR! 404 Not Found: package 'typo-package@1.0.0'
ANSWER:
{"root_cause": "Invalid or non-existent npm package name in package.json.", "suggested_fix": "Fix the package name in package.json dependencies.", "file_path": "package.json", "confidence": 0.9}"#;

const DIAGNOSIS_FORMAT: &str = r#"Answer with a single JSON object:
{"root_cause": string, "suggested_fix": string, "file_path": string (relative path of the file to change), "confidence": number between 0.0 and 1.0}"#;

const FIX_FORMAT: &str = r#"Answer with a single JSON object:
{"corrected_code": string (the complete new file content), "explanation": string (brief explanation of the change)}"#;

/// Build the user prompt for a diagnosis call.
#[must_use]
pub fn diagnosis_prompt(request: &DiagnosisRequest) -> String {
    format!(
        "{FEW_SHOT_EXAMPLES}\n\nCONTEXT: {}\n\n\
         Analyze the following CI/CD build logs. Provide root cause, suggested fix, \
         file path, and confidence (0.0-1.0).\n\nLOGS:\n{}\n\n{DIAGNOSIS_FORMAT}",
        request.context, request.logs
    )
}

/// Build the user prompt for a code fix call.
#[must_use]
pub fn fix_prompt(request: &FixRequest) -> String {
    format!(
        "FILENAME: {}\n\nCURRENT CONTENT:\n{}\n\nSUGGESTION:\n{}\n\n{FIX_FORMAT}",
        request.filename, request.file_content, request.suggestion
    )
}
