//! Extraction of structured answers from model text.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ModelError;
use crate::traits::{CodeFix, Diagnosis};

#[derive(Debug, Deserialize)]
struct RawDiagnosis {
    root_cause: String,
    suggested_fix: String,
    file_path: String,
    #[serde(alias = "confidence_score")]
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct RawCodeFix {
    #[serde(alias = "corrected_content")]
    corrected_code: String,
    #[serde(default)]
    explanation: String,
}

/// Extract a JSON value from text, handling code fences and surrounding prose.
#[must_use]
pub fn extract_json(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }

    if let Some(start) = text.find("```") {
        let body = &text[start + 3..];
        // skip a language tag such as ```json
        let body = body.find('\n').map_or(body, |n| &body[n + 1..]);
        if let Some(end) = body.find("```") {
            if let Ok(value) = serde_json::from_str(body[..end].trim()) {
                return Some(value);
            }
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

fn parse_as<T: DeserializeOwned>(text: &str, what: &str) -> Result<T, ModelError> {
    let value = extract_json(text).ok_or_else(|| ModelError::ParseFailed {
        message: format!("no JSON object found in {what} response"),
    })?;
    serde_json::from_value(value).map_err(|e| ModelError::ParseFailed {
        message: format!("invalid {what}: {e}"),
    })
}

/// Parse a diagnosis answer.
///
/// # Errors
///
/// Returns [`ModelError::ParseFailed`] if no JSON is found, fields are
/// missing, the file path is blank or confidence is outside `[0, 1]`.
pub fn parse_diagnosis(text: &str) -> Result<Diagnosis, ModelError> {
    let raw: RawDiagnosis = parse_as(text, "diagnosis")?;
    if !(0.0..=1.0).contains(&raw.confidence) {
        return Err(ModelError::ParseFailed {
            message: format!("confidence {} outside [0, 1]", raw.confidence),
        });
    }
    let file_path = raw.file_path.trim();
    if file_path.is_empty() {
        return Err(ModelError::ParseFailed {
            message: "diagnosis has an empty file_path".into(),
        });
    }
    Ok(Diagnosis::new(
        raw.root_cause,
        raw.suggested_fix,
        file_path,
        raw.confidence,
    ))
}

/// Parse a code fix answer.
///
/// # Errors
///
/// Returns [`ModelError::ParseFailed`] if no JSON is found or the content is missing.
pub fn parse_code_fix(text: &str) -> Result<CodeFix, ModelError> {
    let raw: RawCodeFix = parse_as(text, "code fix")?;
    Ok(CodeFix::new(raw.corrected_code, raw.explanation))
}
