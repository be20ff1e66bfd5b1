//! Report rendering for `ci-healer report`.

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use super::{App, ReportKind};
use crate::error::{AppError, StorageError};
use crate::reports::{categorize, cost_per_fix, CostRates, TokenLedger};
use crate::storage::{AuditEvent, AuditLog};

/// Token usage totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TokenSummary {
    /// Ledger entries.
    pub calls: usize,
    /// Sum of input tokens.
    pub input_tokens: u64,
    /// Sum of output tokens.
    pub output_tokens: u64,
    /// Sum of both.
    pub total_tokens: u64,
    /// Total tokens per model.
    pub by_model: BTreeMap<String, u64>,
}

/// Summarize the token ledger.
///
/// # Errors
///
/// Returns [`StorageError`] if the ledger cannot be read.
pub fn token_summary(ledger: &TokenLedger) -> Result<TokenSummary, StorageError> {
    let mut summary = TokenSummary::default();
    for usage in ledger.entries()? {
        summary.calls += 1;
        summary.input_tokens += usage.input_tokens;
        summary.output_tokens += usage.output_tokens;
        summary.total_tokens += usage.total;
        *summary.by_model.entry(usage.model).or_default() += usage.total;
    }
    Ok(summary)
}

/// Count `analysis_failed` entries by category.
///
/// Entries written without a category are categorized from their error text.
///
/// # Errors
///
/// Returns [`StorageError`] if the audit log cannot be read.
pub fn category_counts(audit: &AuditLog) -> Result<BTreeMap<String, usize>, StorageError> {
    let mut counts = BTreeMap::new();
    for entry in audit
        .entries()?
        .into_iter()
        .filter(|e| e.event == AuditEvent::AnalysisFailed)
    {
        let category = entry.detail_str("category").map_or_else(
            || categorize(entry.detail_str("error").unwrap_or_default()).to_string(),
            str::to_string,
        );
        *counts.entry(category).or_insert(0) += 1;
    }
    Ok(counts)
}

pub(super) fn render(kind: ReportKind, hours: i64, app: &App) -> Result<Value, AppError> {
    let state = &app.config.state;
    let value = match kind {
        ReportKind::Tokens => json!(token_summary(&app.token_ledger())?),
        ReportKind::Cost => {
            let rates = CostRates {
                input_per_1k: state.cost_input_per_1k,
                output_per_1k: state.cost_output_per_1k,
            };
            json!(cost_per_fix(&app.stores.audit, &app.token_ledger(), rates, None)?)
        }
        ReportKind::Slo => {
            let metrics = app.slo_ledger().metrics(Duration::hours(hours), Utc::now())?;
            json!({ "window_hours": hours, "metrics": metrics })
        }
        ReportKind::Categories => json!(category_counts(&app.stores.audit)?),
    };
    Ok(value)
}
