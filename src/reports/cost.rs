//! Model spend per applied fix.
//!
//! Token records are joined to `fix_applied` audit entries by correlation
//! id; spend on runs that never produced a fix is not attributed.

use std::collections::HashSet;

use serde::Serialize;

use super::tokens::{TokenLedger, TokenUsage};
use crate::error::StorageError;
use crate::storage::{AuditEvent, AuditLog};

/// USD per thousand tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostRates {
    /// Input (prompt) rate.
    pub input_per_1k: f64,
    /// Output (answer) rate.
    pub output_per_1k: f64,
}

impl CostRates {
    #[allow(clippy::cast_precision_loss)]
    fn price(&self, usage: &TokenUsage) -> f64 {
        (usage.input_tokens as f64 / 1000.0).mul_add(
            self.input_per_1k,
            usage.output_tokens as f64 / 1000.0 * self.output_per_1k,
        )
    }
}

/// Spend summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CostReport {
    /// Spend attributed to fixes, rounded to six decimals.
    pub total_cost_usd: f64,
    /// Applied fixes considered.
    pub fixes_count: usize,
    /// `total_cost_usd / fixes_count`, 0 without fixes.
    pub cost_per_fix_usd: f64,
}

fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

/// Compute cost per fix, optionally restricted to `only` correlation ids.
///
/// # Errors
///
/// Returns [`StorageError`] if the audit log or token ledger cannot be read.
pub fn cost_per_fix(
    audit: &AuditLog,
    tokens: &TokenLedger,
    rates: CostRates,
    only: Option<&HashSet<String>>,
) -> Result<CostReport, StorageError> {
    let fixes: HashSet<String> = audit
        .entries()?
        .into_iter()
        .filter(|e| e.event == AuditEvent::FixApplied)
        .filter_map(|e| e.detail_str("correlation_id").map(ToString::to_string))
        .filter(|cid| only.is_none_or(|set| set.contains(cid)))
        .collect();
    if fixes.is_empty() {
        return Ok(CostReport::default());
    }

    let total: f64 = tokens
        .entries()?
        .iter()
        .filter(|u| u.correlation_id.as_ref().is_some_and(|c| fixes.contains(c)))
        .map(|u| rates.price(u))
        .sum();

    #[allow(clippy::cast_precision_loss)]
    let per_fix = total / fixes.len() as f64;
    Ok(CostReport {
        total_cost_usd: round6(total),
        fixes_count: fixes.len(),
        cost_per_fix_usd: round6(per_fix),
    })
}
