//! Operational reports over the ledgers and the audit log.
//!
//! - [`TokenLedger`]: approximate token usage per model call, budget alerts
//! - [`SloLedger`]: one record per engine run, success rate and latency
//! - [`cost_per_fix`]: token spend joined to applied fixes
//! - [`categorize`]: error classification for `analysis_failed` entries

mod categories;
mod cost;
mod slo;
mod tokens;

pub use categories::{categorize, ErrorCategory};
pub use cost::{cost_per_fix, CostRates, CostReport};
pub use slo::{SloLedger, SloMetrics, SloRecord};
pub use tokens::{approx_tokens, TokenLedger, TokenUsage};
