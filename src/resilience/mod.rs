//! Call-wrapping primitives for model access.
//!
//! - [`CircuitBreaker`]: process-wide consecutive failure gate
//! - [`with_retry`] / [`RetryPolicy`]: exponential backoff without jitter
//! - [`with_timeout`]: per-call deadline mapped to [`ModelError::Timeout`]
//! - [`ModelRouter`]: model choice by tier and input size
//! - [`run_with_quorum`]: agreement across independent diagnosis runs
//!
//! [`ModelError::Timeout`]: crate::error::ModelError::Timeout

mod circuit_breaker;
mod quorum;
mod retry;
mod router;

pub use circuit_breaker::{BreakerState, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats};
pub use quorum::{run_with_quorum, tally, QuorumKey, QuorumOutcome};
pub use retry::{with_retry, with_timeout, RetryPolicy};
pub use router::{ModelRouter, ModelTier};
