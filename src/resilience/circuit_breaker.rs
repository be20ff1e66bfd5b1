//! Circuit breaker around model calls.
//!
//! Opens after `failure_threshold` consecutive failures and stays open for
//! `cooldown`. The first check after the cool-down resets the counter, so the
//! next call is attempted. One instance is shared by every run in a process.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::BreakerConfig;
use crate::error::ModelError;

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls proceed normally.
    Closed,
    /// Calls are rejected without being attempted.
    Open,
    /// Cool-down has elapsed; the next call will be attempted.
    HalfOpen,
}

impl BreakerState {
    /// State name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Configuration for the circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before tripping.
    pub failure_threshold: u32,
    /// Time the breaker stays open after the last failure.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

impl From<&BreakerConfig> for CircuitBreakerConfig {
    fn from(config: &BreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            cooldown: Duration::from_secs(config.cooldown_secs),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    failures: u32,
    last_failure: Option<Instant>,
    total_failures: u64,
    total_successes: u64,
    rejected: u64,
}

/// Circuit breaker statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerStats {
    /// Current state.
    pub state: BreakerState,
    /// Current consecutive failures.
    pub consecutive_failures: u32,
    /// Total failures recorded.
    pub total_failures: u64,
    /// Total successes recorded.
    pub total_successes: u64,
    /// Calls rejected while open.
    pub rejected: u64,
}

/// Consecutive-failure circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    counters: Mutex<Counters>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Create a circuit breaker with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    /// Configured thresholds.
    #[must_use]
    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Returns true if calls are currently rejected.
    ///
    /// Crossing the cool-down resets the failure counter as a side effect.
    pub async fn is_open(&self) -> bool {
        let mut counters = self.counters.lock().await;
        self.check(&mut counters)
    }

    fn check(&self, counters: &mut Counters) -> bool {
        if counters.failures < self.config.failure_threshold {
            return false;
        }
        match counters.last_failure {
            Some(at) if at.elapsed() < self.config.cooldown => true,
            _ => {
                debug!(
                    failures = counters.failures,
                    "Circuit breaker cool-down elapsed, resetting"
                );
                counters.failures = 0;
                false
            }
        }
    }

    /// Run `call` unless the breaker is open.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::CircuitOpen`] without invoking `call` while open,
    /// otherwise whatever `call` returns.
    pub async fn execute<T, F, Fut>(&self, call: F) -> Result<T, ModelError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ModelError>>,
    {
        {
            let mut counters = self.counters.lock().await;
            if self.check(&mut counters) {
                counters.rejected += 1;
                return Err(ModelError::CircuitOpen {
                    failures: counters.failures,
                });
            }
        }

        let result = call().await;

        match &result {
            Ok(_) => self.record_success().await,
            Err(e) => self.record_failure(e).await,
        }
        result
    }

    /// Record a successful call.
    pub async fn record_success(&self) {
        let mut counters = self.counters.lock().await;
        counters.failures = 0;
        counters.total_successes += 1;
    }

    async fn record_failure(&self, error: &ModelError) {
        let mut counters = self.counters.lock().await;
        counters.failures = counters.failures.saturating_add(1);
        counters.total_failures += 1;
        counters.last_failure = Some(Instant::now());
        if counters.failures == self.config.failure_threshold {
            warn!(
                failures = counters.failures,
                cooldown_secs = self.config.cooldown.as_secs(),
                error = %error,
                "Circuit breaker opened"
            );
        }
    }

    /// Current consecutive failure count.
    pub async fn consecutive_failures(&self) -> u32 {
        self.counters.lock().await.failures
    }

    /// Current state without side effects.
    pub async fn state(&self) -> BreakerState {
        let counters = self.counters.lock().await;
        self.state_of(&counters)
    }

    fn state_of(&self, counters: &Counters) -> BreakerState {
        if counters.failures < self.config.failure_threshold {
            return BreakerState::Closed;
        }
        match counters.last_failure {
            Some(at) if at.elapsed() < self.config.cooldown => BreakerState::Open,
            _ => BreakerState::HalfOpen,
        }
    }

    /// Get statistics.
    pub async fn stats(&self) -> CircuitBreakerStats {
        let counters = self.counters.lock().await;
        CircuitBreakerStats {
            state: self.state_of(&counters),
            consecutive_failures: counters.failures,
            total_failures: counters.total_failures,
            total_successes: counters.total_successes,
            rejected: counters.rejected,
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::with_defaults()
    }
}
