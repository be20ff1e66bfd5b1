//! Quorum over independent diagnosis runs.
//!
//! The runs are fanned out concurrently and their successes tallied by an
//! agreement key. A key wins only if it appears at least twice and no other
//! key appears as often.

use std::fmt::Display;
use std::future::Future;

use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::traits::Diagnosis;

/// The value results must agree on.
pub trait QuorumKey {
    /// Agreement key.
    fn quorum_key(&self) -> &str;
}

impl QuorumKey for Diagnosis {
    fn quorum_key(&self) -> &str {
        &self.file_path
    }
}

/// Result of a quorum round.
#[derive(Debug, Clone, PartialEq)]
pub enum QuorumOutcome<T> {
    /// A key reached a strict majority of at least two votes.
    Agreed {
        /// First result in invocation order carrying the winning key.
        value: T,
        /// Votes for the winning key.
        votes: usize,
    },
    /// Only one run succeeded.
    Sole(T),
    /// No key won.
    NoQuorum {
        /// Number of successful runs.
        successes: usize,
    },
}

impl<T> QuorumOutcome<T> {
    /// The accepted value, if any.
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Agreed { value, .. } | Self::Sole(value) => Some(value),
            Self::NoQuorum { .. } => None,
        }
    }
}

/// Tally successful results, kept in invocation order.
#[must_use]
pub fn tally<T: QuorumKey>(results: Vec<T>) -> QuorumOutcome<T> {
    let successes = results.len();
    if successes < 2 {
        return results
            .into_iter()
            .next()
            .map_or(QuorumOutcome::NoQuorum { successes }, QuorumOutcome::Sole);
    }

    // (key, votes, index of first occurrence)
    let mut counts: Vec<(&str, usize, usize)> = Vec::new();
    for (idx, result) in results.iter().enumerate() {
        let key = result.quorum_key();
        match counts.iter_mut().find(|(k, _, _)| *k == key) {
            Some(entry) => entry.1 += 1,
            None => counts.push((key, 1, idx)),
        }
    }

    let top = counts.iter().map(|(_, n, _)| *n).max().unwrap_or(0);
    let leaders: Vec<usize> = counts
        .iter()
        .filter(|(_, n, _)| *n == top)
        .map(|(_, _, first)| *first)
        .collect();

    match leaders.as_slice() {
        [first] if top >= 2 => {
            let first = *first;
            results
                .into_iter()
                .nth(first)
                .map_or(QuorumOutcome::NoQuorum { successes }, |value| {
                    QuorumOutcome::Agreed { value, votes: top }
                })
        }
        _ => QuorumOutcome::NoQuorum { successes },
    }
}

/// Invoke `call` `n` times concurrently and tally the successes.
///
/// With `n < 2` the call runs once and its success is returned as
/// [`QuorumOutcome::Sole`]. Failed runs are logged and dropped.
pub async fn run_with_quorum<T, E, F, Fut>(n: usize, call: F) -> QuorumOutcome<T>
where
    T: QuorumKey,
    E: Display,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let runs = n.max(1);
    let results = join_all((0..runs).map(|_| call())).await;

    let mut successes = Vec::with_capacity(runs);
    for (idx, result) in results.into_iter().enumerate() {
        match result {
            Ok(value) => successes.push(value),
            Err(e) => warn!(run = idx, error = %e, "Quorum run failed"),
        }
    }

    let outcome = tally(successes);
    match &outcome {
        QuorumOutcome::Agreed { votes, .. } => debug!(runs, votes, "Quorum reached"),
        QuorumOutcome::Sole(_) => debug!(runs, "Single successful run"),
        QuorumOutcome::NoQuorum { successes } => warn!(runs, successes, "No quorum"),
    }
    outcome
}
