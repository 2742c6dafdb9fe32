//! Ordered fallback chains.
//!
//! A chain tries named strategies in a fixed order and stops at the first
//! success. Failures are collected per attempt and only surfaced as a whole
//! when every strategy has failed. No attempt is ever repeated.
//!
//! Used for token acquisition, connection-profile probing and the schema
//! column-query variants.

use crate::error::ServerError;
use std::fmt;
use std::future::Future;
use tracing::debug;

/// A named step in a fallback chain.
pub trait Strategy {
    /// Human-readable name used in diagnostics.
    fn name(&self) -> &str;
}

/// One failed attempt.
#[derive(Debug)]
pub struct AttemptFailure {
    /// Strategy name.
    pub strategy: String,
    /// Why it failed.
    pub error: ServerError,
}

/// Successful outcome of a chain.
#[derive(Debug)]
pub struct Success<T> {
    /// The produced value.
    pub value: T,
    /// Name of the strategy that produced it.
    pub strategy: String,
    /// Attempts that failed before the successful one.
    pub failures: Vec<AttemptFailure>,
}

/// Every strategy failed.
#[derive(Debug)]
pub struct Exhausted {
    /// Failures in the order they were attempted.
    pub attempts: Vec<AttemptFailure>,
}

impl Exhausted {
    /// One line per attempt: `- name: error`.
    pub fn diagnostics(&self) -> String {
        if self.attempts.is_empty() {
            return "- no strategies were configured".to_string();
        }

        self.attempts
            .iter()
            .map(|a| format!("- {}: {}", a.strategy, a.error))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for Exhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "all {} strategies failed:\n{}",
            self.attempts.len(),
            self.diagnostics()
        )
    }
}

/// Try each strategy in order; first success wins.
pub async fn first_success<S, T, F, Fut>(
    strategies: impl IntoIterator<Item = S>,
    mut attempt: F,
) -> Result<Success<T>, Exhausted>
where
    S: Strategy,
    F: FnMut(S) -> Fut,
    Fut: Future<Output = Result<T, ServerError>>,
{
    let mut failures = Vec::new();

    for strategy in strategies {
        let name = strategy.name().to_string();
        debug!("Trying strategy: {}", name);

        match attempt(strategy).await {
            Ok(value) => {
                debug!("Strategy succeeded: {}", name);
                return Ok(Success {
                    value,
                    strategy: name,
                    failures,
                });
            }
            Err(error) => {
                debug!("Strategy failed: {} - {}", name, error);
                failures.push(AttemptFailure {
                    strategy: name,
                    error,
                });
            }
        }
    }

    Err(Exhausted { attempts: failures })
}
