//! Retry policy for external LLM calls.
//!
//! Every call site that talks to a model receives a [`RetryPolicy`] instead of
//! hard-coding its own loop. The policy owns the three decisions that matter:
//! how many attempts, how long to wait between them, and which errors are
//! worth retrying at all.
//!
//! ## Backoff schedule
//!
//! The wait before attempt `n` (1-based, `n > 1`) is
//! `initial_delay * 2^(n-2)`, capped at `max_delay`. With the defaults
//! (10 s initial, 60 s cap, 10 attempts) the sequence is
//! 10 s → 20 s → 40 s → 60 s → 60 s …, which rides out Bedrock-style
//! throttling windows without hammering the endpoint.

use crate::error::LlmCallError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Decides whether an error deserves another attempt.
pub type RetryPredicate = fn(&LlmCallError) -> bool;

/// Explicit retry policy passed to each external-call site.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Default: 10.
    pub max_attempts: u32,
    /// Wait before the second attempt. Default: 10 s.
    pub initial_delay: Duration,
    /// Upper bound for any single wait. Default: 60 s.
    pub max_delay: Duration,
    /// Which errors are retried. Default: throttling and timeouts.
    pub retryable: RetryPredicate,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(60),
            retryable: LlmCallError::is_transient,
        }
    }
}

/// The call failed for good.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryFailure {
    /// Attempts actually made.
    pub attempts: u32,
    /// Error from the final attempt.
    pub last_error: LlmCallError,
    /// `true` when the final error was retryable but attempts ran out.
    pub exhausted: bool,
}

impl RetryPolicy {
    /// A policy that retries without waiting. Useful for tests and offline runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Wait applied before `attempt` (1-based). Zero for the first attempt.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exp = (attempt - 2).min(31);
        let factor = 1u32 << exp;
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent.
    ///
    /// When `timeout` is set each attempt is bounded by it; an attempt that
    /// overruns is abandoned and counted as [`LlmCallError::Timeout`].
    pub async fn run<T, F, Fut>(
        &self,
        label: &str,
        timeout: Option<Duration>,
        mut op: F,
    ) -> Result<T, RetryFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, LlmCallError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let wait = self.delay_before(attempt);
            if !wait.is_zero() {
                sleep(wait).await;
            }

            let outcome = match timeout {
                Some(limit) => match tokio::time::timeout(limit, op(attempt)).await {
                    Ok(result) => result,
                    Err(_) => Err(LlmCallError::Timeout(format!(
                        "no response within {}s",
                        limit.as_secs()
                    ))),
                },
                None => op(attempt).await,
            };

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let retryable = (self.retryable)(&err);
            if !retryable || attempt >= max_attempts {
                return Err(RetryFailure {
                    attempts: attempt,
                    last_error: err,
                    exhausted: retryable,
                });
            }

            warn!(
                "{}: attempt {}/{} failed ({}), retrying in {:?}",
                label,
                attempt,
                max_attempts,
                err,
                self.delay_before(attempt + 1)
            );
            attempt += 1;
        }
    }
}
