//! Retry, backoff and degradation around unit calls.
//!
//! [`RetryPolicy::run`] never returns an error: a unit either succeeds or
//! becomes [`Outcome::Degraded`] carrying the last error message.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{Outcome, ReasoningError, UnitError};

/// How a failed attempt should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    RateLimited,
    TransientRetryable,
    FatalNonRetryable,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureClass::RateLimited => "rate_limited",
            FailureClass::TransientRetryable => "transient_retryable",
            FailureClass::FatalNonRetryable => "fatal_non_retryable",
        };
        f.write_str(s)
    }
}

/// Classify an error message by the phrases providers use.
///
/// Returns `None` when the message says nothing specific.
pub fn classify_message(message: &str) -> Option<FailureClass> {
    let lower = message.to_lowercase();

    if (lower.contains("context") && lower.contains("window")) || lower.contains("exceeds the maximum")
    {
        return Some(FailureClass::FatalNonRetryable);
    }

    if lower.contains("rate limit")
        || lower.contains("quota")
        || lower.contains("429")
        || lower.contains("resource_exhausted")
    {
        return Some(FailureClass::RateLimited);
    }

    None
}

impl UnitError {
    pub fn class(&self) -> FailureClass {
        match self {
            UnitError::Reasoning(ReasoningError::RateLimited(_)) => FailureClass::RateLimited,
            UnitError::Reasoning(ReasoningError::ContextWindowExceeded(_)) => {
                FailureClass::FatalNonRetryable
            }
            UnitError::Reasoning(ReasoningError::Http { status: 429, .. }) => {
                FailureClass::RateLimited
            }
            // Payload too large: the same request can never fit.
            UnitError::Reasoning(ReasoningError::Rejected { status: 413, .. }) => {
                FailureClass::FatalNonRetryable
            }
            UnitError::Reasoning(err) => {
                classify_message(&err.to_string()).unwrap_or(FailureClass::TransientRetryable)
            }
            // A fresh call may well produce well-formed output.
            UnitError::Parse(_) => FailureClass::TransientRetryable,
            UnitError::DeadlineExceeded(_) => FailureClass::TransientRetryable,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per unit, first call included.
    pub max_attempts: u32,
    /// Backoff base for transient failures (milliseconds).
    pub base_delay_ms: u64,
    /// Backoff base for rate-limited failures (milliseconds).
    pub rate_limit_base_delay_ms: u64,
    /// Deadline for one reasoning call (milliseconds).
    pub call_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2_000,
            rate_limit_base_delay_ms: 6_000,
            call_timeout_ms: 300_000,
        }
    }
}

/// Source of backoff sleeps.
#[async_trait]
pub trait Sleeper: Send + Sync + fmt::Debug {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Delay after the `attempt`-th failure (1-based).
    pub fn delay_for(&self, class: FailureClass, attempt: u32) -> Duration {
        let base = match class {
            FailureClass::RateLimited => self.config.rate_limit_base_delay_ms,
            _ => self.config.base_delay_ms,
        };
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(base.saturating_mul(factor))
    }

    /// Run `attempt` until it succeeds, fails fatally, or attempts run out.
    ///
    /// `attempt` receives the 1-based attempt number. Each call is bounded by
    /// the configured call deadline; expiry counts as a transient failure.
    pub async fn run<T, F, Fut>(&self, unit: &str, mut attempt: F) -> Outcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, UnitError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let deadline = Duration::from_millis(self.config.call_timeout_ms);
        let mut last_error = String::new();

        for n in 1..=max_attempts {
            let error = match tokio::time::timeout(deadline, attempt(n)).await {
                Ok(Ok(value)) => {
                    if n > 1 {
                        info!(unit = %unit, attempt = n, "unit succeeded after retry");
                    } else {
                        debug!(unit = %unit, "unit succeeded");
                    }
                    return Outcome::Success(value);
                }
                Ok(Err(err)) => err,
                Err(_elapsed) => UnitError::DeadlineExceeded(deadline),
            };

            let class = error.class();
            last_error = error.to_string();

            if class == FailureClass::FatalNonRetryable {
                warn!(unit = %unit, attempt = n, error = %last_error, "non-retryable failure, degrading unit");
                return Outcome::degraded(last_error);
            }

            if n == max_attempts {
                break;
            }

            let delay = self.delay_for(class, n);
            warn!(
                unit = %unit,
                attempt = n,
                class = %class,
                delay_ms = delay.as_millis() as u64,
                error = %last_error,
                "attempt failed, backing off"
            );
            self.sleeper.sleep(delay).await;
        }

        warn!(unit = %unit, attempts = max_attempts, error = %last_error, "retries exhausted, degrading unit");
        Outcome::degraded(last_error)
    }
}
