//! Reusable retry policy shared by every fetch adapter.
//!
//! A policy is: a fixed attempt limit, a backoff schedule, and a predicate
//! deciding which errors are worth another attempt. Non-retryable errors
//! are returned immediately; an exhausted limit is reported as
//! `FetchError::RetriesExhausted` wrapping the last failure.
//!
//! After a 429 the next attempt waits at least the server's `Retry-After`,
//! capped by `retry_after_cap`.

use super::provider::FetchError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    Fixed { delay_ms: u64 },
    Exponential { base_ms: u64, factor: f64, max_ms: u64 },
}

impl Backoff {
    /// Delay before retry number `retry` (1 = the second attempt).
    pub fn delay(&self, retry: u32) -> Duration {
        match *self {
            Backoff::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            Backoff::Exponential {
                base_ms,
                factor,
                max_ms,
            } => {
                let exp = retry.saturating_sub(1) as i32;
                let ms = (base_ms as f64 * factor.max(1.0).powi(exp)).min(max_ms as f64);
                Duration::from_millis(ms as u64)
            }
        }
    }
}

type RetryPredicate = Arc<dyn Fn(&FetchError) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
    jitter: bool,
    retry_after_cap: Duration,
    retryable: RetryPredicate,
}

const DEFAULT_RETRY_AFTER_CAP: Duration = Duration::from_secs(60);

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            jitter: false,
            retry_after_cap: DEFAULT_RETRY_AFTER_CAP,
            retryable: Arc::new(FetchError::is_retryable),
        }
    }

    /// Three attempts, two seconds apart.
    pub fn default_provider() -> Self {
        Self::new(3, Backoff::Fixed { delay_ms: 2_000 })
    }

    /// No delay between attempts. For tests and local fixtures.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Backoff::Fixed { delay_ms: 0 }).with_retry_after_cap(Duration::ZERO)
    }

    /// Longest `Retry-After` wait honored between attempts.
    pub fn with_retry_after_cap(mut self, cap: Duration) -> Self {
        self.retry_after_cap = cap;
        self
    }

    /// Randomize each delay within `[delay / 2, delay]`.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_retryable<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&FetchError) -> bool + Send + Sync + 'static,
    {
        self.retryable = Arc::new(predicate);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn delay(&self, retry: u32) -> Duration {
        let delay = self.backoff.delay(retry);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let ms = delay.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(ms / 2..=ms))
    }

    /// Wait before retry number `retry` following `error`.
    fn delay_after(&self, retry: u32, error: &FetchError) -> Duration {
        let backoff = self.delay(retry);
        match error {
            FetchError::RateLimited { retry_after_secs } => {
                backoff.max(Duration::from_secs(*retry_after_secs).min(self.retry_after_cap))
            }
            _ => backoff,
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt limit is reached. `op` receives the 1-based attempt number.
    pub fn run<T, F>(&self, label: &str, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut(u32) -> Result<T, FetchError>,
    {
        let mut last_error: Option<FetchError> = None;

        for attempt in 1..=self.max_attempts {
            if let Some(previous) = &last_error {
                let delay = self.delay_after(attempt - 1, previous);
                if !delay.is_zero() {
                    tracing::debug!(%label, attempt, delay_ms = delay.as_millis() as u64, "waiting before retry");
                    std::thread::sleep(delay);
                }
            }

            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if !(self.retryable)(&e) => {
                    tracing::warn!(%label, attempt, error = %e, "non-retryable fetch failure");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(
                        %label,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "fetch attempt failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        let last = last_error
            .unwrap_or_else(|| FetchError::NetworkUnreachable("no attempt was made".into()));
        Err(FetchError::RetriesExhausted {
            attempts: self.max_attempts,
            last: Box::new(last),
        })
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("jitter", &self.jitter)
            .field("retry_after_cap", &self.retry_after_cap)
            .finish_non_exhaustive()
    }
}
