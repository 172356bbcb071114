//! Retry with exponential backoff for downstream calls

use std::time::Duration;

use crate::error::PipelineError;
use crate::telemetry;

/// Bounded retry with exponential backoff.
///
/// The wait before retry `i` (0-based) is `backoff_factor^i` seconds,
/// matching the downstream API's tolerance for hammering: 1s, 1.5s, 2.25s
/// at the default factor.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_factor: 1.5,
        }
    }
}

/// Backoff before the retry following failed attempt `attempt` (0-based).
pub fn backoff_duration(factor: f64, attempt: u32) -> Duration {
    Duration::from_secs_f64(factor.powi(attempt as i32))
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            backoff_factor,
        }
    }

    /// Run `attempt_fn` up to `max_attempts` times.
    ///
    /// A non-retryable error surfaces immediately; on exhaustion the last
    /// error surfaces unchanged so callers can still branch on its kind.
    /// Sleeps between attempts hold no locks — a shared circuit breaker
    /// inside `attempt_fn` is only locked while it executes.
    pub fn execute<T>(
        &self,
        label: &str,
        mut attempt_fn: impl FnMut() -> Result<T, PipelineError>,
    ) -> Result<T, PipelineError> {
        let mut attempt = 0u32;
        loop {
            match attempt_fn() {
                Ok(v) => return Ok(v),
                Err(e) if !e.is_retryable() => {
                    log::warn!("{label}: retry not allowed for error: {e}, giving up");
                    return Err(e);
                }
                Err(e) if attempt + 1 < self.max_attempts => {
                    let wait = backoff_duration(self.backoff_factor, attempt);
                    attempt += 1;
                    telemetry::emit(
                        "retry_attempt",
                        serde_json::json!({
                            "label": label,
                            "reason": e.to_string(),
                            "attempt": attempt,
                            "max_attempts": self.max_attempts,
                            "wait_seconds": wait.as_secs_f64(),
                        }),
                    );
                    std::thread::sleep(wait);
                }
                Err(e) => {
                    log::error!("{label}: failed after {} attempts: {e}", self.max_attempts);
                    return Err(e);
                }
            }
        }
    }
}
