//! Circuit breaker for failing downstream services
//!
//! Closed → Open after `failure_threshold` failures; Open → HalfOpen once
//! `reset_timeout` elapses; HalfOpen → Closed on the first success, back to
//! Open on failure. Shared across workers behind a `Mutex` — transitions are
//! atomic sections, the protected call itself runs outside the lock.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failures: u32,
    last_failure: Option<Instant>,
}

/// Per-downstream-target failure tracker.
///
/// Only [`execute`](CircuitBreaker::execute) mutates the state; the counter
/// is reset solely by a success while half-open, never by time alone.
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold,
            reset_timeout,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failures: 0,
                last_failure: None,
            }),
        }
    }

    /// Breaker for a downstream API target with the stock 5-failure / 60s
    /// settings.
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, 5, Duration::from_secs(60))
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("breaker lock poisoned").state
    }

    /// Run `call` under breaker protection.
    ///
    /// While open and within the reset timeout the call is rejected with
    /// [`PipelineError::CircuitOpen`] without being invoked.
    pub fn execute<T>(
        &self,
        call: impl FnOnce() -> Result<T, PipelineError>,
    ) -> Result<T, PipelineError> {
        {
            let mut inner = self.inner.lock().expect("breaker lock poisoned");
            if inner.state == CircuitState::Open {
                let elapsed = inner
                    .last_failure
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed > self.reset_timeout {
                    log::info!("circuit {} entering half-open state", self.name);
                    inner.state = CircuitState::HalfOpen;
                } else {
                    log::warn!("circuit {} is open, request rejected", self.name);
                    return Err(PipelineError::CircuitOpen {
                        service: self.name.clone(),
                        resets_in: self.reset_timeout - elapsed,
                    });
                }
            }
        }

        let result = call();

        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match &result {
            Ok(_) => {
                if inner.state == CircuitState::HalfOpen {
                    log::info!("circuit {} closing after successful request", self.name);
                    inner.state = CircuitState::Closed;
                    inner.failures = 0;
                }
            }
            Err(_) => {
                inner.failures += 1;
                inner.last_failure = Some(Instant::now());
                if inner.state != CircuitState::Open && inner.failures >= self.failure_threshold {
                    log::warn!(
                        "circuit {} opening after {} failures",
                        self.name,
                        inner.failures
                    );
                    inner.state = CircuitState::Open;
                }
                // A half-open probe failure re-opens via the branch above:
                // the counter is never reset on the way into half-open, so
                // it is still at or past the threshold.
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use std::sync::Arc;

    fn fail() -> Result<(), PipelineError> {
        Err(ApiError::new("timeout", Some(500), true).into())
    }

    fn breaker(threshold: u32, timeout_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new("api-service", threshold, Duration::from_millis(timeout_ms))
    }

    #[test]
    fn stays_closed_on_success() {
        let cb = breaker(3, 1000);
        for _ in 0..10 {
            assert!(cb.execute(|| Ok::<_, PipelineError>(1)).is_ok());
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn opens_after_threshold_failures() {
        let cb = breaker(3, 60_000);
        for _ in 0..3 {
            assert!(cb.execute(fail).is_err());
        }
        assert_eq!(cb.state(), CircuitState::Open);

        // Next call fails fast without invoking the protected fn
        let mut invoked = false;
        let result = cb.execute(|| {
            invoked = true;
            Ok::<_, PipelineError>(())
        });
        assert!(!invoked);
        match result.unwrap_err() {
            PipelineError::CircuitOpen { service, resets_in } => {
                assert_eq!(service, "api-service");
                assert!(resets_in <= Duration::from_secs(60));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn half_open_success_closes_and_resets() {
        let cb = breaker(2, 20);
        cb.execute(fail).ok();
        cb.execute(fail).ok();
        assert_eq!(cb.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(40));
        assert!(cb.execute(|| Ok::<_, PipelineError>(())).is_ok());
        assert_eq!(cb.state(), CircuitState::Closed);

        // Counter was reset: one more failure does not re-open
        cb.execute(fail).ok();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let cb = breaker(2, 20);
        cb.execute(fail).ok();
        cb.execute(fail).ok();
        std::thread::sleep(Duration::from_millis(40));
        assert!(cb.execute(fail).is_err());
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn failure_count_survives_closed_successes() {
        // Time alone never resets the counter; neither do closed-state successes
        let cb = breaker(3, 60_000);
        cb.execute(fail).ok();
        cb.execute(fail).ok();
        assert!(cb.execute(|| Ok::<_, PipelineError>(())).is_ok());
        cb.execute(fail).ok();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn shared_across_threads() {
        let cb = Arc::new(breaker(4, 60_000));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let cb = cb.clone();
            handles.push(std::thread::spawn(move || {
                cb.execute(fail).ok();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
