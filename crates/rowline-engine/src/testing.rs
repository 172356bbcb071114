//! Scripted fakes shared by the unit tests

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rowline_core::error::ApiError;
use rowline_core::{CircuitBreaker, RetryPolicy};

use crate::client::{BATCH_ENDPOINT, ProcessApi, ResilientApi};

/// Deterministic downstream API: counts calls, records batch sizes, and
/// fails on scripted call numbers (1-based).
pub struct ScriptedApi {
    calls: AtomicUsize,
    batch_sizes: Mutex<Vec<usize>>,
    fail_on: Mutex<Vec<(usize, ApiError)>>,
}

impl ScriptedApi {
    pub fn always_ok() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            batch_sizes: Mutex::new(Vec::new()),
            fail_on: Mutex::new(Vec::new()),
        })
    }

    /// Fail the `n`th call (1-based) with `err`; all other calls succeed.
    pub fn fail_on_call(n: usize, err: ApiError) -> Arc<Self> {
        let api = Self::always_ok();
        api.fail_on.lock().unwrap().push((n, err));
        api
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Item counts of each batch-endpoint call, in call order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }
}

impl ProcessApi for ScriptedApi {
    fn call(&self, endpoint: &str, payload: &serde_json::Value) -> Result<serde_json::Value, ApiError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        let items = (endpoint == BATCH_ENDPOINT)
            .then(|| payload.get("items").and_then(|i| i.as_array()).cloned())
            .flatten();
        if let Some(items) = &items {
            self.batch_sizes.lock().unwrap().push(items.len());
        }

        // One lock for lookup and removal; re-locking in the same
        // expression would deadlock on std's non-reentrant Mutex
        let scripted = {
            let mut fail_on = self.fail_on.lock().unwrap();
            fail_on
                .iter()
                .position(|(call, _)| *call == n)
                .map(|pos| fail_on.remove(pos))
        };
        if let Some((_, err)) = scripted {
            return Err(err);
        }

        match items {
            Some(items) => Ok(serde_json::json!({
                "status": "success",
                "results": items
                    .iter()
                    .enumerate()
                    .map(|(i, _)| serde_json::json!({ "result_id": format!("res-{n}-{i}") }))
                    .collect::<Vec<_>>(),
            })),
            None => Ok(serde_json::json!({
                "status": "success",
                "result_id": format!("res-{n}"),
            })),
        }
    }
}

/// Scripted API wrapped in a permissive breaker and no-retry policy, so
/// tests observe exactly one attempt per scripted call.
pub fn resilient(api: Arc<ScriptedApi>) -> ResilientApi {
    ResilientApi::new(
        api,
        Arc::new(CircuitBreaker::new("test-api", 1000, Duration::from_secs(60))),
        RetryPolicy::new(1, 1.5),
    )
}

mod tests {
    use super::*;

    #[test]
    fn scripted_failure_fires_once_and_returns() {
        let api = ScriptedApi::fail_on_call(2, ApiError::new("boom", Some(500), true));
        assert!(api.call("process-row", &serde_json::json!({})).is_ok());
        let err = api.call("process-row", &serde_json::json!({})).unwrap_err();
        assert_eq!(err.status, Some(500));
        // The script is consumed; the same call number does not fail again
        assert!(api.call("process-row", &serde_json::json!({})).is_ok());
        assert_eq!(api.calls(), 3);
    }

    #[test]
    fn multiple_scripted_failures_coexist() {
        let api = ScriptedApi::fail_on_call(1, ApiError::new("first", Some(500), true));
        api.fail_on
            .lock()
            .unwrap()
            .push((3, ApiError::new("third", Some(503), true)));
        assert!(api.call("process-row", &serde_json::json!({})).is_err());
        assert!(api.call("process-row", &serde_json::json!({})).is_ok());
        assert!(api.call("process-row", &serde_json::json!({})).is_err());
    }
}
