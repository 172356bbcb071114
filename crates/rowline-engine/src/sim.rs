//! Downstream API simulator for local runs
//!
//! Stands in for the real processing API: random latency, injected
//! transient and permanent failures. Tests use scripted fakes instead;
//! this one is for exercising the pipeline from the CLI.

use std::ops::Range;
use std::time::Duration;

use rand::Rng;
use rowline_core::error::ApiError;
use rowline_core::telemetry;

use crate::client::{BATCH_ENDPOINT, ProcessApi};

pub struct SimulatedApi {
    /// Simulated processing latency per call, milliseconds.
    pub latency_ms: Range<u64>,
    /// Probability a call fails.
    pub failure_rate: f64,
    /// Of the failures, share that is permanent (non-retryable, 401);
    /// the rest are transient 500s.
    pub permanent_share: f64,
}

impl Default for SimulatedApi {
    fn default() -> Self {
        Self {
            latency_ms: 5..30,
            failure_rate: 0.05,
            permanent_share: 0.2,
        }
    }
}

impl ProcessApi for SimulatedApi {
    fn call(&self, endpoint: &str, payload: &serde_json::Value) -> Result<serde_json::Value, ApiError> {
        let mut rng = rand::thread_rng();
        let latency = if self.latency_ms.is_empty() {
            self.latency_ms.start
        } else {
            rng.gen_range(self.latency_ms.clone())
        };
        std::thread::sleep(Duration::from_millis(latency));

        if rng.gen_bool(self.failure_rate.clamp(0.0, 1.0)) {
            let permanent = rng.gen_bool(self.permanent_share.clamp(0.0, 1.0));
            telemetry::emit(
                "simulated_api_failure",
                serde_json::json!({ "endpoint": endpoint, "permanent": permanent }),
            );
            return if permanent {
                Err(ApiError::new("simulated auth failure", Some(401), false))
            } else {
                Err(ApiError::new("simulated API timeout", Some(500), true))
            };
        }

        let result_id = || format!("res-{:04}", rng_id());
        let response = match payload.get("items").and_then(|i| i.as_array()) {
            Some(items) if endpoint == BATCH_ENDPOINT => serde_json::json!({
                "status": "success",
                "latency_ms": latency,
                "results": items
                    .iter()
                    .map(|_| serde_json::json!({ "result_id": result_id() }))
                    .collect::<Vec<_>>(),
            }),
            _ => serde_json::json!({
                "status": "success",
                "latency_ms": latency,
                "result_id": result_id(),
            }),
        };
        Ok(response)
    }
}

fn rng_id() -> u32 {
    rand::thread_rng().gen_range(1000..10_000)
}
