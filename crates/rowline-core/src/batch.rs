//! Batch size selection: static heuristic plus per-run adaptive tuning

use std::time::Duration;

use crate::telemetry;

/// Processing priority for an object, from the invocation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    High,
    #[default]
    Standard,
    Low,
}

impl Priority {
    /// Parse the request's priority string; unknown values fall back to
    /// standard rather than failing the invocation.
    pub fn parse(s: &str) -> Self {
        match s {
            "high" => Self::High,
            "low" => Self::Low,
            _ => Self::Standard,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Standard => "standard",
            Self::Low => "low",
        }
    }

    /// High priority starts with smaller batches for a faster first result;
    /// low priority favors throughput with larger ones.
    fn base_batch_size(self) -> usize {
        match self {
            Self::High => 25,
            Self::Standard => 50,
            Self::Low => 100,
        }
    }
}

pub const MIN_BATCH_SIZE: usize = 10;
pub const MAX_BATCH_SIZE: usize = 500;

/// A batch slower than this shrinks the next one.
const SLOW_BATCH: Duration = Duration::from_secs(10);
/// A batch faster than this grows the next one.
const FAST_BATCH: Duration = Duration::from_secs(1);

/// Rows per batch from content size, file-type hint, and priority.
///
/// Always within `[MIN_BATCH_SIZE, MAX_BATCH_SIZE]`.
pub fn optimal_batch_size(content_size: usize, key: &str, priority: Priority) -> usize {
    let base = priority.base_batch_size() as f64;

    // Row-oriented CSV processes efficiently; structured formats less so
    let file_type_factor = if key.ends_with(".csv") {
        1.5
    } else if key.ends_with(".json") || key.ends_with(".xml") {
        0.8
    } else {
        1.0
    };

    let size_factor = if content_size > 100 * 1024 * 1024 {
        2.0
    } else if content_size > 10 * 1024 * 1024 {
        1.5
    } else if content_size < 1024 * 1024 {
        0.5
    } else {
        1.0
    };

    let size = (base * file_type_factor * size_factor) as usize;
    let size = size.clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE);

    telemetry::emit(
        "calculate_batch_size",
        serde_json::json!({
            "content_size_bytes": content_size,
            "file_type": key.rsplit('.').next().filter(|_| key.contains('.')).unwrap_or("unknown"),
            "priority": priority.as_str(),
            "optimal_batch_size": size,
        }),
    );

    size
}

/// Adaptive batch size controller for one processing run.
///
/// A local hill-climb on observed batch latency, not a global optimum:
/// slow batches shrink the next one, fast batches grow it, within the
/// same `[10, 500]` bounds. Discarded at end of run.
#[derive(Debug)]
pub struct BatchTuner {
    current: usize,
}

impl BatchTuner {
    /// An explicit request-supplied size is honored as-is, even below the
    /// adaptive floor; only the adjustments are bounded.
    pub fn new(initial: usize) -> Self {
        Self { current: initial }
    }

    /// Size to use for the next batch.
    pub fn current(&self) -> usize {
        self.current
    }

    /// Feed one completed batch's wall-clock duration into the controller.
    pub fn observe(&mut self, duration: Duration) {
        if duration > SLOW_BATCH && self.current > 20 {
            let new = ((self.current as f64 * 0.8) as usize).max(MIN_BATCH_SIZE);
            telemetry::emit(
                "batch_size_adjustment",
                serde_json::json!({
                    "reason": "slow_processing",
                    "old_batch_size": self.current,
                    "new_batch_size": new,
                }),
            );
            self.current = new;
        } else if duration < FAST_BATCH && self.current < MAX_BATCH_SIZE {
            let new = ((self.current as f64 * 1.2) as usize).min(MAX_BATCH_SIZE);
            telemetry::emit(
                "batch_size_adjustment",
                serde_json::json!({
                    "reason": "fast_processing",
                    "old_batch_size": self.current,
                    "new_batch_size": new,
                }),
            );
            self.current = new;
        }
    }
}
