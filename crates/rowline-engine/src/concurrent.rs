//! Per-row concurrent processing over a bounded worker pool

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use rowline_core::rows::RowRecord;
use rowline_core::telemetry;

use crate::client::{ROW_ENDPOINT, ResilientApi};
use crate::engine::BatchOutcome;

/// Dispatches each row as an independent unit of work across `workers`
/// threads. A failing row becomes a `success: false` outcome and does not
/// cancel its siblings.
///
/// Outcomes arrive in completion order, not input order — callers needing
/// the original order re-sort by `item_index`.
pub struct ConcurrentRowProcessor {
    api: ResilientApi,
    workers: usize,
}

impl ConcurrentRowProcessor {
    pub fn new(api: ResilientApi, workers: usize) -> Self {
        Self {
            api,
            workers: workers.max(1),
        }
    }

    /// Worker count bounded by the host, matching one worker per core up
    /// to a fixed cap.
    pub fn default_workers() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .min(8)
    }

    pub fn process_rows(&self, rows: Vec<RowRecord>) -> Vec<BatchOutcome> {
        if rows.is_empty() {
            return Vec::new();
        }
        telemetry::emit(
            "process_rows_concurrent",
            serde_json::json!({ "rows": rows.len(), "workers": self.workers }),
        );

        let cursor = AtomicUsize::new(0);
        let outcomes: Mutex<Vec<BatchOutcome>> = Mutex::new(Vec::with_capacity(rows.len()));

        rayon::scope(|s| {
            for _ in 0..self.workers {
                s.spawn(|_| {
                    loop {
                        let i = cursor.fetch_add(1, Ordering::Relaxed);
                        let Some(row) = rows.get(i) else { break };
                        let outcome = self.process_one(row, i);
                        outcomes
                            .lock()
                            .expect("worker thread panicked")
                            .push(outcome);
                    }
                });
            }
        });

        outcomes.into_inner().expect("worker thread panicked")
    }

    fn process_one(&self, row: &RowRecord, item_index: usize) -> BatchOutcome {
        match self.api.call(ROW_ENDPOINT, &row.to_json()) {
            Ok(result) => BatchOutcome {
                item_index,
                original: row.clone(),
                result,
                success: true,
            },
            Err(e) => {
                telemetry::emit(
                    "process_row_error",
                    serde_json::json!({
                        "row_index": item_index,
                        "row_data": telemetry::redact(&row.to_json()),
                        "error": e.to_string(),
                    }),
                );
                BatchOutcome {
                    item_index,
                    original: row.clone(),
                    result: serde_json::json!({ "error": e.to_string() }),
                    success: false,
                }
            }
        }
    }
}
