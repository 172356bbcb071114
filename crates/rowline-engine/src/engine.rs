//! Batch-driven row processing against the downstream API

use std::time::Instant;

use rowline_core::batch::{BatchTuner, optimal_batch_size};
use rowline_core::error::PipelineError;
use rowline_core::rows::{RowRecord, parse_header, parse_row, parse_rows};
use rowline_core::{Priority, telemetry};

use crate::client::{BATCH_ENDPOINT, ROW_ENDPOINT, ResilientApi};

/// Result of processing one row through the downstream API.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// Index of the row in the source object's data-row order.
    pub item_index: usize,
    pub original: RowRecord,
    /// Opaque downstream payload (error detail when `success` is false).
    pub result: serde_json::Value,
    pub success: bool,
}

impl BatchOutcome {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "itemIndex": self.item_index,
            "originalData": self.original.to_json(),
            "result": self.result,
            "success": self.success,
        })
    }
}

/// Drives row batches through the downstream batch endpoint with adaptive
/// sizing, wrapped in the retry + circuit-breaker stack.
pub struct RowBatchEngine {
    api: ResilientApi,
}

impl RowBatchEngine {
    pub fn new(api: ResilientApi) -> Self {
        Self { api }
    }

    /// Process a full text object: header + rows, batched in order.
    ///
    /// `batch_size` of `None` selects adaptive sizing from the content
    /// size, the key's extension, and the priority. An unrecovered batch
    /// failure aborts the run — no partial results.
    pub fn process_content(
        &self,
        content: &str,
        batch_size: Option<usize>,
        priority: Priority,
        bucket: &str,
        key: &str,
    ) -> Result<Vec<BatchOutcome>, PipelineError> {
        let content_size = content.len();
        let initial = batch_size
            .map(|b| b.max(1))
            .unwrap_or_else(|| optimal_batch_size(content_size, key, priority));
        telemetry::emit(
            "process_content",
            serde_json::json!({
                "bucket": bucket,
                "key": key,
                "content_size_bytes": content_size,
                "batch_size": initial,
                "priority": priority.as_str(),
            }),
        );

        let (_, rows) = parse_rows(content)?;
        let mut run = BatchRun::new(self, initial);
        run.push(rows)?;
        run.finish()
    }

    /// Process streamed text segments as one logical object.
    ///
    /// The header is parsed once from the first segment and carried across
    /// the rest, as is the adaptive tuner state, so the total matches a
    /// single full read of the same object. Rows left over from one
    /// segment (fewer than a batch) are carried into the next.
    pub fn process_segments(
        &self,
        segments: impl Iterator<Item = Result<String, PipelineError>>,
        batch_size: Option<usize>,
        priority: Priority,
        content_length: u64,
        bucket: &str,
        key: &str,
    ) -> Result<Vec<BatchOutcome>, PipelineError> {
        let initial = batch_size
            .map(|b| b.max(1))
            .unwrap_or_else(|| optimal_batch_size(content_length as usize, key, priority));
        telemetry::emit(
            "process_segments",
            serde_json::json!({
                "bucket": bucket,
                "key": key,
                "content_length": content_length,
                "batch_size": initial,
                "priority": priority.as_str(),
            }),
        );

        let mut header: Option<Vec<String>> = None;
        let mut run = BatchRun::new(self, initial);
        for segment in segments {
            let segment = segment?;
            let mut lines = segment.lines().filter(|l| !l.trim().is_empty());
            if header.is_none() {
                match lines.next() {
                    Some(first) => header = Some(parse_header(first)),
                    None => continue,
                }
            }
            let Some(columns) = header.as_ref() else {
                continue;
            };
            let rows: Vec<RowRecord> = lines.map(|line| parse_row(columns, line)).collect();
            run.push(rows)?;
        }
        run.finish()
    }

    /// Process one row through the single-item endpoint.
    ///
    /// Used by the sequential and concurrent modes; errors propagate to
    /// the caller, which decides whether they abort the run.
    pub fn process_row(
        &self,
        row: &RowRecord,
        item_index: usize,
    ) -> Result<BatchOutcome, PipelineError> {
        telemetry::emit(
            "process_row",
            serde_json::json!({ "row_data": telemetry::redact(&row.to_json()) }),
        );
        let result = self.api.call(ROW_ENDPOINT, &row.to_json())?;
        Ok(BatchOutcome {
            item_index,
            original: row.clone(),
            result,
            success: true,
        })
    }

    /// Submit one batch to the downstream batch endpoint.
    fn submit_batch(
        &self,
        rows: Vec<RowRecord>,
        start_index: usize,
    ) -> Result<Vec<BatchOutcome>, PipelineError> {
        let items: Vec<serde_json::Value> = rows.iter().map(|r| r.to_json()).collect();
        let response = self
            .api
            .call(BATCH_ENDPOINT, &serde_json::json!({ "items": items }))?;

        // Per-item payloads when the API returns a matching results array,
        // otherwise every row shares the whole response
        let per_item = match response.get("results").and_then(|r| r.as_array()) {
            Some(results) if results.len() == rows.len() => Some(results.clone()),
            _ => None,
        };

        Ok(rows
            .into_iter()
            .enumerate()
            .map(|(i, original)| BatchOutcome {
                item_index: start_index + i,
                result: per_item
                    .as_ref()
                    .map(|r| r[i].clone())
                    .unwrap_or_else(|| response.clone()),
                original,
                success: true,
            })
            .collect())
    }
}

/// In-flight state of one batched run: pending rows, tuner, outcomes.
struct BatchRun<'a> {
    engine: &'a RowBatchEngine,
    tuner: BatchTuner,
    pending: Vec<RowRecord>,
    outcomes: Vec<BatchOutcome>,
    batches: usize,
    start: Instant,
}

impl<'a> BatchRun<'a> {
    fn new(engine: &'a RowBatchEngine, initial_batch_size: usize) -> Self {
        Self {
            engine,
            tuner: BatchTuner::new(initial_batch_size),
            pending: Vec::new(),
            outcomes: Vec::new(),
            batches: 0,
            start: Instant::now(),
        }
    }

    /// Queue rows and flush every full batch.
    fn push(&mut self, rows: Vec<RowRecord>) -> Result<(), PipelineError> {
        self.pending.extend(rows);
        while self.pending.len() >= self.tuner.current() {
            self.flush_one()?;
        }
        Ok(())
    }

    /// Flush the trailing short batch and close out the run.
    fn finish(mut self) -> Result<Vec<BatchOutcome>, PipelineError> {
        while !self.pending.is_empty() {
            self.flush_one()?;
        }
        let elapsed = self.start.elapsed().as_secs_f64();
        telemetry::emit(
            "process_batches_complete",
            serde_json::json!({
                "total_batches": self.batches,
                "total_rows": self.outcomes.len(),
                "total_processing_time": elapsed,
                "rows_per_second": self.outcomes.len() as f64 / elapsed.max(0.001),
            }),
        );
        Ok(self.outcomes)
    }

    fn flush_one(&mut self) -> Result<(), PipelineError> {
        let take = self.tuner.current().min(self.pending.len());
        let batch: Vec<RowRecord> = self.pending.drain(..take).collect();
        let batch_len = batch.len();
        self.batches += 1;

        let batch_start = Instant::now();
        let outcomes = self.engine.submit_batch(batch, self.outcomes.len())?;
        let duration = batch_start.elapsed();

        telemetry::emit(
            "batch_processed",
            serde_json::json!({
                "batch_number": self.batches,
                "batch_size": batch_len,
                "batch_duration": duration.as_secs_f64(),
                "rows_per_second": batch_len as f64 / duration.as_secs_f64().max(0.001),
            }),
        );

        // Feedback for the size of the *next* batch
        self.tuner.observe(duration);
        self.outcomes.extend(outcomes);
        Ok(())
    }
}
