//! Processing-mode selection and end-to-end run assembly

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;

use rowline_core::error::PipelineError;
use rowline_core::rows::parse_rows;
use rowline_core::{Priority, telemetry};

use crate::client::{ObjectStore, ResilientApi};
use crate::concurrent::ConcurrentRowProcessor;
use crate::engine::{BatchOutcome, RowBatchEngine};
use crate::reader::{ObjectReader, ReaderConfig};

/// Per-invocation processing options, camelCase on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessingOptions {
    pub use_async: bool,
    pub use_batch: bool,
    pub priority: String,
    pub batch_size: Option<u32>,
    pub chunked_processing: bool,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            use_async: true,
            use_batch: true,
            priority: "standard".to_string(),
            batch_size: None,
            chunked_processing: false,
        }
    }
}

impl ProcessingOptions {
    pub fn priority(&self) -> Priority {
        Priority::parse(&self.priority)
    }

    fn batch_size(&self) -> Option<usize> {
        self.batch_size.map(|b| b as usize)
    }
}

/// One invocation's job description. Immutable for the request lifetime.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingRequest {
    pub bucket: String,
    pub key: String,
    /// Reported object size; 0 when unknown.
    #[serde(default)]
    pub size_hint: u64,
    #[serde(default)]
    pub etag: String,
    #[serde(default)]
    pub options: ProcessingOptions,
    // Event envelope passthrough, logged but not acted on
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingMode {
    Chunked,
    Concurrent,
    AdaptiveBatch,
    FixedBatch,
    Sequential,
}

impl ProcessingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chunked => "chunked",
            Self::Concurrent => "concurrent",
            Self::AdaptiveBatch => "adaptive_batch",
            Self::FixedBatch => "fixed_batch",
            Self::Sequential => "sequential",
        }
    }

    /// Mode precedence: chunked (csv only) over concurrent over batch;
    /// sequential is the compatibility fallback.
    pub fn select(options: &ProcessingOptions, key: &str) -> Self {
        if options.chunked_processing && key.ends_with(".csv") {
            Self::Chunked
        } else if options.use_async {
            Self::Concurrent
        } else if options.use_batch {
            if options.batch_size.is_none() {
                Self::AdaptiveBatch
            } else {
                Self::FixedBatch
            }
        } else {
            Self::Sequential
        }
    }
}

/// Terminal artifact of one processing run.
#[derive(Debug)]
pub struct ProcessingResult {
    pub mode: ProcessingMode,
    pub rows_processed: usize,
    pub processing_time: Duration,
    pub rows_per_second: f64,
    pub outcomes: Vec<BatchOutcome>,
}

/// Composes the object reader with the batch engine or the concurrent
/// processor, per the mode selected from the request options.
pub struct ProcessingOrchestrator {
    store: Arc<dyn ObjectStore>,
    engine: RowBatchEngine,
    concurrent: ConcurrentRowProcessor,
    reader_config: ReaderConfig,
}

impl ProcessingOrchestrator {
    pub fn new(store: Arc<dyn ObjectStore>, api: ResilientApi, workers: usize) -> Self {
        Self {
            store,
            engine: RowBatchEngine::new(api.clone()),
            concurrent: ConcurrentRowProcessor::new(api, workers),
            reader_config: ReaderConfig::default(),
        }
    }

    /// Override streaming thresholds (tests, tuning).
    pub fn with_reader_config(mut self, config: ReaderConfig) -> Self {
        self.reader_config = config;
        self
    }

    /// Process one object end to end. Unrecovered failures from any stage
    /// propagate to the caller; nothing is swallowed here.
    pub fn process(&self, request: &ProcessingRequest) -> Result<ProcessingResult, PipelineError> {
        let start = Instant::now();
        let mode = ProcessingMode::select(&request.options, &request.key);
        telemetry::emit(
            "process_start",
            serde_json::json!({
                "bucket": request.bucket,
                "key": request.key,
                "size_hint": request.size_hint,
                "etag": request.etag,
                "mode": mode.as_str(),
                "priority": request.options.priority().as_str(),
            }),
        );

        let outcomes = self.run_mode(request, mode).inspect_err(|e| {
            telemetry::emit(
                "process_error",
                serde_json::json!({
                    "bucket": request.bucket,
                    "key": request.key,
                    "error": e.to_string(),
                    "processing_time": start.elapsed().as_secs_f64(),
                }),
            );
        })?;

        let processing_time = start.elapsed();
        let rows_processed = outcomes.len();
        let rows_per_second = rows_processed as f64 / processing_time.as_secs_f64().max(0.001);
        telemetry::emit(
            "process_complete",
            serde_json::json!({
                "bucket": request.bucket,
                "key": request.key,
                "rows_processed": rows_processed,
                "processing_time": processing_time.as_secs_f64(),
                "processing_mode": mode.as_str(),
                "rows_per_second": rows_per_second,
            }),
        );

        Ok(ProcessingResult {
            mode,
            rows_processed,
            processing_time,
            rows_per_second,
            outcomes,
        })
    }

    fn run_mode(
        &self,
        request: &ProcessingRequest,
        mode: ProcessingMode,
    ) -> Result<Vec<BatchOutcome>, PipelineError> {
        let reader = ObjectReader::new(self.store.as_ref(), self.reader_config);
        let options = &request.options;
        let (bucket, key) = (request.bucket.as_str(), request.key.as_str());

        match mode {
            ProcessingMode::Chunked => {
                let meta = self.store.head(bucket, key)?;
                if reader.should_stream(meta.content_length) {
                    self.engine.process_segments(
                        reader.segments(bucket, key)?,
                        options.batch_size(),
                        options.priority(),
                        meta.content_length,
                        bucket,
                        key,
                    )
                } else {
                    // Not large enough to warrant streaming
                    let content = reader.read_full(bucket, key)?;
                    self.engine.process_content(
                        &content,
                        options.batch_size(),
                        options.priority(),
                        bucket,
                        key,
                    )
                }
            }
            ProcessingMode::Concurrent => {
                let content = reader.read_full(bucket, key)?;
                let (_, rows) = parse_rows(&content)?;
                Ok(self.concurrent.process_rows(rows))
            }
            ProcessingMode::AdaptiveBatch | ProcessingMode::FixedBatch => {
                let content = reader.read_full(bucket, key)?;
                self.engine.process_content(
                    &content,
                    options.batch_size(),
                    options.priority(),
                    bucket,
                    key,
                )
            }
            ProcessingMode::Sequential => {
                let content = reader.read_full(bucket, key)?;
                let (_, rows) = parse_rows(&content)?;
                rows.iter()
                    .enumerate()
                    .map(|(i, row)| self.engine.process_row(row, i))
                    .collect()
            }
        }
    }
}
