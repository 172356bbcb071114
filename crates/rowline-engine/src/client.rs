//! Client traits for the external collaborators
//!
//! The object store and the downstream processing API are injected
//! dependencies, constructed once by the invocation entrypoint and passed
//! in — never process-wide singletons.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use rowline_core::error::{ApiError, PipelineError};
use rowline_core::{CircuitBreaker, RetryPolicy, telemetry};

/// Single-item processing endpoint.
pub const ROW_ENDPOINT: &str = "process-row";
/// Batched processing endpoint; payload is `{"items": [...]}`.
pub const BATCH_ENDPOINT: &str = "batch-process";

/// Object metadata from a HEAD-style lookup.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    pub content_length: u64,
    pub etag: Option<String>,
}

/// Raw byte chunks of an object body. Dropping the iterator releases the
/// underlying connection or file handle.
pub type ChunkStream = Box<dyn Iterator<Item = Result<Vec<u8>, PipelineError>> + Send>;

/// Remote object store serving byte streams for a bucket + key pair.
pub trait ObjectStore: Send + Sync {
    fn head(&self, bucket: &str, key: &str) -> Result<ObjectMeta, PipelineError>;

    /// Fetch the entire object body.
    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, PipelineError>;

    /// Fetch the object body as a chunk stream of roughly `chunk_size`
    /// byte pieces.
    fn get_chunks(
        &self,
        bucket: &str,
        key: &str,
        chunk_size: usize,
    ) -> Result<ChunkStream, PipelineError>;
}

/// Downstream processing API: one endpoint per call shape, JSON in and out.
/// Errors carry a status code and a retry-allowed flag.
pub trait ProcessApi: Send + Sync {
    fn call(&self, endpoint: &str, payload: &serde_json::Value) -> Result<serde_json::Value, ApiError>;
}

/// Downstream API calls wrapped in retry + circuit breaking.
///
/// One breaker per downstream target, shared by every worker that talks to
/// it; the policy and breaker are cheap to clone around the pipeline.
#[derive(Clone)]
pub struct ResilientApi {
    api: Arc<dyn ProcessApi>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

impl ResilientApi {
    pub fn new(api: Arc<dyn ProcessApi>, breaker: Arc<CircuitBreaker>, retry: RetryPolicy) -> Self {
        Self { api, breaker, retry }
    }

    /// Call `endpoint` with retry(breaker(call)) protection.
    ///
    /// A breaker rejection is not retried (the error is non-retryable), so
    /// an open circuit fails fast through the whole stack.
    pub fn call(
        &self,
        endpoint: &str,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, PipelineError> {
        telemetry::emit(
            "api_call_start",
            serde_json::json!({ "endpoint": endpoint }),
        );
        let start = Instant::now();
        let result = self.retry.execute(endpoint, || {
            self.breaker
                .execute(|| self.api.call(endpoint, payload).map_err(PipelineError::from))
        });
        match &result {
            Ok(_) => telemetry::emit(
                "api_call_complete",
                serde_json::json!({
                    "endpoint": endpoint,
                    "duration_seconds": start.elapsed().as_secs_f64(),
                }),
            ),
            Err(e) => telemetry::emit(
                "api_call_error",
                serde_json::json!({ "endpoint": endpoint, "error": e.to_string() }),
            ),
        }
        result
    }
}

/// Filesystem-backed object store: bucket = directory under `root`,
/// key = relative path. Serves local fixtures and CLI runs without a
/// remote store.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(bucket).join(key)
    }
}

impl ObjectStore for FsObjectStore {
    fn head(&self, bucket: &str, key: &str) -> Result<ObjectMeta, PipelineError> {
        let meta = std::fs::metadata(self.path(bucket, key))
            .map_err(|e| PipelineError::object_store(e.to_string(), bucket, key))?;
        Ok(ObjectMeta {
            content_length: meta.len(),
            etag: None,
        })
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, PipelineError> {
        telemetry::emit(
            "get_object",
            serde_json::json!({ "bucket": bucket, "key": key }),
        );
        std::fs::read(self.path(bucket, key))
            .map_err(|e| PipelineError::object_store(e.to_string(), bucket, key))
    }

    fn get_chunks(
        &self,
        bucket: &str,
        key: &str,
        chunk_size: usize,
    ) -> Result<ChunkStream, PipelineError> {
        use std::io::Read;

        let file = std::fs::File::open(self.path(bucket, key))
            .map_err(|e| PipelineError::object_store(e.to_string(), bucket, key))?;
        let bucket = bucket.to_string();
        let key = key.to_string();
        let mut reader = std::io::BufReader::new(file);
        let mut done = false;

        Ok(Box::new(std::iter::from_fn(move || {
            if done {
                return None;
            }
            let mut chunk = vec![0u8; chunk_size];
            let mut filled = 0;
            while filled < chunk.len() {
                match reader.read(&mut chunk[filled..]) {
                    Ok(0) => break,
                    Ok(n) => filled += n,
                    Err(e) => {
                        done = true;
                        return Some(Err(PipelineError::object_store(
                            e.to_string(),
                            &bucket,
                            &key,
                        )));
                    }
                }
            }
            if filled == 0 {
                done = true;
                return None;
            }
            chunk.truncate(filled);
            Some(Ok(chunk))
        })))
    }
}
