//! HTTP-backed clients with a sync facade
//!
//! Uses async reqwest internally over a shared tokio runtime, presenting
//! blocking calls for compatibility with the worker threads.

use std::pin::Pin;
use std::sync::LazyLock;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use rowline_core::error::{ApiError, PipelineError};

use crate::client::{ChunkStream, ObjectMeta, ObjectStore, ProcessApi};

/// Connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default whole-call timeout for downstream API requests. The downstream
/// has highly variable latency; the retry layer owns anything beyond this.
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared async HTTP client with connection pooling.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_max_idle_per_host(8)
        .build()
        .expect("failed to build HTTP client")
});

/// Shared tokio runtime for HTTP operations.
static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// Retryable when there is no status (network-level failure) or the status
/// is a server error / throttle; other 4xx retries cannot fix.
fn status_retryable(status: Option<u16>) -> bool {
    match status {
        None => true,
        Some(408 | 429) => true,
        Some(s) => s >= 500,
    }
}

fn api_error_from(e: &reqwest::Error) -> ApiError {
    let status = e.status().map(|s| s.as_u16());
    ApiError::new(e.to_string(), status, status_retryable(status))
}

/// Object store over plain HTTP: objects live at `base_url/bucket/key`.
pub struct HttpObjectStore {
    base_url: String,
}

impl HttpObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url }
    }

    fn url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{bucket}/{key}", self.base_url)
    }
}

impl ObjectStore for HttpObjectStore {
    fn head(&self, bucket: &str, key: &str) -> Result<ObjectMeta, PipelineError> {
        let url = self.url(bucket, key);
        SHARED_RUNTIME.handle().block_on(async {
            let response = SHARED_CLIENT
                .head(&url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| PipelineError::object_store(e.to_string(), bucket, key))?;
            let content_length = response
                .headers()
                .get(reqwest::header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            let etag = response
                .headers()
                .get(reqwest::header::ETAG)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.trim_matches('"').to_string());
            Ok(ObjectMeta {
                content_length,
                etag,
            })
        })
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, PipelineError> {
        let url = self.url(bucket, key);
        SHARED_RUNTIME.handle().block_on(async {
            let response = SHARED_CLIENT
                .get(&url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| PipelineError::object_store(e.to_string(), bucket, key))?;
            let body = response
                .bytes()
                .await
                .map_err(|e| PipelineError::object_store(e.to_string(), bucket, key))?;
            Ok(body.to_vec())
        })
    }

    fn get_chunks(
        &self,
        bucket: &str,
        key: &str,
        chunk_size: usize,
    ) -> Result<ChunkStream, PipelineError> {
        let url = self.url(bucket, key);
        let (bucket, key) = (bucket.to_string(), key.to_string());
        let stream = SHARED_RUNTIME.handle().block_on(async {
            let response = SHARED_CLIENT
                .get(&url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| PipelineError::object_store(e.to_string(), &bucket, &key))?;
            let (b, k) = (bucket.clone(), key.clone());
            let stream = response
                .bytes_stream()
                .map(move |r| {
                    r.map(|b| b.to_vec())
                        .map_err(|e| PipelineError::object_store(e.to_string(), &b, &k))
                })
                .boxed();
            Ok::<_, PipelineError>(stream)
        })?;
        Ok(Box::new(HttpChunks {
            stream,
            buffer: Vec::new(),
            chunk_size,
            done: false,
        }))
    }
}

/// Blocking iterator over an HTTP body, re-sliced to `chunk_size` pieces.
/// Dropping it drops the response stream and releases the connection.
struct HttpChunks {
    stream: Pin<Box<dyn Stream<Item = Result<Vec<u8>, PipelineError>> + Send>>,
    buffer: Vec<u8>,
    chunk_size: usize,
    done: bool,
}

impl Iterator for HttpChunks {
    type Item = Result<Vec<u8>, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done && self.buffer.len() < self.chunk_size {
            match SHARED_RUNTIME.handle().block_on(self.stream.next()) {
                Some(Ok(bytes)) => self.buffer.extend_from_slice(&bytes),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => self.done = true,
            }
        }
        if self.buffer.is_empty() {
            return None;
        }
        let take = self.chunk_size.min(self.buffer.len());
        Some(Ok(self.buffer.drain(..take).collect()))
    }
}

/// Downstream processing API over HTTP: POST JSON to `base_url/endpoint`.
pub struct HttpProcessApi {
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpProcessApi {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            api_key,
            timeout,
        }
    }
}

impl ProcessApi for HttpProcessApi {
    fn call(&self, endpoint: &str, payload: &serde_json::Value) -> Result<serde_json::Value, ApiError> {
        let url = format!("{}/{endpoint}", self.base_url);
        SHARED_RUNTIME.handle().block_on(async {
            let mut request = SHARED_CLIENT.post(&url).timeout(self.timeout).json(payload);
            if let Some(key) = &self.api_key {
                request = request.header("x-api-key", key);
            }
            let response = request
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| api_error_from(&e))?;
            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| api_error_from(&e))
        })
    }
}
