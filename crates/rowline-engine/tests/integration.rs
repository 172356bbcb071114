//! End-to-end scenarios through the invocation handler

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rowline_core::error::{ApiError, PipelineError};
use rowline_core::{CircuitBreaker, RetryPolicy};
use rowline_engine::client::{ChunkStream, ObjectMeta, ObjectStore, ProcessApi};
use rowline_engine::{
    ProcessingOrchestrator, ReaderConfig, ResilientApi, handle,
};

/// In-memory object store that counts reads.
struct MemStore {
    body: Vec<u8>,
    reads: AtomicUsize,
}

impl MemStore {
    fn new(body: &str) -> Arc<Self> {
        Arc::new(Self {
            body: body.as_bytes().to_vec(),
            reads: AtomicUsize::new(0),
        })
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl ObjectStore for MemStore {
    fn head(&self, _: &str, _: &str) -> Result<ObjectMeta, PipelineError> {
        Ok(ObjectMeta {
            content_length: self.body.len() as u64,
            etag: Some("test-etag".to_string()),
        })
    }

    fn get(&self, _: &str, _: &str) -> Result<Vec<u8>, PipelineError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.body.clone())
    }

    fn get_chunks(&self, _: &str, _: &str, chunk_size: usize) -> Result<ChunkStream, PipelineError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let chunks: Vec<Result<Vec<u8>, PipelineError>> = self
            .body
            .chunks(chunk_size)
            .map(|c| Ok(c.to_vec()))
            .collect();
        Ok(Box::new(chunks.into_iter()))
    }
}

/// Downstream API that counts calls and fails per a simple script.
struct FakeApi {
    calls: AtomicUsize,
    fail_first: usize,
    error: Option<ApiError>,
    batch_sizes: Mutex<Vec<usize>>,
}

impl FakeApi {
    fn ok() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail_first: 0,
            error: None,
            batch_sizes: Mutex::new(Vec::new()),
        })
    }

    /// Fail the first `n` calls with `error`, succeed afterwards.
    fn failing(n: usize, error: ApiError) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail_first: n,
            error: Some(error),
            batch_sizes: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ProcessApi for FakeApi {
    fn call(&self, _: &str, payload: &serde_json::Value) -> Result<serde_json::Value, ApiError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(items) = payload.get("items").and_then(|i| i.as_array()) {
            self.batch_sizes.lock().unwrap().push(items.len());
        }
        if n <= self.fail_first {
            if let Some(error) = &self.error {
                return Err(error.clone());
            }
        }
        Ok(serde_json::json!({ "status": "success", "result_id": format!("res-{n}") }))
    }
}

fn orchestrator(store: Arc<MemStore>, api: Arc<FakeApi>) -> ProcessingOrchestrator {
    let resilient = ResilientApi::new(
        api,
        Arc::new(CircuitBreaker::new("api-service", 5, Duration::from_secs(60))),
        RetryPolicy::new(1, 1.5),
    );
    ProcessingOrchestrator::new(store, resilient, 2)
}

fn event(bucket: &str, key: &str, options: serde_json::Value) -> serde_json::Value {
    serde_json::json!({ "bucket": bucket, "key": key, "options": options })
}

#[test]
fn fixed_batch_two_batches_in_order() {
    let store = MemStore::new("name,value\na,1\nb,2\nc,3");
    let api = FakeApi::ok();
    let orch = orchestrator(store, api.clone());

    let response = handle(
        &event(
            "test-bucket",
            "in/data.csv",
            serde_json::json!({ "useAsync": false, "useBatch": true, "batchSize": 2 }),
        ),
        &orch,
    );

    assert_eq!(response.status_code, 200);
    assert_eq!(response.body["rowsProcessed"], 3);
    assert_eq!(response.body["processingMode"], "fixed_batch");
    assert_eq!(*api.batch_sizes.lock().unwrap(), vec![2, 1]);

    let results = response.body["results"].as_array().unwrap();
    let names: Vec<&str> = results
        .iter()
        .map(|r| r["originalData"]["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["a", "b", "c"]);
    assert!(results.iter().all(|r| r["success"] == true));
}

#[test]
fn invalid_bucket_rejected_before_read() {
    let store = MemStore::new("name\na");
    let api = FakeApi::ok();
    let orch = orchestrator(store.clone(), api.clone());

    let response = handle(&event("INVALID_UPPER", "data.csv", serde_json::json!({})), &orch);

    assert_eq!(response.status_code, 400);
    assert_eq!(response.body["field"], "bucket");
    assert_eq!(store.reads(), 0);
    assert_eq!(api.calls(), 0);
}

#[test]
fn path_traversal_rejected_before_read() {
    let store = MemStore::new("name\na");
    let orch = orchestrator(store.clone(), FakeApi::ok());

    let response = handle(&event("test-bucket", "../etc/passwd", serde_json::json!({})), &orch);

    assert_eq!(response.status_code, 400);
    assert_eq!(response.body["field"], "key");
    assert_eq!(store.reads(), 0);
}

#[test]
fn non_retryable_failure_single_attempt() {
    let store = MemStore::new("name,value\na,1\nb,2");
    let api = FakeApi::failing(100, ApiError::new("invalid credentials", Some(401), false));
    // Generous retry budget: the retry-allowed flag must stop it, not the cap
    let resilient = ResilientApi::new(
        api.clone(),
        Arc::new(CircuitBreaker::new("api-service", 50, Duration::from_secs(60))),
        RetryPolicy::new(3, 1.5),
    );
    let orch = ProcessingOrchestrator::new(store, resilient, 2);

    let response = handle(
        &event(
            "test-bucket",
            "data.csv",
            serde_json::json!({ "useAsync": false, "useBatch": true, "batchSize": 10 }),
        ),
        &orch,
    );

    assert_eq!(response.status_code, 500);
    assert!(response.body["error"].as_str().unwrap().contains("invalid credentials"));
    assert_eq!(api.calls(), 1);
}

#[test]
fn breaker_opens_after_threshold_and_fails_fast() {
    let api = FakeApi::failing(100, ApiError::new("down", Some(401), false));
    let resilient = ResilientApi::new(
        api.clone(),
        Arc::new(CircuitBreaker::new("api-service", 5, Duration::from_secs(60))),
        RetryPolicy::new(1, 1.5),
    );

    for _ in 0..5 {
        assert!(resilient.call("process-row", &serde_json::json!({})).is_err());
    }
    assert_eq!(api.calls(), 5);

    // Sixth call rejected without reaching the downstream
    let err = resilient.call("process-row", &serde_json::json!({})).unwrap_err();
    match err {
        PipelineError::CircuitOpen { service, .. } => assert_eq!(service, "api-service"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(api.calls(), 5);
}

#[test]
fn chunked_streaming_matches_full_read() {
    let mut body = String::from("name,value\n");
    for i in 0..500 {
        body.push_str(&format!("row{i},{i}\n"));
    }

    // Full, un-chunked run as the baseline
    let full_orch = orchestrator(MemStore::new(&body), FakeApi::ok());
    let full = handle(
        &event(
            "test-bucket",
            "big.csv",
            serde_json::json!({ "useAsync": false, "useBatch": true }),
        ),
        &full_orch,
    );
    assert_eq!(full.status_code, 200);
    assert_eq!(full.body["rowsProcessed"], 500);

    // Streamed run with thresholds shrunk so the fixture streams
    let store = MemStore::new(&body);
    let api = FakeApi::ok();
    let orch = orchestrator(store.clone(), api.clone()).with_reader_config(ReaderConfig {
        stream_threshold: 256,
        segment_bytes: 512,
        chunk_size: 128,
    });
    let response = handle(
        &event(
            "test-bucket",
            "big.csv",
            serde_json::json!({ "useAsync": false, "chunkedProcessing": true }),
        ),
        &orch,
    );

    assert_eq!(response.status_code, 200);
    assert_eq!(response.body["processingMode"], "chunked");
    assert_eq!(response.body["rowsProcessed"], 500);

    // Order survives segment boundaries
    let results = response.body["results"].as_array().unwrap();
    assert_eq!(results[0]["originalData"]["name"], "row0");
    assert_eq!(results[499]["originalData"]["name"], "row499");
}

#[test]
fn concurrent_mode_isolates_row_failures() {
    let store = MemStore::new("name\na\nb\nc\nd\ne");
    let api = FakeApi::failing(1, ApiError::new("bad row", Some(401), false));
    let orch = orchestrator(store, api);

    let response = handle(
        &event("test-bucket", "data.csv", serde_json::json!({ "useAsync": true })),
        &orch,
    );

    assert_eq!(response.status_code, 200);
    assert_eq!(response.body["rowsProcessed"], 5);
    let results = response.body["results"].as_array().unwrap();
    assert_eq!(results.iter().filter(|r| r["success"] == true).count(), 4);
    assert_eq!(results.iter().filter(|r| r["success"] == false).count(), 1);
}

#[test]
fn malformed_event_is_400() {
    let orch = orchestrator(MemStore::new(""), FakeApi::ok());
    let response = handle(&serde_json::json!({ "bucket": 42 }), &orch);
    assert_eq!(response.status_code, 400);
}

#[test]
fn missing_key_is_400() {
    let orch = orchestrator(MemStore::new(""), FakeApi::ok());
    let response = handle(&serde_json::json!({ "bucket": "test-bucket", "key": "" }), &orch);
    assert_eq!(response.status_code, 400);
    assert_eq!(response.body["field"], "key");
}

#[test]
fn response_envelope_shape() {
    let orch = orchestrator(MemStore::new("name\na"), FakeApi::ok());
    let response = handle(
        &event(
            "test-bucket",
            "data.csv",
            serde_json::json!({ "useAsync": false, "useBatch": true, "batchSize": 10 }),
        ),
        &orch,
    );
    let json = response.to_json();
    assert_eq!(json["statusCode"], 200);
    assert!(json["body"]["processingTimeSeconds"].is_number());
    assert!(json["body"]["rowsPerSecond"].is_number());
    assert_eq!(json["body"]["priority"], "standard");
}
