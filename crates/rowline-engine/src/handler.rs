//! Invocation entrypoint: event JSON in, status + body out
//!
//! The external orchestrator invokes this once per object and re-invokes
//! on failure, so every unrecovered error must surface as a status code —
//! at-least-once delivery is the caller's contract, not ours.

use std::time::Instant;

use rowline_core::error::PipelineError;
use rowline_core::{telemetry, validate_request};

use crate::orchestrator::{ProcessingOrchestrator, ProcessingRequest};

/// Response reported back to the invoking caller.
#[derive(Debug)]
pub struct InvocationResponse {
    pub status_code: u16,
    pub body: serde_json::Value,
}

impl InvocationResponse {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "statusCode": self.status_code,
            "body": self.body,
        })
    }
}

/// Handle one invocation event.
///
/// Validation failures map to 400 before any object read; all other
/// unrecovered failures map to 500 with full context so the caller's
/// retry policy can fire. Never panics on malformed input.
pub fn handle(event: &serde_json::Value, orchestrator: &ProcessingOrchestrator) -> InvocationResponse {
    telemetry::emit(
        "invocation_start",
        serde_json::json!({ "event": telemetry::redact(event) }),
    );

    let request: ProcessingRequest = match serde_json::from_value(event.clone()) {
        Ok(request) => request,
        Err(e) => {
            return error_response(
                &PipelineError::validation(format!("malformed event: {e}"), None),
                "unknown",
                "unknown",
                0.0,
            );
        }
    };

    if let Err(e) = validate_request(&request.bucket, &request.key) {
        return error_response(&e, &request.bucket, &request.key, 0.0);
    }

    telemetry::emit(
        "processing_start",
        serde_json::json!({
            "bucket": request.bucket,
            "key": request.key,
            "size": request.size_hint,
            "etag": request.etag,
            "source": request.source,
            "event_time": request.time,
            "event_id": request.id,
            "priority": request.options.priority().as_str(),
            "batch_size": request.options.batch_size,
            "use_async": request.options.use_async,
            "use_batch": request.options.use_batch,
            "chunked_processing": request.options.chunked_processing,
        }),
    );

    let start = Instant::now();
    match orchestrator.process(&request) {
        Ok(result) => {
            let time = result.processing_time.as_secs_f64();
            InvocationResponse {
                status_code: 200,
                body: serde_json::json!({
                    "bucket": request.bucket,
                    "key": request.key,
                    "rowsProcessed": result.rows_processed,
                    "processingTimeSeconds": time,
                    "processingMode": result.mode.as_str(),
                    "priority": request.options.priority().as_str(),
                    "rowsPerSecond": result.rows_per_second,
                    "results": result
                        .outcomes
                        .iter()
                        .map(|o| o.to_json())
                        .collect::<Vec<_>>(),
                }),
            }
        }
        Err(e) => error_response(&e, &request.bucket, &request.key, start.elapsed().as_secs_f64()),
    }
}

fn error_response(
    error: &PipelineError,
    bucket: &str,
    key: &str,
    elapsed_seconds: f64,
) -> InvocationResponse {
    let status_code = error.status_code();
    let field = match error {
        PipelineError::Validation { field, .. } => *field,
        _ => None,
    };
    telemetry::emit(
        "invocation_error",
        serde_json::json!({
            "error": error.to_string(),
            "field": field,
            "bucket": bucket,
            "key": key,
            "status_code": status_code,
            "processing_time": elapsed_seconds,
        }),
    );
    InvocationResponse {
        status_code,
        body: serde_json::json!({
            "error": error.to_string(),
            "field": field,
            "bucket": bucket,
            "key": key,
        }),
    }
}
