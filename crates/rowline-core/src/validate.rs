//! Request validation — runs before any object read

use crate::error::PipelineError;

/// Validate the bucket/key pair from an invocation request.
///
/// Rejects missing fields, path traversal in the key, and malformed bucket
/// names (S3 naming rules: 3-63 chars, lowercase alphanumeric first and
/// last, interior lowercase alphanumeric, hyphen, or dot).
pub fn validate_request(bucket: &str, key: &str) -> Result<(), PipelineError> {
    if bucket.is_empty() {
        return Err(PipelineError::validation(
            "bucket name is missing",
            Some("bucket"),
        ));
    }
    if key.is_empty() {
        return Err(PipelineError::validation(
            "object key is missing",
            Some("key"),
        ));
    }
    if key.contains("..") || key.starts_with('/') {
        return Err(PipelineError::validation(
            "invalid object key: potential path traversal",
            Some("key"),
        ));
    }
    if !valid_bucket_name(bucket) {
        return Err(PipelineError::validation(
            format!("invalid bucket name format: {bucket}"),
            Some("bucket"),
        ));
    }
    Ok(())
}

fn valid_bucket_name(bucket: &str) -> bool {
    let bytes = bucket.as_bytes();
    if !(3..=63).contains(&bytes.len()) {
        return false;
    }
    let edge_ok = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !edge_ok(bytes[0]) || !edge_ok(bytes[bytes.len() - 1]) {
        return false;
    }
    bytes
        .iter()
        .all(|&b| edge_ok(b) || b == b'-' || b == b'.')
}
