//! Common error types for the object processing pipeline

use std::time::Duration;

/// Error from a downstream API call.
///
/// Carries the HTTP-ish status code (if the failure got that far) and a
/// retry-allowed flag so the retry layer can give up early on failures
/// that retrying cannot fix (bad credentials, malformed payload).
#[derive(Debug, Clone)]
pub struct ApiError {
    pub message: String,
    pub status: Option<u16>,
    pub retry_allowed: bool,
}

impl ApiError {
    pub fn new(message: impl Into<String>, status: Option<u16>, retry_allowed: bool) -> Self {
        Self {
            message: message.into(),
            status,
            retry_allowed,
        }
    }

    /// Transient failure without a status code (timeouts, resets).
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(message, None, true)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(s) => write!(f, "API error ({s}): {}", self.message),
            None => write!(f, "API error: {}", self.message),
        }
    }
}

impl std::error::Error for ApiError {}

/// Error from any stage of processing one object.
#[derive(Debug)]
pub enum PipelineError {
    /// Bad request input, never retried. `field` names the offending field.
    Validation {
        message: String,
        field: Option<&'static str>,
    },
    /// Object store read failure, tagged with the object it was for.
    ObjectStore {
        message: String,
        bucket: String,
        key: String,
    },
    /// Downstream API failure that survived retry/breaker handling.
    Api(ApiError),
    /// Circuit breaker rejected the call without invoking the downstream.
    CircuitOpen { service: String, resets_in: Duration },
    /// Parse or processing failure.
    Processing { message: String },
}

impl PipelineError {
    pub fn validation(message: impl Into<String>, field: Option<&'static str>) -> Self {
        Self::Validation {
            message: message.into(),
            field,
        }
    }

    pub fn object_store(message: impl Into<String>, bucket: &str, key: &str) -> Self {
        Self::ObjectStore {
            message: message.into(),
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }

    pub fn processing(message: impl Into<String>) -> Self {
        Self::Processing {
            message: message.into(),
        }
    }

    /// Whether the retry layer may attempt this call again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api(e) => e.retry_allowed,
            Self::ObjectStore { .. } => true,
            Self::Validation { .. } | Self::CircuitOpen { .. } | Self::Processing { .. } => false,
        }
    }

    /// Status code reported to the invocation entrypoint's caller.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            _ => 500,
        }
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation { message, field } => match field {
                Some(field) => write!(f, "validation failed ({field}): {message}"),
                None => write!(f, "validation failed: {message}"),
            },
            Self::ObjectStore {
                message,
                bucket,
                key,
            } => write!(f, "object store error for {bucket}/{key}: {message}"),
            Self::Api(e) => write!(f, "{e}"),
            Self::CircuitOpen { service, resets_in } => write!(
                f,
                "circuit breaker '{service}' is open, resets in {:.1}s",
                resets_in.as_secs_f64()
            ),
            Self::Processing { message } => write!(f, "processing failed: {message}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<ApiError> for PipelineError {
    fn from(e: ApiError) -> Self {
        Self::Api(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_retryable_flag() {
        let err = PipelineError::Api(ApiError::new("timeout", Some(500), true));
        assert!(err.is_retryable());
        let err = PipelineError::Api(ApiError::new("bad auth", Some(401), false));
        assert!(!err.is_retryable());
    }

    #[test]
    fn validation_never_retryable() {
        let err = PipelineError::validation("missing bucket", Some("bucket"));
        assert!(!err.is_retryable());
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn circuit_open_not_retryable() {
        let err = PipelineError::CircuitOpen {
            service: "api-service".to_string(),
            resets_in: Duration::from_secs(42),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn object_store_error_carries_location() {
        let err = PipelineError::object_store("connection refused", "data-bucket", "in/a.csv");
        let msg = format!("{err}");
        assert!(msg.contains("data-bucket/in/a.csv"));
    }

    #[test]
    fn display_validation_with_field() {
        let err = PipelineError::validation("potential path traversal", Some("key"));
        assert_eq!(
            format!("{err}"),
            "validation failed (key): potential path traversal"
        );
    }

    #[test]
    fn display_api_error_with_status() {
        let err = ApiError::new("timed out", Some(500), true);
        assert_eq!(format!("{err}"), "API error (500): timed out");
    }
}
