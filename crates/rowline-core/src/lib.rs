//! Rowline Core - Resilience primitives and shared infrastructure
//!
//! This crate provides the building blocks the processing engine composes:
//! retry with backoff, circuit breaking, batch sizing, delimited-row
//! parsing, request validation, and structured telemetry.

pub mod batch;
pub mod breaker;
pub mod error;
pub mod logging;
pub mod retry;
pub mod rows;
pub mod telemetry;
pub mod validate;

// Re-exports for convenience
pub use batch::{BatchTuner, MAX_BATCH_SIZE, MIN_BATCH_SIZE, Priority, optimal_batch_size};
pub use breaker::{CircuitBreaker, CircuitState};
pub use error::{ApiError, PipelineError};
pub use logging::init_logging;
pub use retry::RetryPolicy;
pub use rows::{RowRecord, parse_rows};
pub use validate::validate_request;
