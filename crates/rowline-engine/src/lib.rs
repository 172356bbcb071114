//! Rowline Engine - Resilient adaptive batch processing pipeline
//!
//! Reads delimited-text objects from an object store and drives each row
//! through a downstream processing API: streaming reads for large
//! objects, adaptive batch sizing, and a retry + circuit-breaker stack
//! around every downstream call.

pub mod client;
pub mod concurrent;
pub mod engine;
pub mod handler;
pub mod http;
pub mod orchestrator;
pub mod reader;
pub mod sim;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use client::{FsObjectStore, ObjectMeta, ObjectStore, ProcessApi, ResilientApi};
pub use concurrent::ConcurrentRowProcessor;
pub use engine::{BatchOutcome, RowBatchEngine};
pub use handler::{InvocationResponse, handle};
pub use http::{HttpObjectStore, HttpProcessApi};
pub use orchestrator::{
    ProcessingMode, ProcessingOptions, ProcessingOrchestrator, ProcessingRequest, ProcessingResult,
};
pub use reader::{ObjectReader, ReaderConfig};
pub use sim::SimulatedApi;
