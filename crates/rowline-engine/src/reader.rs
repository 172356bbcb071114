//! Object content acquisition: full read or streamed text segments

use rowline_core::error::PipelineError;
use rowline_core::telemetry;

use crate::client::{ChunkStream, ObjectStore};

/// Thresholds for the streamed read path. Defaults match production; tests
/// shrink them to exercise streaming on small fixtures.
#[derive(Debug, Clone, Copy)]
pub struct ReaderConfig {
    /// Objects larger than this stream instead of loading whole.
    pub stream_threshold: u64,
    /// Accumulated bytes that trigger a segment flush.
    pub segment_bytes: usize,
    /// Requested size of raw chunks from the store.
    pub chunk_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            stream_threshold: 50 * 1024 * 1024,
            segment_bytes: 5 * 1024 * 1024,
            chunk_size: 1024 * 1024,
        }
    }
}

/// Reads object content for the pipeline, whole or as text segments.
pub struct ObjectReader<'a> {
    store: &'a dyn ObjectStore,
    config: ReaderConfig,
}

impl<'a> ObjectReader<'a> {
    pub fn new(store: &'a dyn ObjectStore, config: ReaderConfig) -> Self {
        Self { store, config }
    }

    /// Whether a chunked-processing request actually streams: only above
    /// the size threshold, otherwise a full read is cheaper.
    pub fn should_stream(&self, content_length: u64) -> bool {
        content_length > self.config.stream_threshold
    }

    /// Entire object as text, invalid UTF-8 replaced.
    pub fn read_full(&self, bucket: &str, key: &str) -> Result<String, PipelineError> {
        let body = self.store.get(bucket, key)?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Streamed read: decoded text segments of roughly `segment_bytes`
    /// each, flushed at the last complete line boundary so no row is ever
    /// split across segments. The remainder flushes at stream end.
    pub fn segments(&self, bucket: &str, key: &str) -> Result<SegmentIter, PipelineError> {
        telemetry::emit(
            "stream_object",
            serde_json::json!({
                "bucket": bucket,
                "key": key,
                "segment_bytes": self.config.segment_bytes,
                "chunk_size": self.config.chunk_size,
            }),
        );
        let chunks = self.store.get_chunks(bucket, key, self.config.chunk_size)?;
        Ok(SegmentIter {
            chunks,
            buffer: Vec::new(),
            segment_bytes: self.config.segment_bytes,
            done: false,
        })
    }
}

/// Iterator over decoded, line-aligned text segments of a streamed object.
///
/// Owns the chunk stream; dropping it (normally or on error) releases the
/// underlying connection.
pub struct SegmentIter {
    chunks: ChunkStream,
    buffer: Vec<u8>,
    segment_bytes: usize,
    done: bool,
}

impl Iterator for SegmentIter {
    type Item = Result<String, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        for chunk in self.chunks.by_ref() {
            match chunk {
                Ok(bytes) => {
                    self.buffer.extend_from_slice(&bytes);
                    if self.buffer.len() > self.segment_bytes {
                        // Hold the partial tail line for the next segment.
                        // A line longer than the buffer keeps accumulating
                        // until its newline arrives.
                        if let Some(pos) = self.buffer.iter().rposition(|&b| b == b'\n') {
                            let tail = self.buffer.split_off(pos + 1);
                            let segment = String::from_utf8_lossy(&self.buffer).into_owned();
                            self.buffer = tail;
                            return Some(Ok(segment));
                        }
                    }
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        self.done = true;
        if self.buffer.is_empty() {
            None
        } else {
            let segment = String::from_utf8_lossy(&self.buffer).into_owned();
            self.buffer.clear();
            Some(Ok(segment))
        }
    }
}
