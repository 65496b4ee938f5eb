//! Streaming extraction API: emit each chunk's outcome as it completes.
//!
//! ## Why stream?
//!
//! Extraction is the long stage: every chunk costs one model call per
//! section, with retries. A stream lets callers show partial results or
//! persist per-chunk outcomes as they arrive. [`crate::pipeline::fanout`]
//! is built on this stream and simply drains it to form the barrier that
//! consolidation needs.
//!
//! Outcomes arrive in completion order, not chunk order. Every
//! [`ChunkOutcome`] carries its `chunk_index`, and every result inside it
//! carries its `job_id`, so nothing downstream relies on arrival order.

use crate::error::DocReportError;
use crate::job::JobStatus;
use crate::output::{Chunk, ChunkOutcome};
use crate::pipeline::extract::SectionExtractor;
use crate::progress::ProgressCallback;
use crate::store::{self, JobStore};
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::{debug, info};

/// A boxed stream of chunk outcomes.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChunkOutcome, DocReportError>> + Send>>;

/// Extract every chunk with at most `max_concurrency` chunks in flight.
///
/// Before a chunk is extracted its job is (re)marked
/// `INFORMATION_EXTRACTION`; the write is idempotent. A store failure or a
/// non-retryable provider error surfaces as an `Err` item for that chunk.
pub fn extract_stream(
    extractor: SectionExtractor,
    store: Arc<dyn JobStore>,
    chunks: Vec<Chunk>,
    max_concurrency: usize,
    progress: Option<ProgressCallback>,
) -> ChunkStream {
    let total_chunks = chunks.len();
    info!(
        "Extracting {} chunks, {} at a time",
        total_chunks,
        max_concurrency.max(1)
    );

    let s = stream::iter(chunks.into_iter().map(move |chunk| {
        let extractor = extractor.clone();
        let store = Arc::clone(&store);
        let progress = progress.clone();
        async move {
            store::set_status(store.as_ref(), &chunk.job_id, JobStatus::InformationExtraction)
                .await?;
            if let Some(ref cb) = progress {
                cb.on_chunk_start(chunk.chunk_index, total_chunks);
            }

            let outcome = extractor.extract_chunk(&chunk).await?;
            debug!(
                "Chunk {}: {} accepted, {} dropped, {} failed",
                chunk.chunk_index,
                outcome.results.len(),
                outcome.dropped.len(),
                outcome.failures.len()
            );
            if let Some(ref cb) = progress {
                cb.on_chunk_complete(chunk.chunk_index, total_chunks, outcome.results.len());
            }
            Ok(outcome)
        }
    }))
    .buffer_unordered(max_concurrency.max(1));

    Box::pin(s)
}
