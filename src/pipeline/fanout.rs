//! Chunk fan-out: run the extractor over every chunk, bounded, then wait for all.
//!
//! This is a barrier. Consolidation needs every chunk's candidates for a
//! section, so [`run`] drains [`crate::stream::extract_stream`] to the end
//! before returning. The first fatal error stops the drain; the remaining
//! in-flight chunks are dropped with the stream.

use crate::error::DocReportError;
use crate::output::{Chunk, FanOutResult};
use crate::pipeline::extract::SectionExtractor;
use crate::progress::ProgressCallback;
use crate::store::JobStore;
use crate::stream::extract_stream;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{info, warn};

/// Extract every section from every chunk with at most `max_concurrency`
/// chunks in flight, and collect the results.
///
/// Results come back in arrival order, each tagged with its `chunk_index`
/// and `job_id`.
pub async fn run(
    extractor: &SectionExtractor,
    store: Arc<dyn JobStore>,
    chunks: Vec<Chunk>,
    max_concurrency: usize,
    progress: Option<ProgressCallback>,
) -> Result<FanOutResult, DocReportError> {
    let total = chunks.len();
    let mut stream = extract_stream(extractor.clone(), store, chunks, max_concurrency, progress);

    let mut result = FanOutResult::default();
    while let Some(item) = stream.next().await {
        result.absorb(item?);
    }

    if !result.failures.is_empty() {
        warn!(
            "{} section extractions failed across {} chunks",
            result.failures.len(),
            total
        );
    }
    info!(
        "Fan-out complete: {} chunks, {} results kept, {} dropped below threshold",
        result.chunks_processed,
        result.results.len(),
        result.dropped
    );
    Ok(result)
}
