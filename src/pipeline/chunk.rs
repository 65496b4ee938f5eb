//! Document chunking: split page text into overlapping page windows.
//!
//! ```text
//! pages:    0 1 2 3 4 5 6 7 8 9 10 11      chunk_size = 5, page_overlap = 1
//! chunk 0:  0 1 2 3 4
//! chunk 1:          4 5 6 7 8 9
//! chunk 2:                    9 10 11
//! ```
//!
//! Every chunk after the first repeats the last `page_overlap` pages of its
//! predecessor so that a table or clause straddling a window boundary is seen
//! whole by at least one extraction.

use crate::output::{Chunk, ChunkedDocument};
use std::ops::Range;
use tracing::{info, warn};

/// Page ranges covered by each chunk, overlap included.
///
/// `chunk_size` must be non-zero.
pub fn chunk_page_ranges(total_pages: usize, chunk_size: usize, page_overlap: usize) -> Vec<Range<usize>> {
    debug_assert!(chunk_size > 0);
    (0..total_pages)
        .step_by(chunk_size.max(1))
        .map(|start| {
            let from = if start == 0 {
                0
            } else {
                start.saturating_sub(page_overlap)
            };
            from..(start + chunk_size).min(total_pages)
        })
        .collect()
}

/// Split `pages` into chunks for `job_id`.
///
/// A `chunk_size` of zero does not chunk: the pages come back untouched as
/// [`ChunkedDocument::ByPage`]. An empty page list yields an empty chunk
/// sequence.
pub fn chunk(
    job_id: &str,
    pages: &[String],
    chunk_size: usize,
    page_overlap: usize,
) -> ChunkedDocument {
    let total_pages = pages.len();
    if total_pages == 0 {
        warn!("Job {}: document has no pages, nothing to chunk", job_id);
    }

    if chunk_size == 0 {
        info!("Job {}: {} pages returned by page", job_id, total_pages);
        return ChunkedDocument::ByPage {
            total_pages,
            job_id: job_id.to_string(),
            pages: pages.to_vec(),
        };
    }

    let chunks: Vec<Chunk> = chunk_page_ranges(total_pages, chunk_size, page_overlap)
        .into_iter()
        .enumerate()
        .map(|(chunk_index, range)| Chunk {
            chunk_index,
            text: pages[range].concat(),
            job_id: job_id.to_string(),
        })
        .collect();

    info!(
        "Job {}: {} pages split into {} chunks of {} (overlap {})",
        job_id,
        total_pages,
        chunks.len(),
        chunk_size,
        page_overlap
    );

    ChunkedDocument::Chunks {
        total_pages,
        chunks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("[p{i}]")).collect()
    }

    #[test]
    fn twelve_pages_five_per_chunk_overlap_one() {
        assert_eq!(chunk_page_ranges(12, 5, 1), vec![0..5, 4..10, 9..12]);

        let doc = chunk("job", &pages(12), 5, 1);
        assert!(doc.is_in_chunks());
        assert_eq!(doc.total_pages(), 12);
        let chunks = doc.into_units();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "[p0][p1][p2][p3][p4]");
        assert_eq!(chunks[1].text, "[p4][p5][p6][p7][p8][p9]");
        assert_eq!(chunks[2].text, "[p9][p10][p11]");
        let indices: Vec<usize> = chunks.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(chunks.iter().all(|c| c.job_id == "job"));
    }

    #[test]
    fn single_page_chunks_repeat_the_previous_page() {
        assert_eq!(chunk_page_ranges(4, 1, 1), vec![0..1, 0..2, 1..3, 2..4]);
        assert_eq!(chunk_page_ranges(3, 2, 5), vec![0..2, 0..3]);
    }

    #[test]
    fn non_overlapping_parts_reconstruct_document() {
        for total in 0..20 {
            for size in 1..7 {
                for overlap in 0..size {
                    let p = pages(total);
                    let chunks = chunk("j", &p, size, overlap).into_units();
                    let mut rebuilt = String::new();
                    for (i, c) in chunks.iter().enumerate() {
                        assert_eq!(c.chunk_index, i);
                        let skip = if i == 0 { 0 } else { overlap.min(i * size) };
                        let prefix: usize =
                            p[i * size - skip..i * size].iter().map(|s| s.len()).sum();
                        rebuilt.push_str(&c.text[prefix..]);
                    }
                    assert_eq!(rebuilt, p.concat(), "total={total} size={size} overlap={overlap}");
                }
            }
        }
    }

    #[test]
    fn empty_document_yields_no_chunks() {
        let doc = chunk("j", &[], 5, 1);
        assert_eq!(doc.total_pages(), 0);
        assert!(doc.into_units().is_empty());
    }

    #[test]
    fn zero_chunk_size_returns_pages() {
        let doc = chunk("j", &pages(3), 0, 1);
        assert!(doc.is_by_page());
        match doc {
            ChunkedDocument::ByPage { pages, total_pages, .. } => {
                assert_eq!(total_pages, 3);
                assert_eq!(pages[2], "[p2]");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn overlap_larger_than_start_is_clipped() {
        assert_eq!(chunk_page_ranges(4, 1, 3), vec![0..1, 0..2, 0..3, 0..4]);
    }

    #[test]
    fn single_short_chunk() {
        assert_eq!(chunk_page_ranges(3, 5, 1), vec![0..3]);
    }
}
