//! Pipeline stages for multipage document analysis.
//!
//! Each submodule implements exactly one step and takes its collaborators
//! as arguments, so every stage is testable on its own with fakes.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ chunk ──▶ fanout ──▶ consolidate ──▶ persist ──▶ render
//! (pages)  (windows)  (extract)   (merge)        (job rec)   (PDF)
//! ```
//!
//! 1. [`input`]      : load page text from a path or URL; parse completion events
//! 2. [`chunk`]      : split pages into overlapping page windows
//! 3. [`extract`]    : one structured model call per (chunk, section)
//! 4. [`fanout`]     : bounded-concurrency extraction over every chunk, then a barrier
//! 5. [`consolidate`]: regroup by section and merge the candidates
//! 6. [`persist`]    : write the report and the rendered key to the job record
//! 7. [`render`]     : lay the report out and encode it as a PDF
//!
//! [`llm`] and [`postprocess`] are shared by extraction and consolidation.

pub mod chunk;
pub mod consolidate;
pub mod extract;
pub mod fanout;
pub mod input;
pub mod llm;
pub mod persist;
pub mod postprocess;
pub mod render;
