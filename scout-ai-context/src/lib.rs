//! # scout-ai-context
//!
//! Text chunking for the scout indexing pipeline.
//!
//! Files are split into bounded, overlapping chunks before embedding. Two
//! delimiter profiles are provided: a markdown-aware one for document formats
//! (headings, fences and paragraphs make natural boundaries) and a generic
//! recursive one for plain text and source files. Splitting is deterministic:
//! the same content with the same splitter configuration always produces the
//! same ordered chunk sequence, which the vector store relies on for
//! idempotent upserts.

pub mod text;

pub use text::{
    MARKDOWN_DELIMITERS, PLAIN_DELIMITERS, TextChunk, TextSplitter, splitter_for_document,
    splitter_for_text,
};
