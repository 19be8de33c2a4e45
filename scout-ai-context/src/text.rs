//! Recursive, overlap-aware text splitting.
//!
//! The splitter works in two passes. First the content is segmented
//! recursively: each delimiter is tried in order, and any piece still larger
//! than the chunk size is re-split with the next, finer delimiter. Segments
//! are byte ranges into the original content, so consecutive segments are
//! always contiguous. Second, segments are merged greedily into chunks of at
//! most `chunk_size` characters; when a chunk is flushed, the trailing
//! segments totalling at most `chunk_overlap` bytes are carried into the next
//! chunk so neighbouring chunks share context.

use regex::Regex;
use serde::Serialize;
use std::ops::Range;

/// Delimiters for markdown-like documents, ordered most to least significant.
pub const MARKDOWN_DELIMITERS: &[&str] = &[
    r"(?m)^\s*#{1,6}\s+.*$", // Headings
    r"```",                  // Code block fences
    r"\n\n",                 // Paragraphs
    r"(?m)^\s*[-*+]\s+",     // Unordered list items
    r"(?m)^\s*\d+\.\s+",     // Ordered list items
    r"\n",                   // Line breaks
    r" ",                    // Spaces
];

/// Delimiters for plain text and source files.
pub const PLAIN_DELIMITERS: &[&str] = &[r"\n\n", r"\n", r" "];

/// A single chunk of a file's content.
#[derive(Debug, Clone, Serialize)]
pub struct TextChunk {
    /// Path of the source file the chunk was cut from.
    pub path: String,
    /// 0-based position of this chunk within the file's chunk sequence.
    pub sequence: usize,
    /// The chunk text itself.
    pub text: String,
}

/// Splits file content into bounded, overlapping chunks.
///
/// A chunk may marginally exceed `chunk_size` when a single indivisible
/// segment (for example one very long heading line) does; everything else is
/// kept within the limit.
pub struct TextSplitter {
    path: String,
    delimiters: Vec<Regex>,
    chunk_size: usize,
    chunk_overlap: usize,
}

/// Markdown-aware splitter for document formats (PDF-extracted markdown,
/// `.md`, and friends).
pub fn splitter_for_document(
    path: impl Into<String>,
    chunk_size: usize,
    chunk_overlap: usize,
) -> TextSplitter {
    TextSplitter::new(path, MARKDOWN_DELIMITERS, chunk_size, chunk_overlap)
}

/// Generic recursive splitter for plain text and source files.
pub fn splitter_for_text(
    path: impl Into<String>,
    chunk_size: usize,
    chunk_overlap: usize,
) -> TextSplitter {
    TextSplitter::new(path, PLAIN_DELIMITERS, chunk_size, chunk_overlap)
}

impl TextSplitter {
    /// Create a splitter from explicit delimiter patterns.
    ///
    /// `chunk_overlap` is clamped below `chunk_size`; an overlap as large as
    /// the chunk itself would never make progress.
    ///
    /// # Panics
    /// Panics if any delimiter pattern is not a valid regular expression, or
    /// if `chunk_size` is zero.
    pub fn new(
        path: impl Into<String>,
        delimiter_patterns: &[&str],
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Self {
        assert!(chunk_size > 0, "chunk_size must be non-zero");
        let delimiters = delimiter_patterns
            .iter()
            .map(|&pattern| Regex::new(pattern).unwrap())
            .collect();

        TextSplitter {
            path: path.into(),
            delimiters,
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
        }
    }

    /// Split `content` into the ordered chunk sequence.
    ///
    /// Empty content yields no chunks. With `chunk_overlap == 0` the chunks
    /// concatenate back to the original content exactly.
    pub fn split(&self, content: &str) -> Vec<TextChunk> {
        let segments = self.segment(content, 0, 0);

        let mut chunks: Vec<TextChunk> = Vec::new();
        // Contiguous run of segments forming the chunk under construction.
        let mut current: Vec<Range<usize>> = Vec::new();
        let mut current_len = 0usize;

        for segment in segments {
            let segment_len = segment.len();
            if current_len + segment_len > self.chunk_size && !current.is_empty() {
                let start = current.first().map(|r| r.start).unwrap_or(segment.start);
                let end = current.last().map(|r| r.end).unwrap_or(segment.start);
                chunks.push(TextChunk {
                    path: self.path.clone(),
                    sequence: chunks.len(),
                    text: content[start..end].to_string(),
                });

                // Carry trailing segments into the next chunk as overlap.
                let mut tail: Vec<Range<usize>> = Vec::new();
                let mut tail_len = 0usize;
                for range in current.iter().rev() {
                    if tail_len + range.len() > self.chunk_overlap {
                        break;
                    }
                    tail_len += range.len();
                    tail.push(range.clone());
                }
                tail.reverse();
                current = tail;
                current_len = tail_len;
            }
            current_len += segment_len;
            current.push(segment);
        }

        if let (Some(first), Some(last)) = (current.first(), current.last()) {
            let text = &content[first.start..last.end];
            if !text.is_empty() {
                chunks.push(TextChunk {
                    path: self.path.clone(),
                    sequence: chunks.len(),
                    text: text.to_string(),
                });
            }
        }

        chunks
    }

    // Recursively split `text` (starting at `offset` bytes into the original
    // content) into byte ranges no larger than chunk_size, delimiters tried
    // coarsest first.
    fn segment(&self, text: &str, delimiter_idx: usize, offset: usize) -> Vec<Range<usize>> {
        let mut segments: Vec<Range<usize>> = Vec::new();

        if text.is_empty() {
            return segments;
        }

        if text.len() <= self.chunk_size {
            segments.push(offset..offset + text.len());
            return segments;
        }

        // Out of delimiters: hard-split on char boundaries.
        if delimiter_idx >= self.delimiters.len() {
            let mut start = 0;
            while start < text.len() {
                let mut end = (start + self.chunk_size).min(text.len());
                while !text.is_char_boundary(end) {
                    end -= 1;
                }
                segments.push(offset + start..offset + end);
                start = end;
            }
            return segments;
        }

        let delimiter = &self.delimiters[delimiter_idx];
        let mut cursor = 0;

        for mat in delimiter.find_iter(text) {
            if mat.start() > cursor {
                segments.extend(self.segment(
                    &text[cursor..mat.start()],
                    delimiter_idx + 1,
                    offset + cursor,
                ));
            }
            // The delimiter match is itself a segment, so nothing is dropped.
            segments.push(offset + mat.start()..offset + mat.end());
            cursor = mat.end();
        }

        if cursor < text.len() {
            segments.extend(self.segment(&text[cursor..], delimiter_idx + 1, offset + cursor));
        }

        segments
    }
}
