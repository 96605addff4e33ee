//! Chunk representation.
//!
//! Chunks are segments of a context string created by a chunking strategy.
//! Each chunk keeps its byte range in the source and the length of the
//! prefix it shares with the previous chunk.

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A bounded segment of source context.
///
/// # Examples
///
/// ```
/// use minions_rs::core::Chunk;
///
/// let chunk = Chunk::new(0, "Hello, world!".to_string(), 0..13);
/// assert_eq!(chunk.size(), 13);
/// assert!(!chunk.overlap_with_prev);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Sequential id within the source (0-based).
    pub id: usize,

    /// Chunk content.
    pub text: String,

    /// Byte range in the source context.
    pub byte_range: Range<usize>,

    /// Whether this chunk starts inside the previous chunk.
    pub overlap_with_prev: bool,

    /// Number of leading bytes shared with the previous chunk.
    pub overlap_len: usize,
}

impl Chunk {
    /// Creates a chunk without overlap.
    #[must_use]
    pub const fn new(id: usize, text: String, byte_range: Range<usize>) -> Self {
        Self {
            id,
            text,
            byte_range,
            overlap_with_prev: false,
            overlap_len: 0,
        }
    }

    /// Creates a chunk whose first `overlap_len` bytes repeat the previous chunk's tail.
    #[must_use]
    pub const fn with_overlap(
        id: usize,
        text: String,
        byte_range: Range<usize>,
        overlap_len: usize,
    ) -> Self {
        Self {
            id,
            text,
            byte_range,
            overlap_with_prev: overlap_len > 0,
            overlap_len,
        }
    }

    /// Returns the size of the chunk in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.text.len()
    }

    /// Checks if the chunk is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Returns the start byte offset in the source.
    #[must_use]
    pub const fn start(&self) -> usize {
        self.byte_range.start
    }

    /// Returns the end byte offset in the source.
    #[must_use]
    pub const fn end(&self) -> usize {
        self.byte_range.end
    }

    /// The part of the chunk not shared with the previous chunk.
    #[must_use]
    pub fn fresh_text(&self) -> &str {
        self.text.get(self.overlap_len..).unwrap_or("")
    }

    /// Returns a preview of the chunk content, cut on a character boundary.
    #[must_use]
    pub fn preview(&self, max_len: usize) -> &str {
        if self.text.len() <= max_len {
            &self.text
        } else {
            &self.text[..floor_char_boundary(&self.text, max_len)]
        }
    }
}

/// Largest char boundary in `s` that is `<= pos`.
pub(crate) fn floor_char_boundary(s: &str, pos: usize) -> usize {
    let mut pos = pos.min(s.len());
    while pos > 0 && !s.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

/// Smallest char boundary in `s` that is `>= pos`, capped at `s.len()`.
pub(crate) fn ceil_char_boundary(s: &str, pos: usize) -> usize {
    let mut pos = pos.min(s.len());
    while pos < s.len() && !s.is_char_boundary(pos) {
        pos += 1;
    }
    pos
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_new() {
        let chunk = Chunk::new(3, "content".to_string(), 10..17);
        assert_eq!(chunk.id, 3);
        assert_eq!(chunk.start(), 10);
        assert_eq!(chunk.end(), 17);
        assert_eq!(chunk.fresh_text(), "content");
    }

    #[test]
    fn test_chunk_with_overlap() {
        let chunk = Chunk::with_overlap(1, "abcdef".to_string(), 4..10, 2);
        assert!(chunk.overlap_with_prev);
        assert_eq!(chunk.fresh_text(), "cdef");

        let chunk = Chunk::with_overlap(1, "abcdef".to_string(), 4..10, 0);
        assert!(!chunk.overlap_with_prev);
    }

    #[test]
    fn test_chunk_preview_respects_utf8() {
        let chunk = Chunk::new(0, "Hello世界".to_string(), 0..11);
        assert_eq!(chunk.preview(6), "Hello");
        assert_eq!(chunk.preview(100), "Hello世界");
    }

    #[test]
    fn test_floor_char_boundary() {
        let s = "a世b";
        assert_eq!(floor_char_boundary(s, 0), 0);
        assert_eq!(floor_char_boundary(s, 2), 1);
        assert_eq!(floor_char_boundary(s, 4), 4);
        assert_eq!(floor_char_boundary(s, 99), s.len());
        assert_eq!(ceil_char_boundary(s, 2), 4);
        assert_eq!(ceil_char_boundary(s, 99), s.len());
    }

    #[test]
    fn test_chunk_serialization() {
        let chunk = Chunk::with_overlap(2, "text".to_string(), 8..12, 1);
        let json = serde_json::to_string(&chunk).unwrap();
        let back: Chunk = serde_json::from_str(&json).unwrap();
        assert_eq!(back, chunk);
    }
}
