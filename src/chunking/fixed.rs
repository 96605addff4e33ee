//! Fixed-size chunking strategy.
//!
//! Splits context into windows of `chunk_size` bytes whose starts are
//! `chunk_size - overlap` apart. Window edges snap to UTF-8 character
//! boundaries, so multi-byte characters are never split.

use crate::chunking::traits::{ChunkPlan, Chunker};
use crate::chunking::{DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};
use crate::core::Chunk;
use crate::core::chunk::{ceil_char_boundary, floor_char_boundary};
use crate::error::{ChunkingError, Result};

/// Fixed-size chunker with overlapping windows.
///
/// For ASCII input of length `L`, chunk size `S` and overlap `O` it yields
/// exactly `ceil((L - O) / (S - O))` chunks (minimum 1).
///
/// # Examples
///
/// ```
/// use minions_rs::chunking::{Chunker, FixedChunker};
///
/// let chunker = FixedChunker::with_size_and_overlap(300, 50);
/// let text = "x".repeat(1000);
/// let chunks = chunker.chunk(&text, None).unwrap();
/// assert_eq!(chunks.len(), 4);
/// for chunk in &chunks {
///     assert!(chunk.size() <= 300);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FixedChunker {
    plan: ChunkPlan,
}

impl Default for FixedChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl FixedChunker {
    /// Creates a fixed chunker with default settings.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_size_and_overlap(DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP)
    }

    /// Creates a fixed chunker with custom chunk size and no overlap.
    #[must_use]
    pub const fn with_size(chunk_size: usize) -> Self {
        Self::with_size_and_overlap(chunk_size, 0)
    }

    /// Creates a fixed chunker with custom size and overlap.
    #[must_use]
    pub const fn with_size_and_overlap(chunk_size: usize, overlap: usize) -> Self {
        Self {
            plan: ChunkPlan::new(chunk_size, overlap),
        }
    }

    /// Creates a fixed chunker from a plan.
    #[must_use]
    pub const fn from_plan(plan: ChunkPlan) -> Self {
        Self { plan }
    }

    /// Returns the chunker's own plan.
    #[must_use]
    pub const fn plan(&self) -> ChunkPlan {
        self.plan
    }
}

impl Chunker for FixedChunker {
    fn chunk(&self, text: &str, plan: Option<&ChunkPlan>) -> Result<Vec<Chunk>> {
        let plan = plan.copied().unwrap_or(self.plan);
        plan.validate()?;

        if text.is_empty() {
            return Err(ChunkingError::EmptyContext.into());
        }

        let stride = plan.stride();
        let mut chunks = Vec::with_capacity(expected_chunk_count(
            text.len(),
            plan.chunk_size,
            plan.overlap,
        ));
        let mut prev_end = 0;
        let mut id = 0;

        loop {
            // Never start past the previous end, or text would be skipped.
            let mut start = if id == 0 {
                0
            } else {
                ceil_char_boundary(text, id * stride).min(prev_end)
            };
            let mut end = floor_char_boundary(text, start + plan.chunk_size);
            let covered = prev_end.max(start);
            if end <= covered {
                // The next character does not fit: end after it, start as late as allowed.
                end = ceil_char_boundary(text, covered + 1);
                start = ceil_char_boundary(text, end.saturating_sub(plan.chunk_size))
                    .clamp(start, covered);
            }
            let overlap_len = if id == 0 { 0 } else { prev_end - start };

            chunks.push(Chunk::with_overlap(
                id,
                text[start..end].to_string(),
                start..end,
                overlap_len,
            ));

            if end >= text.len() {
                break;
            }
            prev_end = end;
            id += 1;
        }

        Ok(chunks)
    }

    fn name(&self) -> &'static str {
        "fixed"
    }

    fn description(&self) -> &'static str {
        "Fixed-size overlapping windows aligned to UTF-8 boundaries"
    }
}

/// Number of chunks a fixed plan yields for `len` bytes of ASCII text.
///
/// `ceil((len - overlap) / (chunk_size - overlap))`, minimum 1. Returns 0
/// for an invalid plan.
#[must_use]
pub const fn expected_chunk_count(len: usize, chunk_size: usize, overlap: usize) -> usize {
    if chunk_size == 0 || overlap >= chunk_size {
        return 0;
    }
    if len <= chunk_size {
        return 1;
    }
    (len - overlap).div_ceil(chunk_size - overlap)
}

/// Rebuilds the source text from chunks in id order, dropping declared overlaps.
#[must_use]
pub fn reconstruct(chunks: &[Chunk]) -> String {
    let mut ordered: Vec<&Chunk> = chunks.iter().collect();
    ordered.sort_by_key(|c| c.id);
    ordered.iter().map(|c| c.fresh_text()).collect()
}
