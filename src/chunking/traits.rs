//! Chunker trait and chunk plans.
//!
//! Defines the interface for chunking strategies and the size/overlap plan
//! that drives them.

use crate::core::Chunk;
use crate::error::{ChunkingError, Result};
use serde::{Deserialize, Serialize};

/// Trait for splitting context into bounded segments.
///
/// Implementations must be `Send + Sync` so one chunker can be shared by
/// concurrent protocol runs. Output must be deterministic for the same input.
///
/// # Examples
///
/// ```
/// use minions_rs::chunking::{Chunker, FixedChunker};
///
/// let chunker = FixedChunker::with_size_and_overlap(100, 10);
/// let text = "Hello, world! ".repeat(20);
/// let chunks = chunker.chunk(&text, None).unwrap();
/// assert!(chunks.len() > 1);
/// ```
pub trait Chunker: Send + Sync {
    /// Chunks the input text.
    ///
    /// `plan` overrides the chunker's own size and overlap when present.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkingError::EmptyContext`] for empty input and a
    /// configuration error when the plan is invalid.
    fn chunk(&self, text: &str, plan: Option<&ChunkPlan>) -> Result<Vec<Chunk>>;

    /// Returns the name of the chunking strategy.
    fn name(&self) -> &'static str;

    /// Returns a description of the chunking strategy.
    fn description(&self) -> &'static str {
        "No description available"
    }

    /// Validates a plan before chunking.
    ///
    /// # Errors
    ///
    /// Returns an error if chunk size is zero or overlap is not smaller than chunk size.
    fn validate(&self, plan: Option<&ChunkPlan>) -> Result<()> {
        plan.map_or(Ok(()), ChunkPlan::validate)
    }
}

/// Target chunk size and overlap, both in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPlan {
    /// Maximum chunk length.
    pub chunk_size: usize,
    /// Bytes each chunk repeats from the previous chunk's tail.
    pub overlap: usize,
}

impl Default for ChunkPlan {
    fn default() -> Self {
        Self::new(super::DEFAULT_CHUNK_SIZE, super::DEFAULT_OVERLAP)
    }
}

impl ChunkPlan {
    /// Creates a plan.
    #[must_use]
    pub const fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
        }
    }

    /// Creates a plan whose overlap is a fraction of the chunk size.
    ///
    /// The fraction is clamped to `[0, 1)` and the overlap is kept strictly
    /// below the chunk size.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn with_overlap_fraction(chunk_size: usize, fraction: f64) -> Self {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 0.99)
        } else {
            0.0
        };
        let overlap = (chunk_size as f64 * fraction).round() as usize;
        Self::new(chunk_size, overlap.min(chunk_size.saturating_sub(1)))
    }

    /// Distance between the starts of consecutive chunks.
    #[must_use]
    pub const fn stride(&self) -> usize {
        self.chunk_size.saturating_sub(self.overlap)
    }

    /// Checks the plan.
    ///
    /// # Errors
    ///
    /// Returns an error if chunk size is zero or overlap is not smaller than chunk size.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ChunkingError::InvalidConfig {
                reason: "chunk_size must be > 0".to_string(),
            }
            .into());
        }
        if self.overlap >= self.chunk_size {
            return Err(ChunkingError::OverlapTooLarge {
                overlap: self.overlap,
                size: self.chunk_size,
            }
            .into());
        }
        Ok(())
    }

    /// Halves the chunk size, scaling overlap by the same factor.
    ///
    /// Returns `None` once the size would fall below `min_chunk_size`.
    #[must_use]
    pub const fn shrink(&self, min_chunk_size: usize) -> Option<Self> {
        let chunk_size = self.chunk_size / 2;
        if chunk_size == 0 || chunk_size < min_chunk_size {
            return None;
        }
        let overlap = self.overlap / 2;
        let overlap = if overlap >= chunk_size {
            chunk_size - 1
        } else {
            overlap
        };
        Some(Self::new(chunk_size, overlap))
    }
}
