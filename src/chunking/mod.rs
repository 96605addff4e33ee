//! Chunking for oversized context.
//!
//! A trait-based system for splitting context into bounded, overlapping
//! segments that local workers process independently.
//!
//! - **Fixed**: byte windows with configurable size and overlap, aligned to UTF-8 boundaries

pub mod fixed;
pub mod traits;

pub use fixed::{FixedChunker, expected_chunk_count, reconstruct};
pub use traits::{ChunkPlan, Chunker};

/// Default chunk size in bytes (~1k tokens at 4 chars/token).
pub const DEFAULT_CHUNK_SIZE: usize = 4_000;

/// Default overlap in bytes (10% of the default chunk size).
pub const DEFAULT_OVERLAP: usize = 400;
