//! Core domain models for minions-rs.
//!
//! Messages, token usage and chunks. These are pure data types with no
//! I/O dependencies.

pub mod chunk;
pub mod message;
pub mod usage;

pub use chunk::Chunk;
pub use message::{Message, Role};
pub use usage::{Usage, UsageAccumulator};
