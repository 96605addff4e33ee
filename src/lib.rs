//! # minions-rs
//!
//! Local/remote model collaboration over long context.
//!
//! A cheap local model reads the long context; a strong remote model
//! reasons over what the local side reports. Two protocols are provided:
//!
//! - **Minion**: a bounded supervisor/worker dialogue. The remote asks, the
//!   local answers from the full context, until the remote signals a final
//!   answer or the round budget runs out.
//! - **Minions**: the context is split into overlapping chunks, every chunk
//!   is read by the local model concurrently, and the remote synthesizes
//!   the partial answers, re-chunking finer when they are insufficient.
//!
//! Both report a [`ProtocolOutcome`] with the final answer, an ordered
//! trace, and the token usage of every call issued, retries included.
//!
//! Backends are anything implementing [`Client`]; [`CommandClient`] speaks
//! a JSON protocol to an external process.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
// Note: unsafe is needed for memory-mapped I/O (memmap2)
#![warn(unsafe_code)]

pub mod chunking;
pub mod cli;
pub mod client;
pub mod core;
pub mod error;
pub mod io;
pub mod protocol;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

// Re-export core domain types
pub use core::{Chunk, Message, Role, Usage, UsageAccumulator};

// Re-export chunking types
pub use chunking::{ChunkPlan, Chunker, FixedChunker};

// Re-export capability types
pub use client::{CallResult, ChatOptions, Client, CommandClient};

// Re-export protocol types
pub use protocol::{
    Budget, CancelToken, Minion, MinionConfig, Minions, MinionsConfig, PromptSet,
    ProtocolOutcome, RetryPolicy, RoundObserver, RunStatus, Trace, run_minion, run_minions,
};

// Re-export CLI types
pub use cli::{Cli, Commands, OutputFormat};
