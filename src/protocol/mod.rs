//! Local/remote collaboration protocols.
//!
//! Two protocols share the same capability boundary ([`Client`]), usage
//! accounting, retry policy and outcome types:
//!
//! - [`Minion`]: a bounded dialogue where a remote supervisor questions a
//!   local worker that holds the whole context.
//! - [`Minions`]: the context is chunked, each chunk is read by the local
//!   backend in parallel, and the remote synthesizes the partial answers.

pub mod budget;
pub mod minion;
pub mod minions;
pub mod observer;
pub mod outcome;
pub mod prompt;
pub mod retry;
pub mod signal;

pub use budget::{Budget, BudgetGuard, CancelToken};
pub use minion::{DEFAULT_MAX_ROUNDS, Minion, MinionConfig, MinionState};
pub use minions::{
    DEFAULT_MAX_CONCURRENCY, DEFAULT_MAX_SYNTHESIS_PASSES, DEFAULT_MIN_CHUNK_SIZE, Minions,
    MinionsConfig,
};
pub use observer::{RoundObserver, TracingObserver};
pub use outcome::{ChunkOutcome, PartialAnswer, ProtocolOutcome, Round, RunStatus, Speaker, Trace};
pub use prompt::PromptSet;
pub use retry::{CallReport, RetryPolicy, call_with_retry};
pub use signal::{
    NOT_RELEVANT_MARKER, Signal, detect_signal, extract_answer, extract_follow_up, parse_partial,
};

use crate::client::Client;
use crate::error::Result;

/// Runs a Minion session with default prompts and options.
///
/// # Errors
///
/// Returns `Err` if `max_rounds` is zero. Run failures are reported in the
/// outcome.
pub async fn run_minion<L: Client, R: Client>(
    task: &str,
    context: &str,
    local: L,
    remote: R,
    max_rounds: usize,
    observer: Option<Box<dyn RoundObserver>>,
) -> Result<ProtocolOutcome> {
    Minion::new(local, remote)
        .with_config(MinionConfig::default().with_max_rounds(max_rounds))
        .with_boxed_observer(observer)
        .run(task, context)
        .await
}

/// Runs a Minions session with default prompts and options.
///
/// The re-chunking floor is [`DEFAULT_MIN_CHUNK_SIZE`], lowered to half of
/// `chunk_size` so small plans still get their extra passes.
///
/// # Errors
///
/// Returns `Err` for an invalid chunk plan, zero passes, or an empty
/// context. Run failures are reported in the outcome.
pub async fn run_minions<L: Client, R: Client>(
    task: &str,
    context: &str,
    local: L,
    remote: R,
    chunk_size: usize,
    overlap: usize,
    max_synthesis_passes: usize,
) -> Result<ProtocolOutcome> {
    Minions::new(local, remote)
        .with_config(
            MinionsConfig::default()
                .with_chunking(chunk_size, overlap)
                .with_max_synthesis_passes(max_synthesis_passes)
                .with_min_chunk_size(DEFAULT_MIN_CHUNK_SIZE.min(chunk_size / 2).max(1)),
        )
        .run(task, context)
        .await
}
