//! Traces and outcomes of protocol runs.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize, Serializer};

use crate::core::{Message, Usage};
use crate::error::{Error, Result};

/// Which side of the collaboration produced a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The local (cheap) backend.
    Local,
    /// The remote (strong) backend.
    Remote,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// One appended turn of a protocol trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    /// Round (Minion) or synthesis pass (Minions) number, 0-based.
    pub index: usize,
    /// Who produced the message.
    pub speaker: Speaker,
    /// The produced message.
    pub message: Message,
    /// Usage of the call(s) behind this round, retries included.
    pub usage: Usage,
    /// Whether this is the last round of the run.
    pub is_final: bool,
}

/// Result of the map step for one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PartialAnswer {
    /// The worker extracted something.
    Relevant {
        /// Extracted partial answer.
        answer: String,
    },
    /// The worker found nothing for the task.
    NotRelevant,
    /// Every attempt failed; treated as not relevant.
    Failed {
        /// Last error.
        reason: String,
    },
    /// Never dispatched because the run was cancelled.
    Skipped {
        /// Cancellation reason.
        reason: String,
    },
}

impl PartialAnswer {
    /// The answer text, if the chunk was relevant.
    #[must_use]
    pub fn answer(&self) -> Option<&str> {
        match self {
            Self::Relevant { answer } => Some(answer),
            _ => None,
        }
    }
}

/// Map-step record for one chunk in one synthesis pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkOutcome {
    /// Synthesis pass the chunk belongs to.
    pub pass: usize,
    /// Chunk id within the pass.
    pub chunk_id: usize,
    /// Byte range of the chunk in the context.
    pub byte_range: Range<usize>,
    /// What the worker produced.
    pub partial: PartialAnswer,
    /// Usage of every attempt on this chunk.
    pub usage: Usage,
    /// Attempts issued.
    pub attempts: u32,
}

/// Ordered record of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trace {
    /// Alternating local/remote rounds of a Minion run.
    Rounds {
        /// Rounds in append order.
        rounds: Vec<Round>,
    },
    /// Per-chunk results and synthesis rounds of a Minions run.
    Chunks {
        /// Chunk results, sorted by pass then chunk id.
        chunks: Vec<ChunkOutcome>,
        /// One remote round per synthesis pass.
        synthesis: Vec<Round>,
    },
}

impl Trace {
    /// Rounds in append order (synthesis rounds for a Minions run).
    #[must_use]
    pub fn rounds(&self) -> &[Round] {
        match self {
            Self::Rounds { rounds } => rounds,
            Self::Chunks { synthesis, .. } => synthesis,
        }
    }

    /// Chunk results (empty for a Minion run).
    #[must_use]
    pub fn chunks(&self) -> &[ChunkOutcome] {
        match self {
            Self::Rounds { .. } => &[],
            Self::Chunks { chunks, .. } => chunks,
        }
    }

    /// The last appended round.
    #[must_use]
    pub fn last_round(&self) -> Option<&Round> {
        self.rounds().last()
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The remote signalled completion.
    Converged,
    /// The round or pass budget ran out; the answer is best-effort.
    Unconverged,
    /// A fatal error stopped the run.
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Converged => write!(f, "converged"),
            Self::Unconverged => write!(f, "unconverged"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Terminal artifact of a protocol run.
///
/// Failed runs still report their partial trace and every token spent.
#[derive(Debug, Serialize)]
pub struct ProtocolOutcome {
    /// Final answer. A failed run keeps the best answer seen so far, possibly empty.
    pub final_answer: String,
    /// What happened, in order.
    pub trace: Trace,
    /// Sum of the usage of every capability call issued.
    pub total_usage: Usage,
    /// Completed rounds (Minion) or synthesis passes (Minions).
    pub rounds_used: usize,
    /// Whether the remote signalled completion.
    pub converged: bool,
    /// The error that failed the run.
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<Error>,
}

#[allow(clippy::ref_option)]
fn serialize_error<S: Serializer>(
    error: &Option<Error>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    error
        .as_ref()
        .map(ToString::to_string)
        .serialize(serializer)
}

impl ProtocolOutcome {
    /// How the run ended.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        if self.error.is_some() {
            RunStatus::Failed
        } else if self.converged {
            RunStatus::Converged
        } else {
            RunStatus::Unconverged
        }
    }

    /// Whether the run failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Turns a failed outcome into its error.
    ///
    /// # Errors
    ///
    /// Returns the error that failed the run. The partial trace is dropped.
    pub fn into_result(self) -> Result<Self> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self),
        }
    }
}
