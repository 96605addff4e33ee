//! The Minions protocol: decompose, map, synthesize.
//!
//! The context is split into overlapping chunks. Each chunk goes to the
//! local backend on its own, with at most `max_concurrency` calls in
//! flight. Once every chunk has reported, the relevant partial answers are
//! handed to the remote backend in chunk-id order for synthesis. If the
//! synthesizer reports insufficient information, the context is re-chunked
//! at half the size and the pipeline runs again, up to
//! `max_synthesis_passes` passes.

use futures_util::{StreamExt, stream};
use tracing::{debug, info, instrument, warn};

use crate::chunking::{ChunkPlan, Chunker, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP, FixedChunker};
use crate::client::{ChatOptions, Client};
use crate::core::{Chunk, Message, UsageAccumulator};
use crate::error::{Error, ProtocolError, Result};

use super::budget::{Budget, BudgetGuard};
use super::observer::RoundObserver;
use super::outcome::{ChunkOutcome, PartialAnswer, ProtocolOutcome, Round, Speaker, Trace};
use super::prompt::{PromptSet, build_map_prompt, build_synthesis_prompt};
use super::retry::{RetryPolicy, call_with_retry};
use super::signal::{Signal, detect_signal, extract_answer, parse_partial};

/// Default number of map/synthesize passes.
pub const DEFAULT_MAX_SYNTHESIS_PASSES: usize = 2;

/// Default number of concurrent local calls.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Smallest chunk size a re-chunking pass may use.
pub const DEFAULT_MIN_CHUNK_SIZE: usize = 256;

/// Configuration for a Minions run.
#[derive(Debug, Clone)]
pub struct MinionsConfig {
    /// Chunk size in bytes for the first pass.
    pub chunk_size: usize,
    /// Overlap in bytes for the first pass.
    pub overlap: usize,
    /// Maximum map/synthesize passes. Must be at least 1.
    pub max_synthesis_passes: usize,
    /// Maximum concurrent local calls. Must be at least 1.
    pub max_concurrency: usize,
    /// Re-chunking never goes below this size.
    pub min_chunk_size: usize,
    /// Options for local (map) calls.
    pub local_options: ChatOptions,
    /// Options for remote (synthesis) calls.
    pub remote_options: ChatOptions,
    /// Retry policy for both sides.
    pub retry: RetryPolicy,
    /// Time, call and cancellation limits.
    pub budget: Budget,
}

impl Default for MinionsConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
            max_synthesis_passes: DEFAULT_MAX_SYNTHESIS_PASSES,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            min_chunk_size: DEFAULT_MIN_CHUNK_SIZE,
            local_options: ChatOptions::default(),
            remote_options: ChatOptions::default().json_response(true),
            retry: RetryPolicy::default(),
            budget: Budget::default(),
        }
    }
}

impl MinionsConfig {
    /// Sets chunk size and overlap.
    #[must_use]
    pub const fn with_chunking(mut self, chunk_size: usize, overlap: usize) -> Self {
        self.chunk_size = chunk_size;
        self.overlap = overlap;
        self
    }

    /// Sets chunk size with overlap as a fraction of it.
    #[must_use]
    pub fn with_overlap_fraction(mut self, chunk_size: usize, fraction: f64) -> Self {
        let plan = ChunkPlan::with_overlap_fraction(chunk_size, fraction);
        self.chunk_size = plan.chunk_size;
        self.overlap = plan.overlap;
        self
    }

    /// Sets the pass budget.
    #[must_use]
    pub const fn with_max_synthesis_passes(mut self, passes: usize) -> Self {
        self.max_synthesis_passes = passes;
        self
    }

    /// Sets the local concurrency bound.
    #[must_use]
    pub const fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Sets the re-chunking floor.
    #[must_use]
    pub const fn with_min_chunk_size(mut self, min_chunk_size: usize) -> Self {
        self.min_chunk_size = min_chunk_size;
        self
    }

    /// Sets the local call options.
    #[must_use]
    pub fn with_local_options(mut self, options: ChatOptions) -> Self {
        self.local_options = options;
        self
    }

    /// Sets the remote call options.
    #[must_use]
    pub fn with_remote_options(mut self, options: ChatOptions) -> Self {
        self.remote_options = options;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the run budget.
    #[must_use]
    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = budget;
        self
    }

    /// The first pass's chunk plan.
    #[must_use]
    pub const fn plan(&self) -> ChunkPlan {
        ChunkPlan::new(self.chunk_size, self.overlap)
    }

    /// Rejects configurations that cannot run.
    ///
    /// # Errors
    ///
    /// Returns a chunking error for a bad chunk plan, or
    /// [`ProtocolError::InvalidConfig`] for zero passes or zero concurrency.
    pub fn validate(&self) -> Result<()> {
        self.plan().validate()?;
        if self.max_synthesis_passes == 0 {
            return Err(ProtocolError::InvalidConfig {
                reason: "max_synthesis_passes must be at least 1".to_string(),
            }
            .into());
        }
        if self.max_concurrency == 0 {
            return Err(ProtocolError::InvalidConfig {
                reason: "max_concurrency must be at least 1".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// A local/remote pair running the Minions protocol.
pub struct Minions<L, R> {
    local: L,
    remote: R,
    chunker: Box<dyn Chunker>,
    prompts: PromptSet,
    config: MinionsConfig,
    observer: Option<Box<dyn RoundObserver>>,
}

impl<L: Client, R: Client> Minions<L, R> {
    /// Creates a run with the fixed chunker, default prompts and configuration.
    pub fn new(local: L, remote: R) -> Self {
        Self {
            local,
            remote,
            chunker: Box::new(FixedChunker::new()),
            prompts: PromptSet::defaults(),
            config: MinionsConfig::default(),
            observer: None,
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: MinionsConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the prompts.
    #[must_use]
    pub fn with_prompts(mut self, prompts: PromptSet) -> Self {
        self.prompts = prompts;
        self
    }

    /// Replaces the chunking strategy.
    #[must_use]
    pub fn with_chunker(mut self, chunker: Box<dyn Chunker>) -> Self {
        self.chunker = chunker;
        self
    }

    /// Installs an observer for synthesis rounds.
    #[must_use]
    pub fn with_observer(mut self, observer: impl RoundObserver + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// The active configuration.
    pub const fn config(&self) -> &MinionsConfig {
        &self.config
    }

    /// Runs the protocol on `task` over `context`.
    ///
    /// # Errors
    ///
    /// Returns `Err` only for an invalid configuration or an empty context,
    /// before any call is made. Failures during the run are reported in the
    /// outcome.
    #[instrument(skip_all, fields(
        local = self.local.model_name(),
        remote = self.remote.model_name(),
        context_bytes = context.len(),
        chunk_size = self.config.chunk_size,
        overlap = self.config.overlap,
    ))]
    pub async fn run(&self, task: &str, context: &str) -> Result<ProtocolOutcome> {
        self.config.validate()?;
        let mut plan = self.config.plan();
        let mut chunks = self.chunker.chunk(context, Some(&plan))?;

        let accumulator = UsageAccumulator::new();
        let budget = self.config.budget.start();
        let max_passes = self.config.max_synthesis_passes;

        let mut chunk_trace = Vec::new();
        let mut synthesis = Vec::new();
        let mut final_answer = String::new();
        let mut converged = false;
        let mut error = None;

        info!(chunks = chunks.len(), "Starting Minions run");

        for pass in 0..max_passes {
            if pass > 0 {
                debug!(pass, chunk_size = plan.chunk_size, overlap = plan.overlap, "Re-chunking");
                chunks = match self.chunker.chunk(context, Some(&plan)) {
                    Ok(chunks) => chunks,
                    Err(e) => {
                        error = Some(e);
                        break;
                    }
                };
            }

            let results = self.map(pass, task, &chunks, &budget, &accumulator).await;
            let skipped = results.iter().find_map(|c| match &c.partial {
                PartialAnswer::Skipped { reason } => Some(reason.clone()),
                _ => None,
            });
            let partials: Vec<(usize, String)> = results
                .iter()
                .filter_map(|c| c.partial.answer().map(|a| (c.chunk_id, a.to_string())))
                .collect();
            debug!(
                pass,
                chunks = results.len(),
                relevant = partials.len(),
                "Map phase complete"
            );
            chunk_trace.extend(results);

            if let Some(reason) = skipped {
                error = Some(Error::Cancelled { reason });
                break;
            }

            let next_plan = plan.shrink(self.config.min_chunk_size);
            let can_repeat = pass + 1 < max_passes && next_plan.is_some();
            if next_plan.is_none() && pass + 1 < max_passes {
                debug!(
                    pass,
                    chunk_size = plan.chunk_size,
                    min_chunk_size = self.config.min_chunk_size,
                    "Chunk size at its floor, no further passes"
                );
            }

            if partials.is_empty() {
                match next_plan {
                    Some(next) if can_repeat => {
                        plan = next;
                        continue;
                    }
                    _ => {
                        error = Some(ProtocolError::NoUsablePartials { passes: pass + 1 }.into());
                        break;
                    }
                }
            }

            let refs: Vec<(usize, &str)> =
                partials.iter().map(|(id, a)| (*id, a.as_str())).collect();
            let messages = [
                Message::system(self.prompts.synthesis.clone()),
                Message::user(build_synthesis_prompt(task, &refs, pass)),
            ];
            let report = call_with_retry(
                &self.remote,
                &messages,
                &self.config.remote_options,
                &self.config.retry,
                &budget,
                &accumulator,
            )
            .await;
            let output = match report.result {
                Ok(result) => result.first().to_string(),
                Err(e) => {
                    error = Some(e);
                    break;
                }
            };

            let signal = detect_signal(&output);
            debug!(pass, ?signal, "Synthesis signal");
            converged = signal == Signal::Complete;
            final_answer = extract_answer(&output);
            let retry_pass = signal == Signal::Insufficient && can_repeat;

            let round = Round {
                index: pass,
                speaker: Speaker::Remote,
                message: Message::assistant(output),
                usage: report.usage,
                is_final: !retry_pass,
            };
            synthesis.push(round);
            if let (Some(observer), Some(round)) = (&self.observer, synthesis.last())
                && let Err(e) = observer.on_round(round.speaker, &round.message, round.is_final)
            {
                error = Some(e.into());
                break;
            }

            match next_plan {
                Some(next) if retry_pass => plan = next,
                _ => break,
            }
        }

        let outcome = ProtocolOutcome {
            final_answer,
            rounds_used: synthesis.len(),
            trace: Trace::Chunks {
                chunks: chunk_trace,
                synthesis,
            },
            total_usage: accumulator.total(),
            converged,
            error,
        };

        info!(
            status = %outcome.status(),
            passes = outcome.rounds_used,
            total_tokens = outcome.total_usage.total_tokens(),
            "Minions run finished"
        );

        Ok(outcome)
    }

    /// Runs the map step over every chunk and waits for all of them.
    async fn map(
        &self,
        pass: usize,
        task: &str,
        chunks: &[Chunk],
        budget: &BudgetGuard,
        accumulator: &UsageAccumulator,
    ) -> Vec<ChunkOutcome> {
        let count = chunks.len();
        let mut results: Vec<ChunkOutcome> = stream::iter(chunks)
            .map(|chunk| self.map_chunk(pass, task, chunk, count, budget, accumulator))
            .buffer_unordered(self.config.max_concurrency)
            .collect()
            .await;
        results.sort_by_key(|c| c.chunk_id);
        results
    }

    async fn map_chunk(
        &self,
        pass: usize,
        task: &str,
        chunk: &Chunk,
        count: usize,
        budget: &BudgetGuard,
        accumulator: &UsageAccumulator,
    ) -> ChunkOutcome {
        let messages = [
            Message::system(self.prompts.map.clone()),
            Message::user(build_map_prompt(task, chunk, count)),
        ];
        let report = call_with_retry(
            &self.local,
            &messages,
            &self.config.local_options,
            &self.config.retry,
            budget,
            accumulator,
        )
        .await;

        let partial = match report.result {
            Ok(result) => match parse_partial(result.first()) {
                Some(answer) => PartialAnswer::Relevant { answer },
                None => PartialAnswer::NotRelevant,
            },
            Err(Error::Cancelled { reason }) => PartialAnswer::Skipped { reason },
            Err(e) => {
                warn!(pass, chunk = chunk.id, error = %e, "Chunk failed, treating as not relevant");
                PartialAnswer::Failed {
                    reason: e.to_string(),
                }
            }
        };

        ChunkOutcome {
            pass,
            chunk_id: chunk.id,
            byte_range: chunk.byte_range.clone(),
            partial,
            usage: report.usage,
            attempts: report.attempts,
        }
    }
}
