//! The Minion protocol: iterative local/remote refinement.
//!
//! The local worker sees the whole context; the remote supervisor sees only
//! the worker's reports. Each round is one local turn followed by one remote
//! turn. The run ends when the supervisor signals a final answer or the
//! round budget is spent.
//!
//! ```text
//! Init -> LocalTurn -> RemoteTurn -> Decision -> { LocalTurn | Done | Failed }
//! ```

use std::fmt;

use tracing::{debug, info, instrument};

use crate::client::{ChatOptions, Client};
use crate::core::chunk::floor_char_boundary;
use crate::core::{Message, UsageAccumulator};
use crate::error::{Error, ProtocolError, Result};

use super::budget::{Budget, BudgetGuard};
use super::observer::RoundObserver;
use super::outcome::{ProtocolOutcome, Round, Speaker, Trace};
use super::prompt::{
    PromptSet, build_supervisor_task, build_worker_report, build_worker_system, build_worker_task,
};
use super::retry::{RetryPolicy, call_with_retry};
use super::signal::{Signal, detect_signal, extract_answer, extract_follow_up};

/// Default number of local/remote rounds.
pub const DEFAULT_MAX_ROUNDS: usize = 3;

/// Configuration for a Minion run.
#[derive(Debug, Clone)]
pub struct MinionConfig {
    /// Maximum completed local/remote rounds. Must be at least 1.
    pub max_rounds: usize,
    /// Context bytes shown to the local worker; `None` shows everything.
    pub max_context_bytes: Option<usize>,
    /// Options for local calls.
    pub local_options: ChatOptions,
    /// Options for remote calls.
    pub remote_options: ChatOptions,
    /// Retry policy for both sides.
    pub retry: RetryPolicy,
    /// Time, call and cancellation limits.
    pub budget: Budget,
}

impl Default for MinionConfig {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            max_context_bytes: None,
            local_options: ChatOptions::default(),
            remote_options: ChatOptions::default().json_response(true),
            retry: RetryPolicy::default(),
            budget: Budget::default(),
        }
    }
}

impl MinionConfig {
    /// Sets the round budget.
    #[must_use]
    pub const fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Limits the context shown to the local worker.
    #[must_use]
    pub const fn with_max_context_bytes(mut self, max_context_bytes: usize) -> Self {
        self.max_context_bytes = Some(max_context_bytes);
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

    /// Rejects configurations that cannot run.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidConfig`] if `max_rounds` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_rounds == 0 {
            return Err(ProtocolError::InvalidConfig {
                reason: "max_rounds must be at least 1".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// States of a Minion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinionState {
    /// Seeding both conversations.
    Init,
    /// Waiting on the local worker.
    LocalTurn,
    /// Waiting on the remote supervisor.
    RemoteTurn,
    /// Reading the supervisor's signal.
    Decision,
    /// Finished with an answer.
    Done,
    /// Stopped by an error.
    Failed,
}

impl fmt::Display for MinionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::LocalTurn => "local_turn",
            Self::RemoteTurn => "remote_turn",
            Self::Decision => "decision",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A local/remote pair running the Minion protocol.
///
/// # Examples
///
/// ```no_run
/// use minions_rs::client::CommandClient;
/// use minions_rs::protocol::{Minion, MinionConfig};
///
/// # async fn demo() -> minions_rs::Result<()> {
/// let local = CommandClient::new("./local-backend", vec![], "llama3.2");
/// let remote = CommandClient::new("./remote-backend", vec![], "gpt-4o");
/// let minion = Minion::new(local, remote).with_config(MinionConfig::default().with_max_rounds(2));
///
/// let outcome = minion.run("What dose was prescribed?", "...long record...").await?;
/// println!("{} ({})", outcome.final_answer, outcome.status());
/// # Ok(())
/// # }
/// ```
pub struct Minion<L, R> {
    local: L,
    remote: R,
    prompts: PromptSet,
    config: MinionConfig,
    observer: Option<Box<dyn RoundObserver>>,
}

impl<L: Client, R: Client> Minion<L, R> {
    /// Creates a run with default prompts and configuration.
    pub fn new(local: L, remote: R) -> Self {
        Self {
            local,
            remote,
            prompts: PromptSet::defaults(),
            config: MinionConfig::default(),
            observer: None,
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: MinionConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the prompts.
    #[must_use]
    pub fn with_prompts(mut self, prompts: PromptSet) -> Self {
        self.prompts = prompts;
        self
    }

    /// Installs a round observer.
    #[must_use]
    pub fn with_observer(mut self, observer: impl RoundObserver + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Installs an already boxed observer, or removes it.
    #[must_use]
    pub fn with_boxed_observer(mut self, observer: Option<Box<dyn RoundObserver>>) -> Self {
        self.observer = observer;
        self
    }

    /// The active configuration.
    pub const fn config(&self) -> &MinionConfig {
        &self.config
    }

    /// Runs the protocol on `task` over `context`.
    ///
    /// # Errors
    ///
    /// Returns `Err` only for an invalid configuration, before any call is
    /// made. Failures during the run are reported in the outcome.
    #[instrument(skip_all, fields(
        local = self.local.model_name(),
        remote = self.remote.model_name(),
        context_bytes = context.len(),
        max_rounds = self.config.max_rounds,
    ))]
    pub async fn run(&self, task: &str, context: &str) -> Result<ProtocolOutcome> {
        self.config.validate()?;

        let accumulator = UsageAccumulator::new();
        let budget = self.config.budget.start();
        let mut session = Session::default();
        let mut state = MinionState::Init;

        info!("Starting Minion run");

        loop {
            debug!(%state, rounds_used = session.rounds_used, "Minion transition");
            state = match state {
                MinionState::Init => {
                    self.seed(&mut session, task, context);
                    MinionState::LocalTurn
                }
                MinionState::LocalTurn => {
                    self.local_turn(&mut session, &budget, &accumulator).await
                }
                MinionState::RemoteTurn => {
                    self.remote_turn(&mut session, &budget, &accumulator).await
                }
                MinionState::Decision => {
                    if session.converged || session.rounds_used >= self.config.max_rounds {
                        MinionState::Done
                    } else {
                        let follow_up = extract_follow_up(&session.last_remote);
                        session.local.push(Message::user(follow_up));
                        MinionState::LocalTurn
                    }
                }
                MinionState::Done | MinionState::Failed => break,
            };
        }

        let final_answer = if state == MinionState::Done && session.converged {
            extract_answer(&session.last_remote)
        } else {
            session.last_remote.trim().to_string()
        };

        let outcome = ProtocolOutcome {
            final_answer,
            trace: Trace::Rounds {
                rounds: session.rounds,
            },
            total_usage: accumulator.total(),
            rounds_used: session.rounds_used,
            converged: session.converged,
            error: session.error,
        };

        info!(
            status = %outcome.status(),
            rounds_used = outcome.rounds_used,
            total_tokens = outcome.total_usage.total_tokens(),
            "Minion run finished"
        );

        Ok(outcome)
    }

    fn seed(&self, session: &mut Session, task: &str, context: &str) {
        let shown = match self.config.max_context_bytes {
            Some(max) if context.len() > max => &context[..floor_char_boundary(context, max)],
            _ => context,
        };
        if shown.len() < context.len() {
            debug!(
                shown = shown.len(),
                total = context.len(),
                "Context truncated for local worker"
            );
        }

        session.local = vec![
            Message::system(build_worker_system(&self.prompts.worker, shown, context.len())),
            Message::user(build_worker_task(task)),
        ];
        session.remote = vec![Message::system(format!(
            "{}\n\n{}",
            self.prompts.supervisor,
            build_supervisor_task(task, context.len())
        ))];
    }

    async fn local_turn(
        &self,
        session: &mut Session,
        budget: &BudgetGuard,
        accumulator: &UsageAccumulator,
    ) -> MinionState {
        let report = call_with_retry(
            &self.local,
            &session.local,
            &self.config.local_options,
            &self.config.retry,
            budget,
            accumulator,
        )
        .await;

        let result = match report.result {
            Ok(result) => result,
            Err(e) => return session.fail(e),
        };

        let output = result.first().to_string();
        session
            .remote
            .push(Message::user(build_worker_report(session.rounds_used, &output)));
        let message = Message::assistant(output);
        session.local.push(message.clone());

        let round = Round {
            index: session.rounds_used,
            speaker: Speaker::Local,
            message,
            usage: report.usage,
            is_final: false,
        };
        match self.record(session, round) {
            Ok(()) => MinionState::RemoteTurn,
            Err(e) => session.fail(e),
        }
    }

    async fn remote_turn(
        &self,
        session: &mut Session,
        budget: &BudgetGuard,
        accumulator: &UsageAccumulator,
    ) -> MinionState {
        let report = call_with_retry(
            &self.remote,
            &session.remote,
            &self.config.remote_options,
            &self.config.retry,
            budget,
            accumulator,
        )
        .await;

        let result = match report.result {
            Ok(result) => result,
            Err(e) => return session.fail(e),
        };

        session.last_remote = result.first().to_string();
        let signal = detect_signal(&session.last_remote);
        debug!(?signal, round = session.rounds_used, "Remote signal");

        let index = session.rounds_used;
        session.rounds_used += 1;
        session.converged = signal == Signal::Complete;

        let message = Message::assistant(session.last_remote.clone());
        session.remote.push(message.clone());

        let round = Round {
            index,
            speaker: Speaker::Remote,
            message,
            usage: report.usage,
            is_final: session.converged || session.rounds_used >= self.config.max_rounds,
        };
        match self.record(session, round) {
            Ok(()) => MinionState::Decision,
            Err(e) => session.fail(e),
        }
    }

    fn record(&self, session: &mut Session, round: Round) -> Result<()> {
        session.rounds.push(round);
        if let (Some(observer), Some(round)) = (&self.observer, session.rounds.last()) {
            observer.on_round(round.speaker, &round.message, round.is_final)?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct Session {
    local: Vec<Message>,
    remote: Vec<Message>,
    rounds: Vec<Round>,
    rounds_used: usize,
    last_remote: String,
    converged: bool,
    error: Option<Error>,
}

impl Session {
    fn fail(&mut self, error: Error) -> MinionState {
        debug!(%error, "Minion run failed");
        self.error = Some(error);
        MinionState::Failed
    }
}
