//! CLI command implementations.
//!
//! Contains the business logic for each CLI command.

use std::path::Path;
use std::time::Duration;

use crate::chunking::{ChunkPlan, Chunker, FixedChunker};
use crate::cli::output::{
    OutputFormat, format_chunks, format_outcome, format_outcome_json, format_prompts_written,
};
use crate::cli::parser::{BackendArgs, Cli, Commands, PromptCommands};
use crate::client::CommandClient;
use crate::error::{CommandError, Result};
use crate::io::{read_context, write_file};
use crate::protocol::{
    Budget, Minion, MinionConfig, Minions, MinionsConfig, PromptSet, ProtocolOutcome,
    RetryPolicy, TracingObserver,
};

/// Rendered result of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Text to print on stdout.
    pub output: String,
    /// `false` when a protocol run failed; the process exits non-zero.
    pub success: bool,
}

impl CommandOutput {
    fn ok(output: String) -> Self {
        Self {
            output,
            success: true,
        }
    }
}

/// Executes the CLI command.
///
/// # Errors
///
/// Returns an error if the command cannot start: unreadable context,
/// missing backend command, or invalid configuration. A protocol run that
/// starts and then fails is reported through [`CommandOutput::success`].
pub async fn execute(cli: &Cli) -> Result<CommandOutput> {
    let format = OutputFormat::parse(&cli.format);

    match &cli.command {
        Commands::Chunk {
            file,
            chunk_size,
            overlap,
            preview,
        } => cmd_chunk(file, *chunk_size, *overlap, *preview, format),
        Commands::Minion {
            task,
            context,
            max_rounds,
            max_context_bytes,
            backends,
        } => {
            let mut config = MinionConfig::default()
                .with_max_rounds(*max_rounds)
                .with_retry(retry_policy(backends))
                .with_budget(budget(backends));
            if let Some(bytes) = max_context_bytes {
                config = config.with_max_context_bytes(*bytes);
            }
            let (local, remote) = build_clients(backends)?;
            let context = read_context(context)?;

            let outcome = Minion::new(local, remote)
                .with_config(config)
                .with_prompts(PromptSet::load(cli.prompt_dir.as_deref()))
                .with_observer(TracingObserver)
                .run(task, &context)
                .await?;
            finish(&outcome, backends.output.as_deref(), format)
        }
        Commands::Minions {
            task,
            context,
            chunk_size,
            overlap,
            max_passes,
            concurrency,
            min_chunk_size,
            backends,
        } => {
            let config = MinionsConfig::default()
                .with_chunking(*chunk_size, *overlap)
                .with_max_synthesis_passes(*max_passes)
                .with_max_concurrency(*concurrency)
                .with_min_chunk_size(*min_chunk_size)
                .with_retry(retry_policy(backends))
                .with_budget(budget(backends));
            let (local, remote) = build_clients(backends)?;
            let context = read_context(context)?;

            let outcome = Minions::new(local, remote)
                .with_config(config)
                .with_prompts(PromptSet::load(cli.prompt_dir.as_deref()))
                .with_observer(TracingObserver)
                .run(task, &context)
                .await?;
            finish(&outcome, backends.output.as_deref(), format)
        }
        Commands::Prompts {
            command: PromptCommands::Init { dir },
        } => cmd_prompts_init(dir.as_deref().or(cli.prompt_dir.as_deref()), format),
    }
}

fn cmd_chunk(
    file: &Path,
    chunk_size: usize,
    overlap: usize,
    preview: bool,
    format: OutputFormat,
) -> Result<CommandOutput> {
    let plan = ChunkPlan::new(chunk_size, overlap);
    let context = read_context(file)?;
    let chunks = FixedChunker::from_plan(plan).chunk(&context, None)?;
    Ok(CommandOutput::ok(format_chunks(
        &chunks,
        &plan,
        context.len(),
        preview,
        format,
    )))
}

fn cmd_prompts_init(dir: Option<&Path>, format: OutputFormat) -> Result<CommandOutput> {
    let dir = match dir {
        Some(dir) => dir.to_path_buf(),
        None => PromptSet::default_dir().ok_or_else(|| {
            CommandError::MissingArgument(
                "prompt directory (no home directory found; pass DIR or --prompt-dir)".to_string(),
            )
        })?,
    };
    let written = PromptSet::write_defaults(&dir)?;
    Ok(CommandOutput::ok(format_prompts_written(
        &dir, &written, format,
    )))
}

fn build_clients(args: &BackendArgs) -> Result<(CommandClient, CommandClient)> {
    let local = build_client("--local-cmd", &args.local_cmd, &args.local_model, args)?;
    let remote = build_client("--remote-cmd", &args.remote_cmd, &args.remote_model, args)?;
    Ok((local, remote))
}

fn build_client(
    flag: &str,
    command_line: &str,
    model: &str,
    args: &BackendArgs,
) -> Result<CommandClient> {
    let client = CommandClient::from_command_line(command_line, model)
        .ok_or_else(|| CommandError::MissingArgument(format!("{flag} is empty")))?;
    Ok(match args.call_timeout {
        Some(secs) => client.with_timeout(Duration::from_secs(secs)),
        None => client,
    })
}

fn retry_policy(args: &BackendArgs) -> RetryPolicy {
    RetryPolicy::default().with_max_attempts(args.max_attempts.max(1))
}

fn budget(args: &BackendArgs) -> Budget {
    let mut budget = Budget::unlimited();
    if let Some(secs) = args.timeout {
        budget = budget.with_timeout(Duration::from_secs(secs));
    }
    if let Some(max_calls) = args.max_calls {
        budget = budget.with_max_calls(max_calls);
    }
    budget
}

fn finish(
    outcome: &ProtocolOutcome,
    output_path: Option<&Path>,
    format: OutputFormat,
) -> Result<CommandOutput> {
    if let Some(path) = output_path {
        write_file(path, &format_outcome_json(outcome))?;
    }
    Ok(CommandOutput {
        output: format_outcome(outcome, format),
        success: !outcome.is_failed(),
    })
}
