//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::chunking::{DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};
use crate::protocol::{
    DEFAULT_MAX_CONCURRENCY, DEFAULT_MAX_ROUNDS, DEFAULT_MAX_SYNTHESIS_PASSES,
    DEFAULT_MIN_CHUNK_SIZE,
};

/// minions-rs: local/remote model collaboration over long context.
///
/// Runs the Minion (supervisor/worker dialogue) and Minions (chunk, map,
/// synthesize) protocols against two backend commands.
#[derive(Parser, Debug)]
#[command(name = "minions-rs")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable debug logging on stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// Directory with prompt templates.
    #[arg(long, env = "MINIONS_PROMPT_DIR", global = true)]
    pub prompt_dir: Option<PathBuf>,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Backend commands and call limits shared by both protocols.
#[derive(Args, Debug, Clone)]
pub struct BackendArgs {
    /// Command line of the local backend.
    #[arg(long, env = "MINIONS_LOCAL_CMD")]
    pub local_cmd: String,

    /// Command line of the remote backend.
    #[arg(long, env = "MINIONS_REMOTE_CMD")]
    pub remote_cmd: String,

    /// Model name passed to the local backend.
    #[arg(long, default_value = "local")]
    pub local_model: String,

    /// Model name passed to the remote backend.
    #[arg(long, default_value = "remote")]
    pub remote_model: String,

    /// Per-call timeout in seconds.
    #[arg(long)]
    pub call_timeout: Option<u64>,

    /// Attempts per call, the first one included.
    #[arg(long, default_value = "3")]
    pub max_attempts: u32,

    /// Wall-clock budget for the whole run in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Maximum capability calls for the whole run.
    #[arg(long)]
    pub max_calls: Option<usize>,

    /// Write the full outcome (trace included) as JSON to this file.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show how a context file would be chunked.
    Chunk {
        /// Path to the context file (`-` for stdin).
        file: PathBuf,

        /// Chunk size in bytes (~1k tokens at 4 chars/token).
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Overlap between chunks in bytes.
        #[arg(long, default_value_t = DEFAULT_OVERLAP)]
        overlap: usize,

        /// Show a preview of each chunk.
        #[arg(short, long)]
        preview: bool,
    },

    /// Run the Minion protocol: the remote questions a local worker.
    Minion {
        /// The task to solve.
        task: String,

        /// Path to the context file (`-` for stdin).
        #[arg(short, long)]
        context: PathBuf,

        /// Maximum local/remote rounds.
        #[arg(long, default_value_t = DEFAULT_MAX_ROUNDS)]
        max_rounds: usize,

        /// Context bytes shown to the local worker.
        #[arg(long)]
        max_context_bytes: Option<usize>,

        /// Backend settings.
        #[command(flatten)]
        backends: BackendArgs,
    },

    /// Run the Minions protocol: chunk, map locally, synthesize remotely.
    Minions {
        /// The task to solve.
        task: String,

        /// Path to the context file (`-` for stdin).
        #[arg(short, long)]
        context: PathBuf,

        /// Chunk size in bytes.
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Overlap between chunks in bytes.
        #[arg(long, default_value_t = DEFAULT_OVERLAP)]
        overlap: usize,

        /// Maximum map/synthesize passes.
        #[arg(long, default_value_t = DEFAULT_MAX_SYNTHESIS_PASSES)]
        max_passes: usize,

        /// Maximum concurrent local calls.
        #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENCY)]
        concurrency: usize,

        /// Smallest chunk size used when re-chunking.
        #[arg(long, default_value_t = DEFAULT_MIN_CHUNK_SIZE)]
        min_chunk_size: usize,

        /// Backend settings.
        #[command(flatten)]
        backends: BackendArgs,
    },

    /// Manage prompt templates.
    Prompts {
        /// Prompt subcommand.
        #[command(subcommand)]
        command: PromptCommands,
    },
}

/// Prompt template subcommands.
#[derive(Subcommand, Debug)]
pub enum PromptCommands {
    /// Write the default templates (existing files are kept).
    Init {
        /// Target directory (defaults to `--prompt-dir` or `~/.config/minions-rs/prompts`).
        dir: Option<PathBuf>,
    },
}
