//! CLI layer for minions-rs.
//!
//! Provides the command-line interface using clap, with commands for
//! inspecting chunk plans, running both protocols against backend
//! commands, and managing prompt templates.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::{CommandOutput, execute};
pub use output::OutputFormat;
pub use parser::{BackendArgs, Cli, Commands, PromptCommands};
