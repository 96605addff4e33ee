//! Output formatting for CLI commands.
//!
//! Supports text and JSON output formats.

use crate::chunking::ChunkPlan;
use crate::core::Chunk;
use crate::error::Error;
use crate::protocol::{PartialAnswer, ProtocolOutcome, RunStatus, Trace};
use serde::Serialize;
use std::fmt::Write;
use std::path::{Path, PathBuf};

/// Characters shown in chunk and round previews.
const PREVIEW_LEN: usize = 60;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output.
    Json,
}

impl OutputFormat {
    /// Parses format from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

#[derive(Serialize)]
struct ChunkRow<'a> {
    id: usize,
    start: usize,
    end: usize,
    bytes: usize,
    overlap_len: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    preview: Option<&'a str>,
}

#[derive(Serialize)]
struct ChunkReport<'a> {
    context_bytes: usize,
    chunk_size: usize,
    overlap: usize,
    chunks: Vec<ChunkRow<'a>>,
}

/// Formats a chunk plan applied to a context.
#[must_use]
pub fn format_chunks(
    chunks: &[Chunk],
    plan: &ChunkPlan,
    context_bytes: usize,
    preview: bool,
    format: OutputFormat,
) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            let _ = writeln!(
                output,
                "{} chunks (size {}, overlap {}) over {context_bytes} bytes:",
                chunks.len(),
                plan.chunk_size,
                plan.overlap
            );
            for chunk in chunks {
                let _ = write!(
                    output,
                    "  [{}] {}..{} ({} bytes, overlap {})",
                    chunk.id,
                    chunk.start(),
                    chunk.end(),
                    chunk.size(),
                    chunk.overlap_len
                );
                if preview {
                    let _ = write!(output, "  {:?}", chunk.preview(PREVIEW_LEN));
                }
                output.push('\n');
            }
            output
        }
        OutputFormat::Json => format_json(&ChunkReport {
            context_bytes,
            chunk_size: plan.chunk_size,
            overlap: plan.overlap,
            chunks: chunks
                .iter()
                .map(|c| ChunkRow {
                    id: c.id,
                    start: c.start(),
                    end: c.end(),
                    bytes: c.size(),
                    overlap_len: c.overlap_len,
                    preview: preview.then(|| c.preview(PREVIEW_LEN)),
                })
                .collect(),
        }),
    }
}

#[derive(Serialize)]
struct OutcomeReport<'a> {
    status: RunStatus,
    #[serde(flatten)]
    outcome: &'a ProtocolOutcome,
}

/// Formats a protocol outcome.
#[must_use]
pub fn format_outcome(outcome: &ProtocolOutcome, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format_outcome_text(outcome),
        OutputFormat::Json => format_outcome_json(outcome),
    }
}

/// Serializes a protocol outcome with its status.
#[must_use]
pub fn format_outcome_json(outcome: &ProtocolOutcome) -> String {
    format_json(&OutcomeReport {
        status: outcome.status(),
        outcome,
    })
}

fn format_outcome_text(outcome: &ProtocolOutcome) -> String {
    let mut output = String::new();

    if !outcome.final_answer.is_empty() {
        let _ = writeln!(output, "{}\n", outcome.final_answer);
    }

    let _ = writeln!(output, "Status:   {}", outcome.status());
    let _ = writeln!(output, "Rounds:   {}", outcome.rounds_used);
    let _ = writeln!(
        output,
        "Tokens:   {} (prompt {}, completion {})",
        outcome.total_usage.total_tokens(),
        outcome.total_usage.prompt_tokens,
        outcome.total_usage.completion_tokens
    );
    if let Some(error) = &outcome.error {
        let _ = writeln!(output, "Error:    {error}");
    }

    if let Trace::Chunks { chunks, .. } = &outcome.trace {
        let relevant = chunks.iter().filter(|c| c.partial.answer().is_some()).count();
        let failed = chunks
            .iter()
            .filter(|c| matches!(c.partial, PartialAnswer::Failed { .. }))
            .count();
        let _ = writeln!(
            output,
            "Chunks:   {} processed, {relevant} relevant, {failed} failed",
            chunks.len()
        );
    }

    output.push_str("\nTrace:\n");
    for round in outcome.trace.rounds() {
        let _ = writeln!(
            output,
            "  [{}] {:<6} {:>6} tok{}  {}",
            round.index,
            round.speaker,
            round.usage.total_tokens(),
            if round.is_final { " final" } else { "      " },
            truncate(&round.message.content.replace('\n', " "), PREVIEW_LEN)
        );
    }

    output
}

/// Formats the result of writing prompt templates.
#[must_use]
pub fn format_prompts_written(dir: &Path, written: &[PathBuf], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            if written.is_empty() {
                let _ = writeln!(output, "All prompt templates already exist in {}", dir.display());
            } else {
                let _ = writeln!(output, "Wrote {} templates to {}:", written.len(), dir.display());
                for path in written {
                    let _ = writeln!(output, "  {}", path.display());
                }
            }
            output
        }
        OutputFormat::Json => format_json(&serde_json::json!({
            "dir": dir,
            "written": written,
        })),
    }
}

/// Formats an error for display.
#[must_use]
pub fn format_error(error: &Error, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => error.to_string(),
        OutputFormat::Json => format_json(&serde_json::json!({ "error": error.to_string() })),
    }
}

/// Formats a value as JSON.
fn format_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

/// Truncates a string to max characters with ellipsis.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{head}...")
    }
}
