//! System prompts and message builders for both protocols.
//!
//! The worker and supervisor prompts drive the Minion dialogue; the map and
//! synthesis prompts drive the Minions pipeline. Builders format the user
//! messages around the task, context, and partial answers.

use std::fmt::Write;
use std::path::{Path, PathBuf};

use crate::core::Chunk;

use super::signal::NOT_RELEVANT_MARKER;

/// System prompt for the local worker in a Minion session.
pub const WORKER_SYSTEM_PROMPT: &str = r"You are a careful assistant with full access to a long document. A supervisor who cannot see the document will ask you questions about it.

## Instructions

1. Answer only from the document below. Quote exact passages, figures, and names where they help.
2. If the document does not contain what is asked, say so plainly. Do not guess.
3. Keep answers short and factual. The supervisor will ask follow-up questions if needed.";

/// System prompt for the remote supervisor in a Minion session.
pub const SUPERVISOR_SYSTEM_PROMPT: &str = r#"You are the supervisor in a two-model collaboration. You cannot see the document. A worker model that can see it answers your questions, and its replies are sent to you as worker reports.

## Instructions

1. Decide whether the reports so far answer the task.
2. If they do, give the final answer.
3. If they do not, ask the worker one specific, self-contained question that would close the gap.

## Output Schema

Return a single JSON object:

{"decision": "provide_final_answer", "answer": "<final answer>"}

or

{"decision": "request_additional_info", "message": "<question for the worker>"}

Output ONLY the JSON object, no markdown or extra text."#;

/// System prompt for a local chunk worker in a Minions session.
pub const MAP_SYSTEM_PROMPT: &str = r#"You are one of several parallel extractors, each given a different section of a long document. A synthesizer will combine your report with the others.

## Instructions

1. Read the section in full.
2. Extract everything in the section that helps answer the task, citing exact evidence.
3. Do not use knowledge from outside the section.

## Output Schema

Return a single JSON object:

{"relevant": true, "answer": "<evidence and partial answer>"}

If the section contains nothing relevant to the task, return exactly:

NOT_RELEVANT"#;

/// System prompt for the remote synthesizer in a Minions session.
pub const SYNTHESIS_SYSTEM_PROMPT: &str = r#"You combine partial answers extracted from sections of a long document into one answer. Sections are numbered in document order.

## Instructions

1. Use only the partial answers given. Later sections may refine or contradict earlier ones; prefer the more specific evidence.
2. If the partial answers settle the task, give the final answer.
3. If they do not contain enough to answer, say so with the insufficient_information decision. The document may be re-read in finer sections.

## Output Schema

Return a single JSON object:

{"decision": "provide_final_answer", "answer": "<final answer>"}

or

{"decision": "insufficient_information", "answer": "<best partial answer, or null>"}

Output ONLY the JSON object, no markdown or extra text."#;

/// Default prompt directory under user config.
const DEFAULT_PROMPT_DIR: &str = ".config/minions-rs/prompts";

/// Environment variable naming a prompt directory.
pub const PROMPT_DIR_ENV: &str = "MINIONS_PROMPT_DIR";

/// Filename for the worker prompt template.
const WORKER_FILENAME: &str = "worker.md";
/// Filename for the supervisor prompt template.
const SUPERVISOR_FILENAME: &str = "supervisor.md";
/// Filename for the map prompt template.
const MAP_FILENAME: &str = "map.md";
/// Filename for the synthesis prompt template.
const SYNTHESIS_FILENAME: &str = "synthesis.md";

/// A set of system prompts for both protocols.
///
/// Loaded from external template files when available, falling back to
/// compiled-in defaults. Use [`PromptSet::load`] to resolve the prompt
/// directory from CLI flags, environment variables, or the default path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    /// System prompt for the local worker (Minion).
    pub worker: String,
    /// System prompt for the remote supervisor (Minion).
    pub supervisor: String,
    /// System prompt for chunk workers (Minions map phase).
    pub map: String,
    /// System prompt for the synthesizer (Minions synthesize phase).
    pub synthesis: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self::defaults()
    }
}

impl PromptSet {
    /// Loads prompts from the given directory, falling back to compiled-in defaults.
    ///
    /// Resolution order for `prompt_dir`:
    /// 1. Explicit `prompt_dir` argument (from `--prompt-dir` CLI flag)
    /// 2. `MINIONS_PROMPT_DIR` environment variable
    /// 3. `~/.config/minions-rs/prompts/`
    ///
    /// Each file is loaded independently; a missing file uses its default.
    #[must_use]
    pub fn load(prompt_dir: Option<&Path>) -> Self {
        let resolved_dir = prompt_dir
            .map(PathBuf::from)
            .or_else(|| std::env::var(PROMPT_DIR_ENV).ok().map(PathBuf::from))
            .or_else(Self::default_dir);

        let load_file = |filename: &str, default: &str| -> String {
            resolved_dir
                .as_ref()
                .map(|dir| dir.join(filename))
                .and_then(|path| std::fs::read_to_string(&path).ok())
                .filter(|content| !content.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            worker: load_file(WORKER_FILENAME, WORKER_SYSTEM_PROMPT),
            supervisor: load_file(SUPERVISOR_FILENAME, SUPERVISOR_SYSTEM_PROMPT),
            map: load_file(MAP_FILENAME, MAP_SYSTEM_PROMPT),
            synthesis: load_file(SYNTHESIS_FILENAME, SYNTHESIS_SYSTEM_PROMPT),
        }
    }

    /// Returns compiled-in defaults without checking the filesystem.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            worker: WORKER_SYSTEM_PROMPT.to_string(),
            supervisor: SUPERVISOR_SYSTEM_PROMPT.to_string(),
            map: MAP_SYSTEM_PROMPT.to_string(),
            synthesis: SYNTHESIS_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Writes the compiled-in default prompts to the given directory.
    ///
    /// Creates the directory if it does not exist. Existing files are
    /// **not** overwritten.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if directory creation or file writing fails.
    pub fn write_defaults(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;

        let templates = [
            (WORKER_FILENAME, WORKER_SYSTEM_PROMPT),
            (SUPERVISOR_FILENAME, SUPERVISOR_SYSTEM_PROMPT),
            (MAP_FILENAME, MAP_SYSTEM_PROMPT),
            (SYNTHESIS_FILENAME, SYNTHESIS_SYSTEM_PROMPT),
        ];

        let mut written = Vec::new();
        for (filename, content) in &templates {
            let path = dir.join(filename);
            if !path.exists() {
                std::fs::write(&path, content)?;
                written.push(path);
            }
        }

        Ok(written)
    }

    /// Returns the default prompt directory under the user's home.
    ///
    /// Returns `None` if the home directory cannot be determined.
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(DEFAULT_PROMPT_DIR))
    }
}

/// Builds the local worker's system message: prompt plus document.
///
/// `shown` is the prefix of the context actually included; when it is
/// shorter than `total_bytes` a note tells the worker the document is cut.
#[must_use]
pub fn build_worker_system(prompt: &str, shown: &str, total_bytes: usize) -> String {
    let mut message = format!("{prompt}\n\n<document>\n{shown}\n</document>");
    if shown.len() < total_bytes {
        let _ = write!(
            message,
            "\n\n<note>The document was truncated: showing the first {} of {total_bytes} bytes.</note>",
            shown.len()
        );
    }
    message
}

/// Builds the user message that gives the worker its task.
#[must_use]
pub fn build_worker_task(task: &str) -> String {
    format!("<task>{task}</task>\n\nThe supervisor will ask you about this task. Start by reporting what the document says about it.")
}

/// Builds the supervisor's opening user message.
#[must_use]
pub fn build_supervisor_task(task: &str, context_bytes: usize) -> String {
    format!(
        "<task>{task}</task>\n\n\
         <metadata>\n\
         - Document size: {context_bytes} bytes (visible to the worker only)\n\
         </metadata>\n\n\
         Worker reports follow."
    )
}

/// Wraps a local turn's output for the supervisor's conversation.
#[must_use]
pub fn build_worker_report(round: usize, report: &str) -> String {
    format!("<worker_report round=\"{round}\">\n{report}\n</worker_report>")
}

/// Builds the user message for one chunk worker.
#[must_use]
pub fn build_map_prompt(task: &str, chunk: &Chunk, chunk_count: usize) -> String {
    format!(
        "<task>{task}</task>\n\n\
         <section id=\"{id}\" of=\"{chunk_count}\" bytes=\"{start}-{end}\">\n{text}\n</section>\n\n\
         Reply {NOT_RELEVANT_MARKER} if this section has nothing for the task.",
        id = chunk.id,
        start = chunk.start(),
        end = chunk.end(),
        text = chunk.text,
    )
}

/// Builds the synthesizer's user message from partial answers in chunk-id order.
#[must_use]
pub fn build_synthesis_prompt(task: &str, partials: &[(usize, &str)], pass: usize) -> String {
    let mut prompt = format!("<task>{task}</task>\n\n<partial_answers pass=\"{pass}\">\n");

    for (chunk_id, answer) in partials {
        let _ = write!(
            prompt,
            "<partial section=\"{chunk_id}\">\n{answer}\n</partial>\n"
        );
    }
    prompt.push_str("</partial_answers>");

    prompt
}
