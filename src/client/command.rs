//! Subprocess-backed client.
//!
//! Runs an external command once per call. The request is written to the
//! child's stdin as JSON:
//!
//! ```json
//! {"model": "...", "messages": [{"role": "user", "content": "..."}], "options": {...}}
//! ```
//!
//! and the child must print a [`CallResult`] as JSON on stdout:
//!
//! ```json
//! {"responses": ["..."], "usage": {"prompt_tokens": 12, "completion_tokens": 3}, "finish_reasons": ["stop"]}
//! ```
//!
//! `usage` and `finish_reasons` may be omitted; they default to zero usage
//! and `"stop"` per response.

use super::{CallResult, ChatOptions, Client};
use crate::core::Message;
use crate::error::ClientError;
use async_trait::async_trait;
use serde::Serialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Maximum stderr bytes quoted in an error.
const STDERR_EXCERPT: usize = 500;

#[derive(Serialize)]
struct CommandRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    options: &'a ChatOptions,
}

/// A [`Client`] that delegates each call to an external process.
///
/// # Examples
///
/// ```
/// use minions_rs::client::{Client, CommandClient};
///
/// let client = CommandClient::from_command_line("python3 backend.py --fast", "llama3.2").unwrap();
/// assert_eq!(client.model_name(), "llama3.2");
/// ```
#[derive(Debug, Clone)]
pub struct CommandClient {
    program: String,
    args: Vec<String>,
    model: String,
    timeout: Option<Duration>,
}

impl CommandClient {
    /// Creates a client for `program args...`.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>, model: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args,
            model: model.into(),
            timeout: None,
        }
    }

    /// Creates a client from a whitespace-separated command line.
    ///
    /// Returns `None` for a blank command line. Quoting is not interpreted.
    #[must_use]
    pub fn from_command_line(command_line: &str, model: impl Into<String>) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect(), model))
    }

    /// Kills the child and fails the call (retryably) after `timeout`.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn run(&self, payload: Vec<u8>) -> Result<CallResult, ClientError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ClientError::fatal(format!("failed to spawn {}: {e}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .await
                .map_err(|e| ClientError::retryable(format!("failed to write request: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ClientError::retryable(format!("failed to wait for backend: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let excerpt: String = stderr.chars().take(STDERR_EXCERPT).collect();
            return Err(ClientError::retryable(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                excerpt.trim()
            )));
        }

        let mut result: CallResult = serde_json::from_slice(&output.stdout)?;
        if result.finish_reasons.is_empty() {
            result.finish_reasons = vec!["stop".to_string(); result.responses.len()];
        }
        Ok(result)
    }
}

#[async_trait]
impl Client for CommandClient {
    async fn chat(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<CallResult, ClientError> {
        let payload = serde_json::to_vec(&CommandRequest {
            model: &self.model,
            messages,
            options,
        })
        .map_err(|e| ClientError::fatal(format!("failed to encode request: {e}")))?;

        debug!(program = %self.program, messages = messages.len(), "Invoking backend command");

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.run(payload))
                .await
                .map_err(|_| ClientError::retryable(format!("backend timed out after {limit:?}")))?,
            None => self.run(payload).await,
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
