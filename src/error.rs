//! Error types for minions-rs.
//!
//! This module provides the error hierarchy using `thiserror` for chunking,
//! capability calls, round observers, protocol runs, I/O and CLI commands.

use crate::core::Usage;
use thiserror::Error;

/// Result type alias for minions-rs operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Chunking errors (misconfiguration or empty context).
    #[error("chunking error: {0}")]
    Chunking(#[from] ChunkingError),

    /// A capability call failed.
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    /// A round observer rejected a round.
    #[error("observer error: {0}")]
    Observer(#[from] ObserverError),

    /// Protocol-level failure.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O errors (file operations).
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// CLI command errors.
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// The capability does not support the requested operation.
    #[error("unsupported operation: {operation}")]
    UnsupportedOperation {
        /// Name of the operation.
        operation: String,
    },

    /// The run was cancelled or ran out of its time or call budget.
    #[error("cancelled: {reason}")]
    Cancelled {
        /// Why the run stopped.
        reason: String,
    },
}

impl Error {
    /// Returns `true` for errors raised by a round observer.
    #[must_use]
    pub const fn is_observer(&self) -> bool {
        matches!(self, Self::Observer(_))
    }
}

/// Chunking-specific errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkingError {
    /// Nothing to chunk.
    #[error("context is empty")]
    EmptyContext,

    /// Invalid chunk configuration.
    #[error("invalid chunk configuration: {reason}")]
    InvalidConfig {
        /// Reason the configuration is invalid.
        reason: String,
    },

    /// Overlap is not smaller than the chunk size.
    #[error("overlap {overlap} must be less than chunk size {size}")]
    OverlapTooLarge {
        /// Overlap size.
        overlap: usize,
        /// Chunk size.
        size: usize,
    },
}

/// Failure of a single capability call.
///
/// `usage` holds whatever the backend reports as consumed before failing,
/// so failed attempts still show up in the run totals.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{cause}{}", retry_suffix(.retryable))]
pub struct ClientError {
    /// Human-readable cause.
    pub cause: String,
    /// Whether the call may succeed if issued again.
    pub retryable: bool,
    /// Tokens consumed by the failed call.
    pub usage: Usage,
}

impl ClientError {
    /// Creates a retryable error (rate limit, timeout, transient transport failure).
    #[must_use]
    pub fn retryable(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
            retryable: true,
            usage: Usage::zero(),
        }
    }

    /// Creates a non-retryable error.
    #[must_use]
    pub fn fatal(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
            retryable: false,
            usage: Usage::zero(),
        }
    }

    /// Attaches the usage consumed by the failed call.
    #[must_use]
    pub const fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn retry_suffix(retryable: &bool) -> &'static str {
    if *retryable { " (retryable)" } else { "" }
}

/// A round observer rejected a round and aborted the run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ObserverError {
    /// Reason given by the observer.
    pub message: String,
}

impl ObserverError {
    /// Creates an observer error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Protocol-level errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Every synthesis pass ended without a single usable partial answer.
    #[error("no usable partial answers after {passes} synthesis pass(es)")]
    NoUsablePartials {
        /// Number of passes attempted.
        passes: usize,
    },

    /// Protocol configuration rejected before any call was issued.
    #[error("invalid protocol configuration: {reason}")]
    InvalidConfig {
        /// Reason the configuration is invalid.
        reason: String,
    },
}

/// I/O-specific errors for file operations.
#[derive(Error, Debug)]
pub enum IoError {
    /// File not found.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path to the file that was not found.
        path: String,
    },

    /// Failed to read file.
    #[error("failed to read file: {path}: {reason}")]
    ReadFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Memory mapping error.
    #[error("memory mapping failed: {path}: {reason}")]
    MmapFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to write file.
    #[error("failed to write file: {path}: {reason}")]
    WriteFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Generic I/O error wrapper.
    #[error("I/O error: {0}")]
    Generic(String),
}

/// CLI command-specific errors.
#[derive(Error, Debug)]
pub enum CommandError {
    /// Missing required argument.
    #[error("missing required argument: {0}")]
    MissingArgument(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(IoError::Generic(err.to_string()))
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::fatal(format!("malformed response: {err}"))
    }
}
