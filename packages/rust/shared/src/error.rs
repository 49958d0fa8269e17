//! Error types for kbanswer.
//!
//! Library crates use [`KbAnswerError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all kbanswer operations.
#[derive(Debug, thiserror::Error)]
pub enum KbAnswerError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to the search API or the language model.
    #[error("network error: {0}")]
    Network(String),

    /// Response body or file content could not be decoded.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Lookup table error (unknown source id, unreadable table).
    #[error("lookup error: {0}")]
    Lookup(String),

    /// Language model error (API rejection, empty completion).
    #[error("llm error: {0}")]
    Llm(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input validation error (empty query, malformed reference, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, KbAnswerError>;

impl KbAnswerError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
