//! Error types for RepoViz.
//!
//! Library crates use [`RepoVizError`] via `thiserror`.
//! App crates (cli/server) wrap this with `color-eyre` or map it to HTTP statuses.

use std::path::PathBuf;

/// Top-level error type for all RepoViz operations.
#[derive(Debug, thiserror::Error)]
pub enum RepoVizError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while talking to GitHub.
    #[error("network error: {0}")]
    Network(String),

    /// The caller has used up its request allowance for the current window.
    #[error("rate limit exceeded for {identity}; retry in {retry_after_secs}s")]
    QuotaExceeded {
        identity: String,
        retry_after_secs: u64,
    },

    /// Request payload missing or malformed.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// A model call returned no usable content, or the provider call failed.
    #[error("upstream generation error: {0}")]
    UpstreamGeneration(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RepoVizError>;

impl RepoVizError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an invalid-input error from any displayable message.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    /// Create an upstream generation error from any displayable message.
    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::UpstreamGeneration(msg.into())
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error is a quota rejection rather than a failure.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}
