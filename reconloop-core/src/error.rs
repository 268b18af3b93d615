//! Error types for reconloop-core.

use crate::retry::ClassifiableError;
use thiserror::Error;

/// Result type alias using reconloop-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during reconnaissance orchestration.
///
/// Most subsystem failures (Profiler, VulnLookup, RAGMemory, Evaluator,
/// artefact writes) are *not* represented here: per spec they degrade in
/// place rather than propagate, so their failure paths return plain values
/// (`None`, empty vectors) instead of `Err`. Only the loci spec.md §7 marks
/// as fatal or structurally malformed surface as `Error`.
#[derive(Error, Debug)]
pub enum Error {
    /// The Reasoner failed after exhausting retries (P1). The only fatal
    /// subsystem loss: the mission aborts.
    #[error("reasoner failed after retries: {0}")]
    ReasonerFailed(String),

    /// A retried call was classified as non-retryable (prompt too long) and
    /// surfaced directly rather than retried.
    #[error("call rejected, not retryable: {0}")]
    NotRetryable(String),

    /// Tool transport (C1) could not be reached at all (as opposed to a
    /// per-tool execution failure, which is represented as a `ToolResult`
    /// with `success=false`).
    #[error("tool transport error: {0}")]
    Transport(String),

    /// Malformed or unparsable executor plan (P2). Treated as "no steps" by
    /// the orchestrator, but the Executor itself surfaces it as an error.
    #[error("executor plan error: {0}")]
    ExecutorPlan(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem I/O error, generally from the artefact writer (C5).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error (missing mandatory field, invalid path, ...).
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create a reasoner-failed error.
    pub fn reasoner_failed(message: impl Into<String>) -> Self {
        Self::ReasonerFailed(message.into())
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl ClassifiableError for Error {
    fn message(&self) -> String {
        self.to_string()
    }
}
