//! Error taxonomy for the benchmark harness.
//!
//! One enum covers every failure class the harness distinguishes, with a
//! single retryability classifier. Batch executors recover retryable
//! errors internally; everything else surfaces through run status or the
//! facade.

use std::time::Duration;

/// Harness-wide error type.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Network-level failure talking to the model provider.
    #[error("transport error: {0}")]
    Transport(String),

    /// Provider signalled rate limiting (HTTP 429 or equivalent).
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The model returned a payload the harness could not parse.
    #[error("invalid model response: {0}")]
    InvalidResponse(String),

    /// An operation exceeded its wall-clock budget.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The operation was cancelled cooperatively.
    #[error("cancelled")]
    Cancelled,

    /// The request was rejected by the provider or the harness (4xx-class).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Persisting to the artifact store failed.
    #[error("store persistence failed: {0}")]
    StorePersist(String),

    /// The external compile/syntax check failed to run.
    #[error("compile check failed: {0}")]
    CompileCheck(String),

    /// A submit-time configuration violation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A referenced entity does not exist.
    #[error("{0} not found")]
    NotFound(String),
}

impl Error {
    /// Whether a batch executor may retry after this error.
    ///
    /// Transport failures, rate limiting, unparseable responses, and
    /// timeouts are recoverable; everything else is terminal for the
    /// attempt sequence.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::RateLimited(_) | Self::InvalidResponse(_) | Self::Timeout(_)
        )
    }

    /// Whether the error is rate limiting, which stretches the backoff.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

/// Harness-wide result type.
pub type Result<T> = std::result::Result<T, Error>;
