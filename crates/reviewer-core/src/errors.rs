//! Error taxonomy. Every fallible core operation returns a tagged [`CoreError`]
//! variant; retry/circuit decisions dispatch on the variant, never on message
//! text (see design notes on replacing string-matched error dispatch).

use std::time::{Duration, SystemTime};
use thiserror::Error;

/// Narrow error produced by a single adapter call, before it is folded into
/// [`CoreError`] or recorded into a [`crate::model::SearchStatus`] slot.
#[derive(Error, Debug, Clone)]
pub enum AdapterError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("rate limited (429){}", .retry_after.map(|d| format!(", retry after {:.1}s", d.as_secs_f64())).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },
    #[error("upstream returned client error: {0}")]
    UpstreamClient(u16),
    #[error("upstream returned server error: {0}")]
    UpstreamServer(u16),
    #[error("failed to parse response: {0}")]
    Parse(String),
}

impl AdapterError {
    /// Whether [`crate::resilience::ResilienceLayer`]'s retry loop should
    /// attempt this call again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AdapterError::Network(_) | AdapterError::Timeout | AdapterError::RateLimited { .. } | AdapterError::UpstreamServer(_)
        )
    }

    /// Whether a failure of this kind counts against the circuit breaker.
    /// Expected 4xx-other-than-429 errors do not.
    pub fn counts_against_circuit(&self) -> bool {
        !matches!(
            self,
            AdapterError::UpstreamClient(_) | AdapterError::RateLimited { .. }
        )
    }
}

/// Top-level error type returned by every public `reviewer-core` operation.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("rate limited{}", .retry_after.map(|d| format!(", retry after {:.1}s", d.as_secs_f64())).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },
    #[error("upstream server error (HTTP {0})")]
    UpstreamServer(u16),
    #[error("upstream client error (HTTP {0})")]
    UpstreamClient(u16),
    #[error("response parse error: {0}")]
    ParseError(String),
    #[error("circuit open for {adapter}, next attempt at {next_attempt:?}")]
    CircuitOpen {
        adapter: String,
        next_attempt: SystemTime,
    },
    #[error("invalid input: {0}")]
    ValidationInputError(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflicting state: {0}")]
    ConflictState(String),
    #[error("repository error: {0}")]
    Repository(#[from] crate::repository::RepositoryError),
}

impl From<AdapterError> for CoreError {
    fn from(e: AdapterError) -> Self {
        match e {
            AdapterError::Network(m) => CoreError::NetworkError(m),
            AdapterError::Timeout => CoreError::NetworkError("timeout".to_string()),
            AdapterError::RateLimited { retry_after } => CoreError::RateLimited { retry_after },
            AdapterError::UpstreamClient(c) => CoreError::UpstreamClient(c),
            AdapterError::UpstreamServer(c) => CoreError::UpstreamServer(c),
            AdapterError::Parse(m) => CoreError::ParseError(m),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
