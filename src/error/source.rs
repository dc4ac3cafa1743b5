use thiserror::Error as ThisError;

use super::{IsRetryable, TokenError};

/// Errors a `SourceConnector` can yield from its entity stream. Distinct
/// from `SyncFailureError`: a `SourceError` on one item never stops the
/// stream — `WorkerPool` decides per spec.md §7 whether it is retried,
/// counted as a skip, or escalated.
#[derive(Debug, ThisError)]
pub enum SourceError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upstream returned status {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("token error: {0}")]
    Token(#[from] TokenError),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("source returned malformed data: {0}")]
    Malformed(String),

    #[error("source validation failed: {0}")]
    ValidationFailed(String),
}

impl IsRetryable for SourceError {
    fn is_retryable(&self) -> bool {
        match self {
            SourceError::Request(_) | SourceError::RateLimited { .. } => true,
            SourceError::UpstreamStatus { status, .. } => *status == 429 || *status >= 500,
            SourceError::Token(e) => e.is_retryable(),
            SourceError::Malformed(_) | SourceError::ValidationFailed(_) => false,
        }
    }
}
