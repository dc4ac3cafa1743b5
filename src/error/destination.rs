use thiserror::Error as ThisError;

use super::IsRetryable;

/// Errors raised by `VectorDestination`/`GraphDestination` implementations.
/// Kept deliberately transport-agnostic (no `qdrant_client`/`neo4rs` types
/// leak through this enum) so `destinations::fanout` can treat every
/// destination uniformly.
#[derive(Debug, ThisError)]
pub enum DestinationError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upstream returned status {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("bolt/grpc transport error: {0}")]
    Transport(String),

    #[error("JSON (de)serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("collection embedding config mismatch: expected {expected}, got {actual}")]
    EmbeddingConfigMismatch { expected: String, actual: String },

    #[error("destination operation timed out")]
    Timeout,

    #[error("one or more destinations failed: {0}")]
    FanOut(String),

    #[error("unexpected destination error: {0}")]
    Other(String),
}

impl IsRetryable for DestinationError {
    fn is_retryable(&self) -> bool {
        match self {
            DestinationError::Request(_) | DestinationError::Timeout => true,
            DestinationError::UpstreamStatus { status, .. } => {
                *status == 429 || *status >= 500
            }
            DestinationError::Transport(_) => true,
            DestinationError::Json(_)
            | DestinationError::EmbeddingConfigMismatch { .. }
            | DestinationError::FanOut(_)
            | DestinationError::Other(_) => false,
        }
    }
}
