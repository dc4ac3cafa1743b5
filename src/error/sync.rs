use thiserror::Error as ThisError;

use super::{DestinationError, FileError, IsRetryable, TokenError};

/// Structural/configuration errors raised while building a sync's static
/// shape (DAG construction, transformer/source resolution) — these never
/// occur mid-run, only while `Orchestrator::run` is assembling `SyncContext`.
#[derive(Debug, ThisError)]
pub enum SyncError {
    #[error("DAG contains a cycle reachable from node {0}")]
    CyclicDag(String),

    #[error("DAG references unknown transformer {0:?}")]
    UnknownTransformer(String),

    #[error("DAG references unknown source connector {0:?}")]
    UnknownSourceConnector(String),

    #[error("DAG edge from {from} to {to} has no valid node on one end")]
    DanglingEdge { from: String, to: String },
}

/// The one error category that short-circuits a run. Everything else
/// (per-entity errors, skipped files) is caught inside the worker loop and
/// counted, never propagated past it — `SyncFailureError` is what
/// `Orchestrator::run`'s top-level `?` is allowed to return, matching the
/// "programmer error / unrecoverable" classification.
#[derive(Debug, ThisError)]
pub enum SyncFailureError {
    #[error("DAG error: {0}")]
    Dag(#[from] SyncError),

    #[error("token error: {0}")]
    Token(#[from] TokenError),

    #[error("file error: {0}")]
    File(#[from] FileError),

    #[error("destination error: {0}")]
    Destination(#[from] DestinationError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(
        "entity {entity_id} of definition {entity_definition_id:?} has no \
         airweave_system_metadata.hash set before action resolution (programmer error)"
    )]
    MissingHash {
        entity_id: String,
        entity_definition_id: Option<String>,
    },

    #[error(
        "non-polymorphic entity {entity_id} has no entity_definition_id \
         (programmer error)"
    )]
    MissingEntityDefinition { entity_id: String },

    #[error("entity {entity_id} has entity_definition_id {entity_definition_id:?}, which is not registered in the entity definition map")]
    UnknownEntityDefinition {
        entity_id: String,
        entity_definition_id: String,
    },

    #[error("collection embedding config mismatch: expected {expected}, got {actual}")]
    EmbeddingConfigMismatch { expected: String, actual: String },

    #[error("sync job {0} was cancelled")]
    Cancelled(String),

    #[error("source connector {0:?} failed validation")]
    SourceValidationFailed(String),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl IsRetryable for SyncFailureError {
    fn is_retryable(&self) -> bool {
        match self {
            SyncFailureError::Token(e) => e.is_retryable(),
            SyncFailureError::File(e) => e.is_retryable(),
            SyncFailureError::Destination(e) => e.is_retryable(),
            SyncFailureError::Database(_) => true,
            SyncFailureError::Dag(_)
            | SyncFailureError::MissingHash { .. }
            | SyncFailureError::MissingEntityDefinition { .. }
            | SyncFailureError::UnknownEntityDefinition { .. }
            | SyncFailureError::EmbeddingConfigMismatch { .. }
            | SyncFailureError::Cancelled(_)
            | SyncFailureError::SourceValidationFailed(_)
            | SyncFailureError::Unexpected(_) => false,
        }
    }
}
