use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sparse (keyword/BM25-routed) embedding vector: parallel index/value
/// arrays, the common wire shape for sparse vector upserts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

/// System-owned fields attached to every entity. Unlike the rest of an
/// entity's content, these are mutated *by the pipeline itself* as it moves
/// through hash -> resolve -> embed -> persist, never by the source
/// connector. Always excluded from hashing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AirweaveSystemMetadata {
    /// sha256 hex digest, 64 chars once set. `None` until
    /// `EntityPipeline` has run; `ActionResolver` treats a missing hash on a
    /// non-deletion entity as a programmer error.
    pub hash: Option<String>,
    pub chunk_index: Option<u32>,
    pub original_entity_id: Option<String>,
    pub dense_embedding: Option<Vec<f32>>,
    pub sparse_embedding: Option<SparseVector>,
    pub sync_id: Option<Uuid>,
    pub sync_job_id: Option<Uuid>,
}

impl AirweaveSystemMetadata {
    pub fn stamp_sync(&mut self, sync_id: Uuid, sync_job_id: Uuid) {
        self.sync_id = Some(sync_id);
        self.sync_job_id = Some(sync_job_id);
    }

    pub fn is_hashed(&self) -> bool {
        self.hash.as_deref().is_some_and(|h| h.len() == airweave_hash::engine::HASH_HEX_LEN)
    }
}
