pub mod chunking;
pub mod embedding;
pub mod textual;

pub use chunking::{Chunker, ChunkerRegistry, ParagraphChunker};
pub use embedding::{ensure_embedding_config_matches, Embedder};
pub use textual::build_textual_representation;

use std::sync::Arc;

use airweave_entities::{ChunkEntity, Entity};
use airweave_hash::Hashable;
use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;

use crate::error::SyncFailureError;

/// Per-entity hash -> textual-representation -> chunk stage of the sync
/// pipeline (embedding is a separate batch step the orchestrator drives
/// once per worker batch, see [`Embedder`]). File hashing reads file bytes
/// off disk and is bounded by its own semaphore, independent of
/// `WorkerPool`'s concurrency limit, since hashing many large files
/// concurrently is a different resource (disk/CPU) than the network- and
/// DB-bound steps the worker pool throttles.
pub struct EntityPipeline {
    chunkers: ChunkerRegistry,
    file_hash_semaphore: Arc<Semaphore>,
}

impl EntityPipeline {
    pub fn new(chunkers: ChunkerRegistry, max_concurrent_file_hashes: usize) -> Self {
        Self {
            chunkers,
            file_hash_semaphore: Arc::new(Semaphore::new(max_concurrent_file_hashes.max(1))),
        }
    }

    /// Computes and stamps `airweave_system_metadata.hash` on one entity.
    /// Deletion entities are never stamped — the resolver never reads their
    /// hash.
    pub fn stamp_hash(&self, entity: &mut Entity) -> Result<(), SyncFailureError> {
        if entity.is_deletion() {
            return Ok(());
        }
        let hash = entity.compute_hash();
        if let Some(meta) = entity.system_metadata_mut() {
            meta.hash = Some(hash);
        }
        Ok(())
    }

    /// Hashes a batch of entities with file-entity hashing bounded by
    /// [`Self::file_hash_semaphore`]; non-file entities hash inline since
    /// that path is pure CPU on an already-in-memory JSON value.
    pub async fn hash_batch(&self, entities: Vec<Entity>) -> Result<Vec<Entity>, SyncFailureError> {
        let semaphore = self.file_hash_semaphore.clone();
        stream::iter(entities.into_iter().map(|mut entity| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = if matches!(entity, Entity::File(_)) {
                    Some(semaphore.acquire().await.expect("semaphore never closed"))
                } else {
                    None
                };
                self.stamp_hash(&mut entity)?;
                Ok::<_, SyncFailureError>(entity)
            }
        }))
        .buffer_unordered(16)
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect()
    }

    /// Builds the textual representation, chunks it, and produces chunk
    /// entities; the parent entity's own `textual_representation` field is
    /// cleared once chunked since the chunks now carry the text. Entities
    /// with no textual representation (deletions, schema-less files) pass
    /// through unchanged. Empty or whitespace-only chunks are dropped.
    pub fn multiply(&self, mut entity: Entity, extension: Option<&str>) -> Vec<Entity> {
        let Some(text) = build_textual_representation(&entity) else {
            return vec![entity];
        };
        if text.trim().is_empty() {
            return vec![entity];
        }

        let chunker = self.chunkers.resolve(extension);
        let chunk_texts = chunker.chunk(&text);
        if chunk_texts.is_empty() {
            return vec![entity];
        }

        let parent_id = entity.entity_id().to_string();
        let Some(definition_id) = entity.entity_definition_id().cloned() else {
            return vec![entity];
        };

        if let Entity::Standard(e) = &mut entity {
            e.textual_representation = None;
        }

        let mut out = Vec::with_capacity(chunk_texts.len() + 1);
        out.push(entity);
        for (index, chunk_text) in chunk_texts.into_iter().enumerate() {
            if chunk_text.trim().is_empty() {
                continue;
            }
            out.push(Entity::Chunk(ChunkEntity::new(
                &parent_id,
                index as u32,
                definition_id.clone(),
                chunk_text,
            )));
        }
        out
    }

    /// Stamps `dense_embedding`/`sparse_embedding` on every entity in the
    /// batch that carries embeddable text (chunk entities, and any
    /// unchunked standard entity whose textual representation survived
    /// `multiply` unchanged). Entities with nothing to embed pass through
    /// untouched. One pair of batch calls regardless of how many entities
    /// need embedding, not one call per entity.
    pub async fn embed_batch(
        &self,
        embedder: &dyn Embedder,
        mut entities: Vec<Entity>,
    ) -> Result<Vec<Entity>, SyncFailureError> {
        let indices: Vec<usize> = entities
            .iter()
            .enumerate()
            .filter_map(|(i, e)| embeddable_text(e).map(|_| i))
            .collect();
        if indices.is_empty() {
            return Ok(entities);
        }

        let texts: Vec<String> = indices
            .iter()
            .map(|&i| embeddable_text(&entities[i]).unwrap().to_string())
            .collect();

        let dense = embedder.embed_dense(&texts).await?;
        let sparse = embedder.embed_sparse(&texts).await?;

        for ((i, d), s) in indices.into_iter().zip(dense).zip(sparse) {
            if let Some(meta) = entities[i].system_metadata_mut() {
                meta.dense_embedding = Some(d);
                meta.sparse_embedding = Some(s);
            }
        }

        Ok(entities)
    }
}

fn embeddable_text(entity: &Entity) -> Option<&str> {
    match entity {
        Entity::Chunk(c) => Some(c.chunk_text.as_str()),
        Entity::Standard(e) => e.textual_representation.as_deref(),
        Entity::Polymorphic(_) | Entity::File(_) | Entity::Deletion(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airweave_entities::{EntityDefinitionId, StandardEntity};

    fn pipeline() -> EntityPipeline {
        EntityPipeline::new(ChunkerRegistry::default(), 4)
    }

    #[test]
    fn stamp_hash_sets_64_char_hex_digest() {
        let mut e = StandardEntity::new("t-1", EntityDefinitionId::new("asana_task"));
        e.fields.insert("title".into(), serde_json::json!("hi"));
        let mut entity = Entity::Standard(e);
        pipeline().stamp_hash(&mut entity).unwrap();
        let hash = entity.system_metadata().unwrap().hash.clone().unwrap();
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn multiply_drops_whitespace_only_chunks_and_keeps_parent() {
        let mut e = StandardEntity::new("t-1", EntityDefinitionId::new("asana_task"));
        e.fields.insert("body".into(), serde_json::json!("real content here"));
        let out = pipeline().multiply(Entity::Standard(e), None);
        assert!(out.iter().any(|e| matches!(e, Entity::Standard(_))));
        assert!(out.iter().any(|e| matches!(e, Entity::Chunk(_))));
        assert!(out.iter().all(|e| match e {
            Entity::Chunk(c) => !c.chunk_text.trim().is_empty(),
            _ => true,
        }));
    }

    #[tokio::test]
    async fn hash_batch_stamps_every_non_deletion_entity() {
        let mut e1 = StandardEntity::new("a", EntityDefinitionId::new("k"));
        e1.fields.insert("x".into(), serde_json::json!(1));
        let e2 = airweave_entities::DeletionEntity::new("b");
        let batch = pipeline()
            .hash_batch(vec![Entity::Standard(e1), Entity::Deletion(e2)])
            .await
            .unwrap();
        assert!(batch[0].system_metadata().unwrap().hash.is_some());
        assert!(batch[1].system_metadata().is_none());
    }
}
