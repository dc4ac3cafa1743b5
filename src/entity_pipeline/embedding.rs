use airweave_entities::SparseVector;
use async_trait::async_trait;

use crate::db::CollectionRow;
use crate::error::SyncFailureError;

/// A dense+sparse embedding backend. One `Embedder` is configured per
/// collection; `model_name`/`vector_size` are compared against the
/// collection's stamped config on every run (see
/// [`ensure_embedding_config_matches`]).
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_dense(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SyncFailureError>;
    async fn embed_sparse(&self, texts: &[String]) -> Result<Vec<SparseVector>, SyncFailureError>;
    fn model_name(&self) -> &str;
    fn vector_size(&self) -> usize;
}

/// Stamps the collection's embedding config on first use (both fields are
/// `NULL` until some sync writes them), or verifies this embedder agrees
/// with whatever is already stamped. A mismatch means two syncs are
/// pointed at the same collection with different embedding models, which
/// would silently corrupt vector search — so it is a hard
/// `SyncFailureError`, not a warning.
pub fn ensure_embedding_config_matches(
    collection: &CollectionRow,
    embedder: &dyn Embedder,
) -> Result<bool, SyncFailureError> {
    match (&collection.embedding_model_name, collection.vector_size) {
        (Some(name), Some(size)) => {
            if name != embedder.model_name() || size != embedder.vector_size() as i64 {
                return Err(SyncFailureError::EmbeddingConfigMismatch {
                    expected: format!("{name} ({size} dims)"),
                    actual: format!("{} ({} dims)", embedder.model_name(), embedder.vector_size()),
                });
            }
            Ok(false)
        }
        _ => Ok(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn collection(name: Option<&str>, size: Option<i64>) -> CollectionRow {
        CollectionRow {
            id: "c-1".into(),
            embedding_model_name: name.map(str::to_string),
            vector_size: size,
            created_at: Utc::now(),
            modified_at: Utc::now(),
        }
    }

    struct FakeEmbedder;

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed_dense(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SyncFailureError> {
            Ok(texts.iter().map(|_| vec![0.0; 4]).collect())
        }
        async fn embed_sparse(&self, texts: &[String]) -> Result<Vec<SparseVector>, SyncFailureError> {
            Ok(texts.iter().map(|_| SparseVector::default()).collect())
        }
        fn model_name(&self) -> &str {
            "fake-embedder"
        }
        fn vector_size(&self) -> usize {
            4
        }
    }

    #[test]
    fn unset_collection_needs_stamping() {
        let collection = collection(None, None);
        assert!(ensure_embedding_config_matches(&collection, &FakeEmbedder).unwrap());
    }

    #[test]
    fn matching_config_does_not_need_stamping() {
        let collection = collection(Some("fake-embedder"), Some(4));
        assert!(!ensure_embedding_config_matches(&collection, &FakeEmbedder).unwrap());
    }

    #[test]
    fn mismatched_config_is_a_sync_failure() {
        let collection = collection(Some("other-embedder"), Some(8));
        let err = ensure_embedding_config_matches(&collection, &FakeEmbedder).unwrap_err();
        assert!(matches!(err, SyncFailureError::EmbeddingConfigMismatch { .. }));
    }
}
