pub mod fanout;
pub mod ids;
pub mod neo4j;
pub mod qdrant;
pub mod vespa;

pub use neo4j::Neo4jDestination;
pub use qdrant::QdrantDestination;
pub use vespa::VespaDestination;

use std::collections::HashMap;
use std::sync::Arc;

use airweave_entities::Entity;
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use uuid::Uuid;

use crate::error::{DestinationError, IsRetryable};

/// Which write path a vector destination expects: `PreEmbedded` entities
/// already carry `airweave_system_metadata.dense_embedding`/`sparse_embedding`
/// stamped by the orchestrator's batch embedding step; `RawChunking`
/// destinations (Vespa) accept raw chunk text and embed on ingest
/// themselves, so the pipeline must skip its own embedding step for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingRequirement {
    PreEmbedded,
    RawChunking,
}

#[async_trait]
pub trait VectorDestination: Send + Sync {
    fn processing_requirement(&self) -> ProcessingRequirement;
    async fn setup_collection(&self, collection_id: &str, vector_size: usize) -> Result<(), DestinationError>;
    async fn bulk_insert(&self, collection_id: &str, entities: &[Entity]) -> Result<(), DestinationError>;
    async fn bulk_insert_raw(&self, collection_id: &str, entities: &[Entity]) -> Result<(), DestinationError>;
    async fn delete(&self, collection_id: &str, entity_id: &str) -> Result<(), DestinationError>;
    async fn bulk_delete(&self, collection_id: &str, entity_ids: &[String]) -> Result<(), DestinationError>;
    async fn bulk_delete_by_parent_id(&self, collection_id: &str, parent_entity_id: &str) -> Result<(), DestinationError>;
    async fn delete_by_sync_id(&self, collection_id: &str, sync_id: Uuid) -> Result<(), DestinationError>;
}

#[async_trait]
pub trait GraphDestination: Send + Sync {
    async fn setup_constraints(&self, collection_id: &str) -> Result<(), DestinationError>;
    async fn upsert_nodes(&self, collection_id: &str, entities: &[Entity]) -> Result<(), DestinationError>;
    /// One `UNWIND`-driven batch call per invocation, not one query per edge.
    async fn upsert_parent_edges(
        &self,
        collection_id: &str,
        edges: &[(String, String)],
    ) -> Result<(), DestinationError>;
    async fn bulk_delete_by_parent_id(&self, collection_id: &str, parent_entity_id: &str) -> Result<(), DestinationError>;
}

enum Destination {
    Vector(Arc<dyn VectorDestination>),
    Graph(Arc<dyn GraphDestination>),
}

/// The set of named destinations a sync's DAG can route entities to.
/// Registered once per [`crate::orchestrator::SyncContext`] and looked up
/// by name at every `destination` DAG edge.
pub struct Destinations {
    collection_id: String,
    by_name: HashMap<String, Destination>,
    retry_policy: ExponentialBuilder,
}

impl Destinations {
    pub fn new(collection_id: impl Into<String>) -> Self {
        Self {
            collection_id: collection_id.into(),
            by_name: HashMap::new(),
            retry_policy: ExponentialBuilder::default().with_max_times(4),
        }
    }

    pub fn register_vector(&mut self, name: impl Into<String>, destination: Arc<dyn VectorDestination>) -> &mut Self {
        self.by_name.insert(name.into(), Destination::Vector(destination));
        self
    }

    pub fn register_graph(&mut self, name: impl Into<String>, destination: Arc<dyn GraphDestination>) -> &mut Self {
        self.by_name.insert(name.into(), Destination::Graph(destination));
        self
    }

    /// Writes one entity to the named destination, retrying transient
    /// failures with the shared exponential backoff policy.
    pub async fn persist(&self, name: &str, entity: Entity) -> Result<(), DestinationError> {
        let destination = self
            .by_name
            .get(name)
            .ok_or_else(|| DestinationError::Other(format!("unknown destination {name:?}")))?;

        match destination {
            Destination::Vector(vector) => {
                let batch = [entity];
                (|| async {
                    match vector.processing_requirement() {
                        ProcessingRequirement::PreEmbedded => {
                            vector.bulk_insert(&self.collection_id, &batch).await
                        }
                        ProcessingRequirement::RawChunking => {
                            vector.bulk_insert_raw(&self.collection_id, &batch).await
                        }
                    }
                })
                .retry(self.retry_policy)
                .when(IsRetryable::is_retryable)
                .await
            }
            Destination::Graph(graph) => {
                let parent_edge = entity
                    .breadcrumbs()
                    .last()
                    .map(|parent| (ids::point_id(&self.collection_id, &parent.entity_id), ids::destination_id(&self.collection_id, &entity)));
                let batch = [entity];
                (|| async { graph.upsert_nodes(&self.collection_id, &batch).await })
                    .retry(self.retry_policy)
                    .when(IsRetryable::is_retryable)
                    .await?;

                if let Some(edge) = parent_edge {
                    let edges = [edge];
                    (|| async { graph.upsert_parent_edges(&self.collection_id, &edges).await })
                        .retry(self.retry_policy)
                        .when(IsRetryable::is_retryable)
                        .await?;
                }
                Ok(())
            }
        }
    }

    pub async fn delete_by_sync_id(&self, sync_id: Uuid) -> Result<(), DestinationError> {
        let names: Vec<String> = self.by_name.keys().cloned().collect();
        fanout::fanout(&names, |name| async move {
            match self.by_name.get(name) {
                Some(Destination::Vector(vector)) => {
                    vector.delete_by_sync_id(&self.collection_id, sync_id).await
                }
                Some(Destination::Graph(_)) | None => Ok(()),
            }
        })
        .await
    }

    /// Deletes one entity from every registered destination (a tombstone
    /// has no DAG route, since it carries no content to classify by
    /// definition filter — it is removed from everywhere the collection
    /// writes to, not routed selectively like an insert/update).
    pub async fn delete_entity(&self, entity_id: &str) -> Result<(), DestinationError> {
        let names: Vec<String> = self.by_name.keys().cloned().collect();
        fanout::fanout(&names, |name| async move {
            match self.by_name.get(name) {
                Some(Destination::Vector(vector)) => vector.delete(&self.collection_id, entity_id).await,
                Some(Destination::Graph(graph)) => graph.bulk_delete_by_parent_id(&self.collection_id, entity_id).await,
                None => Ok(()),
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airweave_entities::{EntityDefinitionId, StandardEntity};

    struct CountingVector {
        requirement: ProcessingRequirement,
    }

    #[async_trait]
    impl VectorDestination for CountingVector {
        fn processing_requirement(&self) -> ProcessingRequirement {
            self.requirement
        }
        async fn setup_collection(&self, _: &str, _: usize) -> Result<(), DestinationError> {
            Ok(())
        }
        async fn bulk_insert(&self, _: &str, _: &[Entity]) -> Result<(), DestinationError> {
            Ok(())
        }
        async fn bulk_insert_raw(&self, _: &str, _: &[Entity]) -> Result<(), DestinationError> {
            Err(DestinationError::Other("raw path should not be called".into()))
        }
        async fn delete(&self, _: &str, _: &str) -> Result<(), DestinationError> {
            Ok(())
        }
        async fn bulk_delete(&self, _: &str, _: &[String]) -> Result<(), DestinationError> {
            Ok(())
        }
        async fn bulk_delete_by_parent_id(&self, _: &str, _: &str) -> Result<(), DestinationError> {
            Ok(())
        }
        async fn delete_by_sync_id(&self, _: &str, _: Uuid) -> Result<(), DestinationError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn persist_routes_pre_embedded_to_bulk_insert() {
        let mut destinations = Destinations::new("coll-1");
        destinations.register_vector(
            "qdrant",
            Arc::new(CountingVector { requirement: ProcessingRequirement::PreEmbedded }),
        );
        let entity = Entity::Standard(StandardEntity::new("t-1", EntityDefinitionId::new("k")));
        destinations.persist("qdrant", entity).await.unwrap();
    }

    #[tokio::test]
    async fn persist_on_unknown_destination_is_an_error() {
        let destinations = Destinations::new("coll-1");
        let entity = Entity::Standard(StandardEntity::new("t-1", EntityDefinitionId::new("k")));
        assert!(destinations.persist("missing", entity).await.is_err());
    }

    struct CountingGraph {
        edges: std::sync::Mutex<Vec<(String, String)>>,
    }

    impl CountingGraph {
        fn new() -> Self {
            Self { edges: std::sync::Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl GraphDestination for CountingGraph {
        async fn setup_constraints(&self, _: &str) -> Result<(), DestinationError> {
            Ok(())
        }
        async fn upsert_nodes(&self, _: &str, _: &[Entity]) -> Result<(), DestinationError> {
            Ok(())
        }
        async fn upsert_parent_edges(&self, _: &str, edges: &[(String, String)]) -> Result<(), DestinationError> {
            self.edges.lock().unwrap().extend_from_slice(edges);
            Ok(())
        }
        async fn bulk_delete_by_parent_id(&self, _: &str, _: &str) -> Result<(), DestinationError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn persist_with_a_breadcrumb_upserts_a_parent_edge() {
        let mut destinations = Destinations::new("coll-1");
        let graph = Arc::new(CountingGraph::new());
        destinations.register_graph("neo4j", graph.clone());

        let mut entity = StandardEntity::new("child-1", EntityDefinitionId::new("k"));
        entity.breadcrumbs.push(airweave_entities::Breadcrumb::new("Project X", "parent-1"));
        destinations.persist("neo4j", Entity::Standard(entity)).await.unwrap();

        let edges = graph.edges.lock().unwrap();
        assert_eq!(edges.as_slice(), [("coll-1:parent-1".to_string(), "coll-1:child-1".to_string())]);
    }

    #[tokio::test]
    async fn persist_without_a_breadcrumb_upserts_no_parent_edge() {
        let mut destinations = Destinations::new("coll-1");
        let graph = Arc::new(CountingGraph::new());
        destinations.register_graph("neo4j", graph.clone());

        let entity = StandardEntity::new("root-1", EntityDefinitionId::new("k"));
        destinations.persist("neo4j", Entity::Standard(entity)).await.unwrap();

        assert!(graph.edges.lock().unwrap().is_empty());
    }
}
