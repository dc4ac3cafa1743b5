use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use airweave_entities::Entity;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use crate::action_resolver::{EntityActionBatch, EntityInsert};
use crate::dag::{DagNodeId, DagRouter};
use crate::db::{DbActorHandle, EntityKey, EntityUpsert};
use crate::destinations::Destinations;
use crate::error::SyncFailureError;

/// Outcome counters for one resolved batch, folded into the sync job's
/// running totals by the orchestrator after every batch completes.
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkerBatchStats {
    pub inserted: i64,
    pub updated: i64,
    pub kept: i64,
    pub deleted: i64,
    pub failed: i64,
}

/// Runs the persist stage of the pipeline: routes each already-classified
/// entity through the DAG, upserts/deletes the bookkeeping row, and reports
/// per-entity outcomes. Bounded to `max_workers` concurrent persistence
/// calls via one shared semaphore, mirroring the teacher's actor-bounded
/// concurrency pattern but applied to plain tokio tasks since no per-entity
/// state needs to survive between calls.
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    high_water_mark: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub fn new(max_workers: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_workers.max(1))),
            in_flight: Arc::new(AtomicUsize::new(0)),
            high_water_mark: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Peak number of concurrently in-flight persistence calls observed so
    /// far, exposed for the concurrency-bound test and for progress
    /// reporting.
    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark.load(Ordering::SeqCst)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn run_batch(
        &self,
        sync_id: Uuid,
        collection_id: &str,
        producer: &DagNodeId,
        router: Arc<DagRouter>,
        destinations: Arc<Destinations>,
        db: DbActorHandle,
        batch: EntityActionBatch,
        cancellation: CancellationToken,
    ) -> Result<WorkerBatchStats, SyncFailureError> {
        let mut stats = WorkerBatchStats::default();

        let keeps = batch.keeps.len() as i64;
        stats.kept = keeps;

        if cancellation.is_cancelled() {
            return Ok(stats);
        }

        let upsert_tasks: Vec<_> = batch
            .inserts
            .into_iter()
            .map(|EntityInsert { entity, skip_content_handlers }| (entity, false, skip_content_handlers))
            .chain(batch.updates.into_iter().map(|e| (e, true, false)))
            .collect();

        let results = join_all(upsert_tasks.into_iter().map(|(entity, is_update, skip_content_handlers)| {
            let semaphore = self.semaphore.clone();
            let in_flight = self.in_flight.clone();
            let high_water_mark = self.high_water_mark.clone();
            let router = router.clone();
            let destinations = destinations.clone();
            let db = db.clone();
            let cancellation = cancellation.clone();
            let producer = producer.clone();
            let collection_id = collection_id.to_string();

            async move {
                if cancellation.is_cancelled() {
                    return Ok(None);
                }
                let _permit = semaphore.acquire().await.expect("semaphore never closed");
                let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                high_water_mark.fetch_max(current, Ordering::SeqCst);

                let outcome = persist_one(
                    &router,
                    &destinations,
                    &db,
                    sync_id,
                    &collection_id,
                    &producer,
                    entity,
                    skip_content_handlers,
                )
                .await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                outcome.map(|()| Some(is_update))
            }
        }))
        .await;

        for result in results {
            match result {
                Ok(Some(true)) => stats.updated += 1,
                Ok(Some(false)) => stats.inserted += 1,
                Ok(None) => {}
                Err(PersistError::PerEntity(err)) => {
                    warn!(error = %err, "per-entity persistence failure, counted and skipped");
                    stats.failed += 1;
                }
                Err(PersistError::Fatal(err)) => return Err(err),
            }
        }

        if cancellation.is_cancelled() {
            return Ok(stats);
        }

        let delete_keys: Vec<EntityKey> = batch
            .deletes
            .iter()
            .filter_map(|e| {
                e.entity_definition_id().map(|def| EntityKey {
                    entity_id: e.entity_id().to_string(),
                    entity_definition_id: def.as_str().to_string(),
                })
            })
            .collect();

        for entity in &batch.deletes {
            let id = entity.entity_id();
            if let Err(err) = destinations.delete_entity(id).await {
                warn!(entity_id = id, error = %err, "per-entity delete failed against one or more destinations");
                stats.failed += 1;
            }
        }
        if !delete_keys.is_empty() {
            db.delete_entities(sync_id, delete_keys).await?;
            stats.deleted = batch.deletes.len() as i64;
        }

        Ok(stats)
    }
}

enum PersistError {
    /// Safe to count and move on: the DAG/destination rejected this one
    /// entity, every other entity in the batch is unaffected.
    PerEntity(SyncFailureError),
    /// A condition that invalidates the whole run (DB unavailable, a
    /// structurally broken DAG) — must propagate and stop the sync.
    Fatal(SyncFailureError),
}

#[allow(clippy::too_many_arguments)]
async fn persist_one(
    router: &DagRouter,
    destinations: &Destinations,
    db: &DbActorHandle,
    sync_id: Uuid,
    collection_id: &str,
    producer: &DagNodeId,
    entity: Entity,
    skip_content_handlers: bool,
) -> Result<(), PersistError> {
    let Some(hash) = entity.system_metadata().and_then(|m| m.hash.clone()) else {
        return Err(PersistError::Fatal(SyncFailureError::MissingHash {
            entity_id: entity.entity_id().to_string(),
            entity_definition_id: entity.entity_definition_id().map(|id| id.to_string()),
        }));
    };
    let Some(entity_definition_id) = entity.entity_definition_id().map(|id| id.as_str().to_string()) else {
        return Err(PersistError::Fatal(SyncFailureError::MissingEntityDefinition {
            entity_id: entity.entity_id().to_string(),
        }));
    };
    let entity_id = entity.entity_id().to_string();

    router
        .route(producer, entity, destinations, skip_content_handlers)
        .await
        .map_err(classify_route_error)?;

    db.upsert_entities(vec![EntityUpsert {
        sync_id,
        entity_id,
        entity_definition_id,
        hash,
        collection_id: collection_id.to_string(),
        skip_content_handlers,
    }])
    .await
    .map_err(PersistError::Fatal)?;

    Ok(())
}

fn classify_route_error(err: SyncFailureError) -> PersistError {
    match err {
        SyncFailureError::Destination(_) => PersistError::PerEntity(err),
        other => PersistError::Fatal(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::{Dag, DagEdge, DagNode, TransformerRegistry};
    use crate::destinations::{ProcessingRequirement, VectorDestination};
    use airweave_entities::{EntityDefinitionId, StandardEntity};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;

    struct SlowCountingVector {
        concurrent: Arc<StdAtomicUsize>,
        observed_max: Arc<StdAtomicUsize>,
    }

    #[async_trait]
    impl VectorDestination for SlowCountingVector {
        fn processing_requirement(&self) -> ProcessingRequirement {
            ProcessingRequirement::PreEmbedded
        }
        async fn setup_collection(&self, _: &str, _: usize) -> Result<(), crate::error::DestinationError> {
            Ok(())
        }
        async fn bulk_insert(&self, _: &str, _: &[Entity]) -> Result<(), crate::error::DestinationError> {
            let current = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            self.observed_max.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.concurrent.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
        async fn bulk_insert_raw(&self, _: &str, _: &[Entity]) -> Result<(), crate::error::DestinationError> {
            Ok(())
        }
        async fn delete(&self, _: &str, _: &str) -> Result<(), crate::error::DestinationError> {
            Ok(())
        }
        async fn bulk_delete(&self, _: &str, _: &[String]) -> Result<(), crate::error::DestinationError> {
            Ok(())
        }
        async fn bulk_delete_by_parent_id(&self, _: &str, _: &str) -> Result<(), crate::error::DestinationError> {
            Ok(())
        }
        async fn delete_by_sync_id(&self, _: &str, _: Uuid) -> Result<(), crate::error::DestinationError> {
            Ok(())
        }
    }

    fn hashed_entity(id: &str) -> Entity {
        let mut e = StandardEntity::new(id, EntityDefinitionId::new("k"));
        e.airweave_system_metadata.hash = Some("a".repeat(64));
        Entity::Standard(e)
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_max_workers() {
        let concurrent = Arc::new(StdAtomicUsize::new(0));
        let observed_max = Arc::new(StdAtomicUsize::new(0));

        let mut destinations = Destinations::new("coll-1");
        destinations.register_vector(
            "qdrant",
            Arc::new(SlowCountingVector { concurrent: concurrent.clone(), observed_max: observed_max.clone() }),
        );
        let destinations = Arc::new(destinations);

        let producer = DagNodeId("source".into());
        let dag = Dag {
            nodes: vec![
                DagNode::Source { id: producer.clone() },
                DagNode::Destination { id: DagNodeId("dst".into()), name: "qdrant".into() },
            ],
            edges: vec![DagEdge { from: producer.clone(), to: DagNodeId("dst".into()), entity_definition_filter: None }],
        };
        let router = Arc::new(DagRouter::new(dag, TransformerRegistry::new()).unwrap());

        let tmp = tempfile::NamedTempFile::new().unwrap();
        let database_url = format!("sqlite:{}", tmp.path().to_str().unwrap());
        let db = crate::db::spawn(&database_url).await;
        db.create_sync("test".into(), "coll-1".into(), false).await.ok();

        let max_workers = 3;
        let pool = WorkerPool::new(max_workers);

        let mut batch = EntityActionBatch::default();
        for i in 0..12 {
            batch.inserts.push(EntityInsert { entity: hashed_entity(&format!("t-{i}")), skip_content_handlers: false });
        }

        pool.run_batch(
            Uuid::new_v4(),
            "coll-1",
            &producer,
            router,
            destinations,
            db,
            batch,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(observed_max.load(Ordering::SeqCst) <= max_workers);
    }
}
