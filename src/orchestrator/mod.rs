use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use airweave_entities::{DeletionEntity, Entity, EntityDefinitionRegistry};
use chrono::Utc;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::action_resolver::{ActionResolver, ActionResolverConfig, EntityActionBatch};
use crate::config::SyncEngineConfig;
use crate::dag::{DagNodeId, DagRouter};
use crate::db::{DbActorHandle, EntityKey, SyncJobRow, SyncJobStatus};
use crate::destinations::Destinations;
use crate::entity_pipeline::{ensure_embedding_config_matches, ChunkerRegistry, Embedder, EntityPipeline};
use crate::error::SyncFailureError;
use crate::file_service::{sync_job_dir, FileService, SyncDirectoryGuard};
use crate::progress::{ProgressCounts, ProgressEvent, ProgressPublisher};
use crate::sources::{RunningSource, SourceStream};
use crate::token_manager::TokenManager;
use crate::worker_pool::{WorkerBatchStats, WorkerPool};

/// Entities drawn off the source stream before one hash/multiply/resolve/
/// persist round. A tuning knob, not something the ambient config surface
/// needs to expose, since it trades batch-write efficiency against memory
/// and latency to the first persisted entity.
const BATCH_SIZE: usize = 200;

/// Everything one sync run needs, assembled once by the caller (`main.rs`
/// or a test) and consumed by [`Orchestrator::run`]. Mirrors spec.md
/// §4.8's `SyncContext`, field for field.
pub struct SyncContext {
    pub sync_name: String,
    pub collection_id: String,
    pub dedupe_by_collection: bool,
    pub source: Box<dyn RunningSource>,
    pub destinations: Arc<Destinations>,
    pub router: Arc<DagRouter>,
    pub dag_producer: DagNodeId,
    pub token_manager: Arc<TokenManager>,
    pub file_service: Arc<FileService>,
    pub db: DbActorHandle,
    pub embedder: Option<Arc<dyn Embedder>>,
    pub entity_definition_map: EntityDefinitionRegistry,
    pub execution_config: ActionResolverConfig,
    pub config: SyncEngineConfig,
}

/// Borrowed view of the parts of [`SyncContext`] every batch needs, so the
/// per-batch helpers don't carry a dozen positional parameters each.
struct BatchContext<'a> {
    collection_id: &'a str,
    dedupe_by_collection: bool,
    dag_producer: &'a DagNodeId,
    router: &'a Arc<DagRouter>,
    destinations: &'a Arc<Destinations>,
    db: &'a DbActorHandle,
    embedder: Option<&'a dyn Embedder>,
    entity_definition_map: &'a EntityDefinitionRegistry,
    execution_config: &'a ActionResolverConfig,
    progress: &'a ProgressPublisher,
}

/// Composes `TokenManager`, `FileService`, `EntityPipeline`,
/// `ActionResolver`, `DagRouter`/`Destinations`, `WorkerPool` and
/// `ProgressPublisher` into the end-to-end run loop from spec.md §4.8.
pub struct Orchestrator;

impl Orchestrator {
    /// Runs exactly one sync job to completion, failure, or cancellation
    /// and returns the final job row. This only returns `Err` for a
    /// failure that happened *before* a job row existed; once a job row is
    /// created, every failure path updates it to `FAILED`/`CANCELLED` and
    /// returns `Ok` with that row, since the job's own status is the
    /// caller-visible outcome.
    pub async fn run(
        context: SyncContext,
        cancellation: CancellationToken,
    ) -> Result<SyncJobRow, SyncFailureError> {
        let db = context.db.clone();
        let dev_mode = context.config.dev_mode;
        let cancel_grace = Duration::from_secs(context.config.cancel_grace_seconds);

        let sync = db
            .create_sync(context.sync_name.clone(), context.collection_id.clone(), context.dedupe_by_collection)
            .await?;
        let sync_id = Uuid::parse_str(&sync.id).map_err(|e| SyncFailureError::Unexpected(e.to_string()))?;

        // Generated here, not by the store, so the progress publisher can be
        // constructed (and start emitting events) before the job row exists.
        let job_id = Uuid::new_v4();
        let span = tracing::info_span!("sync", sync_id = %sync_id, sync_job_id = %job_id);

        async move {
            let job = db.create_sync_job(sync_id, job_id).await?;
            let progress = Arc::new(ProgressPublisher::new(job_id));

            let job_dir = sync_job_dir(&std::env::temp_dir(), job_id);
            let _cleanup_guard = SyncDirectoryGuard::new(job_dir.clone());

            let mut context = context;
            context.file_service.set_base_dir(job_dir);
            context.source.set_token_manager(context.token_manager.clone());
            context.source.set_file_downloader(context.file_service.clone());

            if !context.source.validate().await {
                let message = format!("source connector for sync {:?} failed validation", context.sync_name);
                db.set_sync_job_status(job_id, SyncJobStatus::Failed, Some(message.clone()), None).await?;
                progress.publish(ProgressEvent::Failed { sync_job_id: job_id, error: message, timestamp: Utc::now() });
                return fetch_final_job(&db, job_id).await;
            }

            db.set_sync_job_status(job_id, SyncJobStatus::Running, None, None).await?;
            progress.publish(ProgressEvent::Started { sync_job_id: job_id, timestamp: Utc::now() });

            if let Err(err) = Self::run_inner(context, sync_id, job_id, &cancellation, cancel_grace, &progress).await {
                warn!(error = %err, "sync run failed");
                let stack_trace = dev_mode.then(|| format!("{err:?}"));
                db.set_sync_job_status(job_id, SyncJobStatus::Failed, Some(err.to_string()), stack_trace).await?;
                progress.publish(ProgressEvent::Failed {
                    sync_job_id: job_id,
                    error: err.to_string(),
                    timestamp: Utc::now(),
                });
                return fetch_final_job(&db, job_id).await;
            }

            let final_status = if cancellation.is_cancelled() { SyncJobStatus::Cancelled } else { SyncJobStatus::Completed };
            db.set_sync_job_status(job_id, final_status, None, None).await?;

            let job_row = fetch_final_job(&db, job_id).await?;
            let counts = counts_from_job(&job_row);
            progress.publish(if final_status == SyncJobStatus::Completed {
                ProgressEvent::Completed { sync_job_id: job_id, counts, timestamp: Utc::now() }
            } else {
                ProgressEvent::Failed { sync_job_id: job_id, error: "sync cancelled".into(), timestamp: Utc::now() }
            });

            info!(status = final_status.as_str(), "sync run finished");
            Ok(job_row)
        }
        .instrument(span)
        .await
    }

    async fn run_inner(
        context: SyncContext,
        sync_id: Uuid,
        job_id: Uuid,
        cancellation: &CancellationToken,
        cancel_grace: Duration,
        progress: &ProgressPublisher,
    ) -> Result<(), SyncFailureError> {
        let SyncContext {
            sync_name: _,
            collection_id,
            dedupe_by_collection,
            source,
            destinations,
            router,
            dag_producer,
            token_manager: _,
            file_service: _,
            db,
            embedder,
            entity_definition_map,
            execution_config,
            config,
        } = context;

        let collection = db.get_or_create_collection(collection_id.clone()).await?;
        if let Some(embedder) = &embedder {
            if ensure_embedding_config_matches(&collection, embedder.as_ref())? {
                db.stamp_collection_embedding_config(
                    collection_id.clone(),
                    embedder.model_name().to_string(),
                    embedder.vector_size() as i64,
                )
                .await?;
            }
        }

        let pipeline = EntityPipeline::new(ChunkerRegistry::default(), 8);
        let resolver = ActionResolver::new(db.clone(), config.lookup_chunk_size);
        let worker_pool = WorkerPool::new(config.max_workers);

        let mut stream = SourceStream::spawn(source, config.worker_channel_capacity()).into_stream();

        let mut seen_keys: HashSet<EntityKey> = HashSet::new();
        let mut seen_definitions: HashSet<String> = HashSet::new();
        let mut buffer: Vec<Entity> = Vec::with_capacity(BATCH_SIZE);

        let batch_ctx = BatchContext {
            collection_id: &collection_id,
            dedupe_by_collection,
            dag_producer: &dag_producer,
            router: &router,
            destinations: &destinations,
            db: &db,
            embedder: embedder.as_deref(),
            entity_definition_map: &entity_definition_map,
            execution_config: &execution_config,
            progress,
        };

        loop {
            if cancellation.is_cancelled() {
                break;
            }
            match stream.next().await {
                Some(Ok(entity)) => {
                    buffer.push(entity);
                    if buffer.len() >= BATCH_SIZE {
                        let batch = std::mem::take(&mut buffer);
                        Self::process_batch(
                            &pipeline,
                            &resolver,
                            &worker_pool,
                            sync_id,
                            job_id,
                            cancellation,
                            batch,
                            &mut seen_keys,
                            &mut seen_definitions,
                            &batch_ctx,
                        )
                        .await?;
                    }
                }
                Some(Err(source_err)) => {
                    return Err(SyncFailureError::Unexpected(format!("source stream error: {source_err}")));
                }
                None => break,
            }
        }

        if !buffer.is_empty() && !cancellation.is_cancelled() {
            Self::process_batch(
                &pipeline,
                &resolver,
                &worker_pool,
                sync_id,
                job_id,
                cancellation,
                buffer,
                &mut seen_keys,
                &mut seen_definitions,
                &batch_ctx,
            )
            .await?;
        }

        if cancellation.is_cancelled() {
            // Any worker task started by the last `run_batch` above has
            // already been awaited to completion, so this just gives the
            // caller's status transition a uniform grace window to land on.
            let _ = tokio::time::timeout(cancel_grace, async {}).await;
            return Ok(());
        }

        Self::sweep_stale_entities(&worker_pool, sync_id, job_id, &seen_keys, &seen_definitions, &batch_ctx).await?;

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_batch(
        pipeline: &EntityPipeline,
        resolver: &ActionResolver,
        worker_pool: &WorkerPool,
        sync_id: Uuid,
        job_id: Uuid,
        cancellation: &CancellationToken,
        raw_batch: Vec<Entity>,
        seen_keys: &mut HashSet<EntityKey>,
        seen_definitions: &mut HashSet<String>,
        ctx: &BatchContext<'_>,
    ) -> Result<(), SyncFailureError> {
        let multiplied: Vec<Entity> = raw_batch
            .into_iter()
            .flat_map(|entity| if entity.is_deletion() { vec![entity] } else { pipeline.multiply(entity, None) })
            .collect();

        let hashed = pipeline.hash_batch(multiplied).await?;

        for entity in &hashed {
            if entity.is_deletion() {
                continue;
            }
            let Some(definition_id) = entity.entity_definition_id() else {
                continue;
            };
            if definition_id.as_str() == airweave_entities::RESERVED_TABLE_ENTITY_ID {
                continue;
            }
            if ctx.entity_definition_map.resolve(definition_id.as_str()).is_none() {
                return Err(SyncFailureError::UnknownEntityDefinition {
                    entity_id: entity.entity_id().to_string(),
                    entity_definition_id: definition_id.as_str().to_string(),
                });
            }
        }

        let embedded = match ctx.embedder {
            Some(embedder) => pipeline.embed_batch(embedder, hashed).await?,
            None => hashed,
        };

        for entity in &embedded {
            if entity.is_deletion() {
                continue;
            }
            if let Some(definition_id) = entity.entity_definition_id() {
                seen_definitions.insert(definition_id.as_str().to_string());
                seen_keys.insert(EntityKey {
                    entity_id: entity.entity_id().to_string(),
                    entity_definition_id: definition_id.as_str().to_string(),
                });
            }
        }

        let batch = resolver
            .resolve(sync_id, ctx.collection_id, ctx.dedupe_by_collection, embedded, ctx.execution_config)
            .await?;

        let stats = worker_pool
            .run_batch(
                sync_id,
                ctx.collection_id,
                ctx.dag_producer,
                ctx.router.clone(),
                ctx.destinations.clone(),
                ctx.db.clone(),
                batch,
                cancellation.clone(),
            )
            .await?;

        report_batch(ctx.db, ctx.progress, job_id, stats).await
    }

    async fn sweep_stale_entities(
        worker_pool: &WorkerPool,
        sync_id: Uuid,
        job_id: Uuid,
        seen_keys: &HashSet<EntityKey>,
        seen_definitions: &HashSet<String>,
        ctx: &BatchContext<'_>,
    ) -> Result<(), SyncFailureError> {
        let mut stale = EntityActionBatch::default();
        for definition_id in seen_definitions {
            let existing = ctx.db.list_entity_keys_by_definition(sync_id, definition_id.clone()).await?;
            for key in existing {
                if !seen_keys.contains(&key) {
                    stale.deletes.push(Entity::Deletion(DeletionEntity::new(key.entity_id)));
                }
            }
        }
        if stale.deletes.is_empty() {
            return Ok(());
        }

        let stats = worker_pool
            .run_batch(
                sync_id,
                ctx.collection_id,
                ctx.dag_producer,
                ctx.router.clone(),
                ctx.destinations.clone(),
                ctx.db.clone(),
                stale,
                CancellationToken::new(),
            )
            .await?;

        report_batch(ctx.db, ctx.progress, job_id, stats).await
    }
}

async fn report_batch(
    db: &DbActorHandle,
    progress: &ProgressPublisher,
    job_id: Uuid,
    stats: WorkerBatchStats,
) -> Result<(), SyncFailureError> {
    db.increment_job_counters(job_id, stats.inserted, stats.updated, stats.kept, stats.deleted, 0, stats.failed)
        .await?;
    progress.publish_counts(ProgressCounts {
        inserted: stats.inserted,
        updated: stats.updated,
        kept: stats.kept,
        deleted: stats.deleted,
        skipped: 0,
        failed: stats.failed,
    });
    Ok(())
}

async fn fetch_final_job(db: &DbActorHandle, job_id: Uuid) -> Result<SyncJobRow, SyncFailureError> {
    db.get_sync_job(job_id)
        .await?
        .ok_or_else(|| SyncFailureError::Unexpected(format!("sync job {job_id} vanished after being created")))
}

fn counts_from_job(job: &SyncJobRow) -> ProgressCounts {
    ProgressCounts {
        inserted: job.entities_inserted,
        updated: job.entities_updated,
        kept: job.entities_kept,
        deleted: job.entities_deleted,
        skipped: job.entities_skipped,
        failed: job.entities_failed,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use airweave_entities::{EntityDefinitionId, StandardEntity};
    use async_trait::async_trait;
    use futures::stream::BoxStream;

    use super::*;
    use crate::dag::{Dag, DagEdge, DagNode, TransformerRegistry};
    use crate::error::{DestinationError, SourceError};
    use crate::token_manager::TokenSource;

    struct FakeSource {
        entities: Mutex<Option<Vec<Entity>>>,
    }

    #[async_trait]
    impl RunningSource for FakeSource {
        fn set_token_manager(&mut self, _token_manager: Arc<TokenManager>) {}
        fn set_file_downloader(&mut self, _file_service: Arc<FileService>) {}

        async fn validate(&self) -> bool {
            true
        }

        fn generate_entities(&self) -> BoxStream<'_, Result<Entity, SourceError>> {
            let entities = self.entities.lock().unwrap().take().unwrap_or_default();
            Box::pin(futures::stream::iter(entities.into_iter().map(Ok)))
        }
    }

    struct FakeVectorDestination {
        inserted: Mutex<usize>,
    }

    #[async_trait]
    impl crate::destinations::VectorDestination for FakeVectorDestination {
        fn processing_requirement(&self) -> crate::destinations::ProcessingRequirement {
            crate::destinations::ProcessingRequirement::PreEmbedded
        }
        async fn setup_collection(&self, _collection_id: &str, _vector_size: usize) -> Result<(), DestinationError> {
            Ok(())
        }
        async fn bulk_insert(&self, _collection_id: &str, entities: &[Entity]) -> Result<(), DestinationError> {
            *self.inserted.lock().unwrap() += entities.len();
            Ok(())
        }
        async fn bulk_insert_raw(&self, _collection_id: &str, _entities: &[Entity]) -> Result<(), DestinationError> {
            Ok(())
        }
        async fn delete(&self, _collection_id: &str, _entity_id: &str) -> Result<(), DestinationError> {
            Ok(())
        }
        async fn bulk_delete(&self, _collection_id: &str, _entity_ids: &[String]) -> Result<(), DestinationError> {
            Ok(())
        }
        async fn bulk_delete_by_parent_id(
            &self,
            _collection_id: &str,
            _parent_entity_id: &str,
        ) -> Result<(), DestinationError> {
            Ok(())
        }
        async fn delete_by_sync_id(&self, _collection_id: &str, _sync_id: Uuid) -> Result<(), DestinationError> {
            Ok(())
        }
    }

    fn make_context(db: DbActorHandle, entities: Vec<Entity>, destination: Arc<FakeVectorDestination>) -> SyncContext {
        let config = SyncEngineConfig::default();
        let source_node = DagNodeId("source".to_string());
        let destination_node = DagNodeId("destination".to_string());
        let dag = Dag {
            nodes: vec![
                DagNode::Source { id: source_node.clone() },
                DagNode::Destination { id: destination_node.clone(), name: "dest".to_string() },
            ],
            edges: vec![DagEdge { from: source_node.clone(), to: destination_node, entity_definition_filter: None }],
        };
        let router = Arc::new(DagRouter::new(dag, TransformerRegistry::new()).unwrap());

        let mut destinations = Destinations::new("collection-1");
        destinations.register_vector("dest", destination);

        let mut entity_definition_map = EntityDefinitionRegistry::new();
        entity_definition_map.register("asana_task", airweave_entities::EntityDefinitionId::new("asana_task"));

        SyncContext {
            sync_name: "orchestrator-test".to_string(),
            collection_id: "collection-1".to_string(),
            dedupe_by_collection: false,
            source: Box::new(FakeSource { entities: Mutex::new(Some(entities)) }),
            destinations: Arc::new(destinations),
            router,
            dag_producer: source_node,
            token_manager: Arc::new(TokenManager::new(TokenSource::DirectInjection("token".into()), &config)),
            file_service: Arc::new(FileService::new(&config)),
            db,
            embedder: None,
            entity_definition_map,
            execution_config: ActionResolverConfig::default(),
            config,
        }
    }

    fn entity(id: &str) -> Entity {
        Entity::Standard(StandardEntity::new(id, EntityDefinitionId::new("asana_task")))
    }

    #[tokio::test]
    async fn run_inserts_entities_and_completes() {
        let db = crate::db::spawn("sqlite::memory:").await;
        let destination = Arc::new(FakeVectorDestination { inserted: Mutex::new(0) });
        let context = make_context(db, vec![entity("task-1"), entity("task-2")], destination.clone());

        let job = Orchestrator::run(context, CancellationToken::new()).await.unwrap();

        assert_eq!(job.status(), SyncJobStatus::Completed);
        assert_eq!(job.entities_inserted, 2);
        assert_eq!(*destination.inserted.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn run_fails_on_unknown_entity_definition() {
        let db = crate::db::spawn("sqlite::memory:").await;
        let destination = Arc::new(FakeVectorDestination { inserted: Mutex::new(0) });
        let unknown = Entity::Standard(StandardEntity::new("task-x", EntityDefinitionId::new("unmapped_kind")));
        let context = make_context(db, vec![unknown], destination);

        let job = Orchestrator::run(context, CancellationToken::new()).await.unwrap();

        assert_eq!(job.status(), SyncJobStatus::Failed);
        assert!(job.error.unwrap().contains("unmapped_kind"));
    }

    #[tokio::test]
    async fn run_stops_early_when_cancelled_before_start() {
        let db = crate::db::spawn("sqlite::memory:").await;
        let destination = Arc::new(FakeVectorDestination { inserted: Mutex::new(0) });
        let mut context = make_context(db, vec![entity("task-1")], destination.clone());
        context.config.cancel_grace_seconds = 0;

        let cancellation = CancellationToken::new();
        cancellation.cancel();

        let job = Orchestrator::run(context, cancellation).await.unwrap();

        assert_eq!(job.status(), SyncJobStatus::Cancelled);
        assert_eq!(*destination.inserted.lock().unwrap(), 0);
    }
}
