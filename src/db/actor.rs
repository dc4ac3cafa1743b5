use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use super::models::{CollectionRow, EntityKey, EntityRow, SyncCursorRow, SyncJobRow, SyncJobStatus, SyncRow};
use super::schema::SQLITE_INIT;
use crate::error::SyncFailureError;

/// One upsert request for an entity row, produced by the resolver/worker
/// once an entity has been hashed and classified as INSERT or UPDATE.
#[derive(Debug, Clone)]
pub struct EntityUpsert {
    pub sync_id: Uuid,
    pub entity_id: String,
    pub entity_definition_id: String,
    pub hash: String,
    pub collection_id: String,
    pub skip_content_handlers: bool,
}

#[derive(Debug)]
pub enum DbActorMessage {
    CreateSync {
        name: String,
        collection_id: String,
        dedupe_by_collection: bool,
        reply: RpcReplyPort<Result<SyncRow, SyncFailureError>>,
    },
    GetSync(Uuid, RpcReplyPort<Result<Option<SyncRow>, SyncFailureError>>),

    CreateSyncJob(Uuid, Uuid, RpcReplyPort<Result<SyncJobRow, SyncFailureError>>),
    SetSyncJobStatus {
        job_id: Uuid,
        status: SyncJobStatus,
        error: Option<String>,
        stack_trace: Option<String>,
        reply: RpcReplyPort<Result<(), SyncFailureError>>,
    },
    IncrementJobCounters {
        job_id: Uuid,
        inserted: i64,
        updated: i64,
        kept: i64,
        deleted: i64,
        skipped: i64,
        failed: i64,
        reply: RpcReplyPort<Result<(), SyncFailureError>>,
    },
    GetSyncJob(Uuid, RpcReplyPort<Result<Option<SyncJobRow>, SyncFailureError>>),

    GetOrCreateCollection(String, RpcReplyPort<Result<CollectionRow, SyncFailureError>>),
    StampCollectionEmbeddingConfig {
        collection_id: String,
        embedding_model_name: String,
        vector_size: i64,
        reply: RpcReplyPort<Result<(), SyncFailureError>>,
    },

    GetSyncCursor(Uuid, RpcReplyPort<Result<Option<SyncCursorRow>, SyncFailureError>>),
    SetSyncCursor {
        sync_id: Uuid,
        cursor_data: String,
        reply: RpcReplyPort<Result<(), SyncFailureError>>,
    },

    /// The core §6 query: bulk-read entity rows by `(entity_id,
    /// entity_definition_id)` keys scoped to one sync, chunked internally at
    /// `chunk_size`.
    BulkGetBySyncAndDefinition {
        sync_id: Uuid,
        keys: Vec<EntityKey>,
        chunk_size: usize,
        reply: RpcReplyPort<Result<Vec<EntityRow>, SyncFailureError>>,
    },

    /// The optional second lookup at collection scope, used when
    /// `dedupe_by_collection` is set on the sync.
    BulkGetByCollectionAndDefinition {
        collection_id: String,
        keys: Vec<EntityKey>,
        chunk_size: usize,
        reply: RpcReplyPort<Result<Vec<EntityRow>, SyncFailureError>>,
    },

    UpsertEntities(Vec<EntityUpsert>, RpcReplyPort<Result<(), SyncFailureError>>),
    DeleteEntities {
        sync_id: Uuid,
        keys: Vec<EntityKey>,
        reply: RpcReplyPort<Result<(), SyncFailureError>>,
    },

    /// All entity keys currently on record for one `(sync_id,
    /// entity_definition_id)` pair, used by the orchestrator's end-of-sync
    /// stale-entity sweep to find rows this run never touched.
    ListEntityKeysByDefinition {
        sync_id: Uuid,
        entity_definition_id: String,
        reply: RpcReplyPort<Result<Vec<EntityKey>, SyncFailureError>>,
    },
}

#[derive(Clone)]
pub struct DbActorHandle {
    actor: ActorRef<DbActorMessage>,
}

macro_rules! call {
    ($self:expr, |$reply:ident| $variant:expr) => {
        ractor::call!($self.actor, |$reply| $variant)
            .map_err(|e| SyncFailureError::Unexpected(format!("DbActor RPC failed: {e}")))?
    };
}

impl DbActorHandle {
    pub async fn create_sync(
        &self,
        name: String,
        collection_id: String,
        dedupe_by_collection: bool,
    ) -> Result<SyncRow, SyncFailureError> {
        call!(self, DbActorMessage::CreateSync {
            name,
            collection_id,
            dedupe_by_collection,
            reply
        })
    }

    pub async fn get_sync(&self, sync_id: Uuid) -> Result<Option<SyncRow>, SyncFailureError> {
        call!(self, DbActorMessage::GetSync(sync_id, reply))
    }

    /// `job_id` is generated by the caller (not this store) so it can be
    /// threaded into a [`crate::progress::ProgressPublisher`] before the
    /// row exists — the publisher needs a stable id from its very first
    /// event, and that event fires before this insert returns.
    pub async fn create_sync_job(&self, sync_id: Uuid, job_id: Uuid) -> Result<SyncJobRow, SyncFailureError> {
        call!(self, DbActorMessage::CreateSyncJob(sync_id, job_id, reply))
    }

    pub async fn set_sync_job_status(
        &self,
        job_id: Uuid,
        status: SyncJobStatus,
        error: Option<String>,
        stack_trace: Option<String>,
    ) -> Result<(), SyncFailureError> {
        call!(self, DbActorMessage::SetSyncJobStatus {
            job_id,
            status,
            error,
            stack_trace,
            reply
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn increment_job_counters(
        &self,
        job_id: Uuid,
        inserted: i64,
        updated: i64,
        kept: i64,
        deleted: i64,
        skipped: i64,
        failed: i64,
    ) -> Result<(), SyncFailureError> {
        call!(self, DbActorMessage::IncrementJobCounters {
            job_id,
            inserted,
            updated,
            kept,
            deleted,
            skipped,
            failed,
            reply
        })
    }

    pub async fn get_sync_job(&self, job_id: Uuid) -> Result<Option<SyncJobRow>, SyncFailureError> {
        call!(self, DbActorMessage::GetSyncJob(job_id, reply))
    }

    pub async fn get_or_create_collection(
        &self,
        collection_id: String,
    ) -> Result<CollectionRow, SyncFailureError> {
        call!(self, DbActorMessage::GetOrCreateCollection(collection_id, reply))
    }

    pub async fn stamp_collection_embedding_config(
        &self,
        collection_id: String,
        embedding_model_name: String,
        vector_size: i64,
    ) -> Result<(), SyncFailureError> {
        call!(self, DbActorMessage::StampCollectionEmbeddingConfig {
            collection_id,
            embedding_model_name,
            vector_size,
            reply
        })
    }

    pub async fn get_sync_cursor(&self, sync_id: Uuid) -> Result<Option<SyncCursorRow>, SyncFailureError> {
        call!(self, DbActorMessage::GetSyncCursor(sync_id, reply))
    }

    pub async fn set_sync_cursor(&self, sync_id: Uuid, cursor_data: String) -> Result<(), SyncFailureError> {
        call!(self, DbActorMessage::SetSyncCursor {
            sync_id,
            cursor_data,
            reply
        })
    }

    pub async fn bulk_get_by_sync_and_definition(
        &self,
        sync_id: Uuid,
        keys: Vec<EntityKey>,
        chunk_size: usize,
    ) -> Result<Vec<EntityRow>, SyncFailureError> {
        call!(self, DbActorMessage::BulkGetBySyncAndDefinition {
            sync_id,
            keys,
            chunk_size,
            reply
        })
    }

    pub async fn bulk_get_by_collection_and_definition(
        &self,
        collection_id: String,
        keys: Vec<EntityKey>,
        chunk_size: usize,
    ) -> Result<Vec<EntityRow>, SyncFailureError> {
        call!(self, DbActorMessage::BulkGetByCollectionAndDefinition {
            collection_id,
            keys,
            chunk_size,
            reply
        })
    }

    pub async fn upsert_entities(&self, upserts: Vec<EntityUpsert>) -> Result<(), SyncFailureError> {
        call!(self, DbActorMessage::UpsertEntities(upserts, reply))
    }

    pub async fn delete_entities(&self, sync_id: Uuid, keys: Vec<EntityKey>) -> Result<(), SyncFailureError> {
        call!(self, DbActorMessage::DeleteEntities { sync_id, keys, reply })
    }

    pub async fn list_entity_keys_by_definition(
        &self,
        sync_id: Uuid,
        entity_definition_id: String,
    ) -> Result<Vec<EntityKey>, SyncFailureError> {
        call!(self, DbActorMessage::ListEntityKeysByDefinition {
            sync_id,
            entity_definition_id,
            reply
        })
    }
}

struct DbActorState {
    pool: SqlitePool,
}

struct DbActor;

#[ractor::async_trait]
impl Actor for DbActor {
    type Msg = DbActorMessage;
    type State = DbActorState;
    type Arguments = String;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        database_url: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let connect_opts = SqliteConnectOptions::from_str(database_url.as_str())
            .map_err(|e| ActorProcessingErr::from(format!("invalid database url: {e}")))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5))
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .connect_with(connect_opts)
            .await
            .map_err(|e| ActorProcessingErr::from(format!("db connect failed: {e}")))?;

        apply_schema(&pool)
            .await
            .map_err(|e| ActorProcessingErr::from(format!("db schema init failed: {e}")))?;

        info!("DbActor initialized");
        Ok(DbActorState { pool })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            DbActorMessage::CreateSync {
                name,
                collection_id,
                dedupe_by_collection,
                reply,
            } => {
                let res = self.create_sync(&state.pool, name, collection_id, dedupe_by_collection).await;
                let _ = reply.send(res);
            }
            DbActorMessage::GetSync(id, reply) => {
                let res = self.get_sync(&state.pool, id).await;
                let _ = reply.send(res);
            }
            DbActorMessage::CreateSyncJob(sync_id, job_id, reply) => {
                let res = self.create_sync_job(&state.pool, sync_id, job_id).await;
                let _ = reply.send(res);
            }
            DbActorMessage::SetSyncJobStatus {
                job_id,
                status,
                error,
                stack_trace,
                reply,
            } => {
                let res = self.set_sync_job_status(&state.pool, job_id, status, error, stack_trace).await;
                let _ = reply.send(res);
            }
            DbActorMessage::IncrementJobCounters {
                job_id,
                inserted,
                updated,
                kept,
                deleted,
                skipped,
                failed,
                reply,
            } => {
                let res = self
                    .increment_job_counters(&state.pool, job_id, inserted, updated, kept, deleted, skipped, failed)
                    .await;
                let _ = reply.send(res);
            }
            DbActorMessage::GetSyncJob(id, reply) => {
                let res = self.get_sync_job(&state.pool, id).await;
                let _ = reply.send(res);
            }
            DbActorMessage::GetOrCreateCollection(id, reply) => {
                let res = self.get_or_create_collection(&state.pool, id).await;
                let _ = reply.send(res);
            }
            DbActorMessage::StampCollectionEmbeddingConfig {
                collection_id,
                embedding_model_name,
                vector_size,
                reply,
            } => {
                let res = self
                    .stamp_collection_embedding_config(&state.pool, collection_id, embedding_model_name, vector_size)
                    .await;
                let _ = reply.send(res);
            }
            DbActorMessage::GetSyncCursor(sync_id, reply) => {
                let res = self.get_sync_cursor(&state.pool, sync_id).await;
                let _ = reply.send(res);
            }
            DbActorMessage::SetSyncCursor { sync_id, cursor_data, reply } => {
                let res = self.set_sync_cursor(&state.pool, sync_id, cursor_data).await;
                let _ = reply.send(res);
            }
            DbActorMessage::BulkGetBySyncAndDefinition { sync_id, keys, chunk_size, reply } => {
                let res = self.bulk_get_by_sync_and_definition(&state.pool, sync_id, keys, chunk_size).await;
                let _ = reply.send(res);
            }
            DbActorMessage::BulkGetByCollectionAndDefinition { collection_id, keys, chunk_size, reply } => {
                let res = self
                    .bulk_get_by_collection_and_definition(&state.pool, collection_id, keys, chunk_size)
                    .await;
                let _ = reply.send(res);
            }
            DbActorMessage::UpsertEntities(upserts, reply) => {
                let res = self.upsert_entities(&state.pool, upserts).await;
                let _ = reply.send(res);
            }
            DbActorMessage::DeleteEntities { sync_id, keys, reply } => {
                let res = self.delete_entities(&state.pool, sync_id, keys).await;
                let _ = reply.send(res);
            }
            DbActorMessage::ListEntityKeysByDefinition { sync_id, entity_definition_id, reply } => {
                let res = self
                    .list_entity_keys_by_definition(&state.pool, sync_id, entity_definition_id)
                    .await;
                let _ = reply.send(res);
            }
        }
        Ok(())
    }
}

impl DbActor {
    async fn create_sync(
        &self,
        pool: &SqlitePool,
        name: String,
        collection_id: String,
        dedupe_by_collection: bool,
    ) -> Result<SyncRow, SyncFailureError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO syncs (id, name, collection_id, dedupe_by_collection, created_at, modified_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&name)
        .bind(&collection_id)
        .bind(dedupe_by_collection)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        Ok(SyncRow {
            id,
            name,
            collection_id,
            dedupe_by_collection,
            created_at: now,
            modified_at: now,
        })
    }

    async fn get_sync(&self, pool: &SqlitePool, sync_id: Uuid) -> Result<Option<SyncRow>, SyncFailureError> {
        let row = sqlx::query_as::<_, SyncRow>("SELECT * FROM syncs WHERE id = ?")
            .bind(sync_id.to_string())
            .fetch_optional(pool)
            .await?;
        Ok(row)
    }

    async fn create_sync_job(&self, pool: &SqlitePool, sync_id: Uuid, id: Uuid) -> Result<SyncJobRow, SyncFailureError> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO sync_jobs (id, sync_id, status, created_at, modified_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(sync_id.to_string())
        .bind(SyncJobStatus::Pending.as_str())
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        Ok(SyncJobRow {
            id: id.to_string(),
            sync_id: sync_id.to_string(),
            status: SyncJobStatus::Pending.as_str().to_string(),
            entities_inserted: 0,
            entities_updated: 0,
            entities_kept: 0,
            entities_deleted: 0,
            entities_skipped: 0,
            entities_failed: 0,
            error: None,
            stack_trace: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            modified_at: now,
        })
    }

    async fn set_sync_job_status(
        &self,
        pool: &SqlitePool,
        job_id: Uuid,
        status: SyncJobStatus,
        error: Option<String>,
        stack_trace: Option<String>,
    ) -> Result<(), SyncFailureError> {
        let now = Utc::now();
        let started_at = matches!(status, SyncJobStatus::Running).then_some(now);
        let completed_at = status.is_terminal().then_some(now);

        sqlx::query(
            "UPDATE sync_jobs
             SET status = ?,
                 error = COALESCE(?, error),
                 stack_trace = COALESCE(?, stack_trace),
                 started_at = COALESCE(started_at, ?),
                 completed_at = COALESCE(completed_at, ?),
                 modified_at = ?
             WHERE id = ? AND status NOT IN ('COMPLETED', 'FAILED', 'CANCELLED')",
        )
        .bind(status.as_str())
        .bind(error)
        .bind(stack_trace)
        .bind(started_at)
        .bind(completed_at)
        .bind(now)
        .bind(job_id.to_string())
        .execute(pool)
        .await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn increment_job_counters(
        &self,
        pool: &SqlitePool,
        job_id: Uuid,
        inserted: i64,
        updated: i64,
        kept: i64,
        deleted: i64,
        skipped: i64,
        failed: i64,
    ) -> Result<(), SyncFailureError> {
        sqlx::query(
            "UPDATE sync_jobs SET
                entities_inserted = entities_inserted + ?,
                entities_updated = entities_updated + ?,
                entities_kept = entities_kept + ?,
                entities_deleted = entities_deleted + ?,
                entities_skipped = entities_skipped + ?,
                entities_failed = entities_failed + ?,
                modified_at = ?
             WHERE id = ?",
        )
        .bind(inserted)
        .bind(updated)
        .bind(kept)
        .bind(deleted)
        .bind(skipped)
        .bind(failed)
        .bind(Utc::now())
        .bind(job_id.to_string())
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn get_sync_job(&self, pool: &SqlitePool, job_id: Uuid) -> Result<Option<SyncJobRow>, SyncFailureError> {
        let row = sqlx::query_as::<_, SyncJobRow>("SELECT * FROM sync_jobs WHERE id = ?")
            .bind(job_id.to_string())
            .fetch_optional(pool)
            .await?;
        Ok(row)
    }

    async fn get_or_create_collection(
        &self,
        pool: &SqlitePool,
        collection_id: String,
    ) -> Result<CollectionRow, SyncFailureError> {
        if let Some(row) = sqlx::query_as::<_, CollectionRow>("SELECT * FROM collections WHERE id = ?")
            .bind(&collection_id)
            .fetch_optional(pool)
            .await?
        {
            return Ok(row);
        }
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO collections (id, created_at, modified_at) VALUES (?, ?, ?)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(&collection_id)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(CollectionRow {
            id: collection_id,
            embedding_model_name: None,
            vector_size: None,
            created_at: now,
            modified_at: now,
        })
    }

    async fn stamp_collection_embedding_config(
        &self,
        pool: &SqlitePool,
        collection_id: String,
        embedding_model_name: String,
        vector_size: i64,
    ) -> Result<(), SyncFailureError> {
        // Stamp only while unset: the first sync to touch a fresh collection
        // decides its embedding config; later syncs must match it, which is
        // enforced by the caller comparing against the (now-stamped) row.
        sqlx::query(
            "UPDATE collections SET
                embedding_model_name = COALESCE(embedding_model_name, ?),
                vector_size = COALESCE(vector_size, ?),
                modified_at = ?
             WHERE id = ?",
        )
        .bind(embedding_model_name)
        .bind(vector_size)
        .bind(Utc::now())
        .bind(collection_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn get_sync_cursor(
        &self,
        pool: &SqlitePool,
        sync_id: Uuid,
    ) -> Result<Option<SyncCursorRow>, SyncFailureError> {
        let row = sqlx::query_as::<_, SyncCursorRow>("SELECT * FROM sync_cursors WHERE sync_id = ?")
            .bind(sync_id.to_string())
            .fetch_optional(pool)
            .await?;
        Ok(row)
    }

    async fn set_sync_cursor(
        &self,
        pool: &SqlitePool,
        sync_id: Uuid,
        cursor_data: String,
    ) -> Result<(), SyncFailureError> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO sync_cursors (sync_id, cursor_data, modified_at) VALUES (?, ?, ?)
             ON CONFLICT(sync_id) DO UPDATE SET cursor_data = excluded.cursor_data, modified_at = excluded.modified_at",
        )
        .bind(sync_id.to_string())
        .bind(cursor_data)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn bulk_get_by_sync_and_definition(
        &self,
        pool: &SqlitePool,
        sync_id: Uuid,
        keys: Vec<EntityKey>,
        chunk_size: usize,
    ) -> Result<Vec<EntityRow>, SyncFailureError> {
        let sync_id = sync_id.to_string();
        let mut out = Vec::with_capacity(keys.len());
        for chunk in keys.chunks(chunk_size.max(1)) {
            let placeholders = chunk.iter().map(|_| "(?, ?)").collect::<Vec<_>>().join(", ");
            let sql = format!(
                "SELECT * FROM entities WHERE sync_id = ? AND (entity_id, entity_definition_id) IN ({placeholders})"
            );
            let mut query = sqlx::query_as::<_, EntityRow>(&sql).bind(&sync_id);
            for key in chunk {
                query = query.bind(&key.entity_id).bind(&key.entity_definition_id);
            }
            out.extend(query.fetch_all(pool).await?);
        }
        Ok(out)
    }

    async fn bulk_get_by_collection_and_definition(
        &self,
        pool: &SqlitePool,
        collection_id: String,
        keys: Vec<EntityKey>,
        chunk_size: usize,
    ) -> Result<Vec<EntityRow>, SyncFailureError> {
        let mut out = Vec::with_capacity(keys.len());
        for chunk in keys.chunks(chunk_size.max(1)) {
            let placeholders = chunk.iter().map(|_| "(?, ?)").collect::<Vec<_>>().join(", ");
            let sql = format!(
                "SELECT * FROM entities WHERE collection_id = ? AND (entity_id, entity_definition_id) IN ({placeholders})"
            );
            let mut query = sqlx::query_as::<_, EntityRow>(&sql).bind(&collection_id);
            for key in chunk {
                query = query.bind(&key.entity_id).bind(&key.entity_definition_id);
            }
            out.extend(query.fetch_all(pool).await?);
        }
        Ok(out)
    }

    async fn upsert_entities(&self, pool: &SqlitePool, upserts: Vec<EntityUpsert>) -> Result<(), SyncFailureError> {
        let now = Utc::now();
        let mut tx = pool.begin().await?;
        for u in upserts {
            sqlx::query(
                "INSERT INTO entities
                    (id, sync_id, entity_id, entity_definition_id, hash, collection_id,
                     skip_content_handlers, created_at, modified_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(sync_id, entity_id, entity_definition_id) DO UPDATE SET
                    hash = excluded.hash,
                    skip_content_handlers = excluded.skip_content_handlers,
                    modified_at = excluded.modified_at",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(u.sync_id.to_string())
            .bind(&u.entity_id)
            .bind(&u.entity_definition_id)
            .bind(&u.hash)
            .bind(&u.collection_id)
            .bind(u.skip_content_handlers)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_entity_keys_by_definition(
        &self,
        pool: &SqlitePool,
        sync_id: Uuid,
        entity_definition_id: String,
    ) -> Result<Vec<EntityKey>, SyncFailureError> {
        let rows = sqlx::query_as::<_, EntityRow>(
            "SELECT * FROM entities WHERE sync_id = ? AND entity_definition_id = ?",
        )
        .bind(sync_id.to_string())
        .bind(entity_definition_id)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.key()).collect())
    }

    async fn delete_entities(
        &self,
        pool: &SqlitePool,
        sync_id: Uuid,
        keys: Vec<EntityKey>,
    ) -> Result<(), SyncFailureError> {
        let sync_id = sync_id.to_string();
        let mut tx = pool.begin().await?;
        for key in keys {
            sqlx::query("DELETE FROM entities WHERE sync_id = ? AND entity_id = ? AND entity_definition_id = ?")
                .bind(&sync_id)
                .bind(&key.entity_id)
                .bind(&key.entity_definition_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

pub async fn spawn(database_url: &str) -> DbActorHandle {
    let (actor, _jh) = ractor::Actor::spawn(Some("DbActor".to_string()), DbActor, database_url.to_string())
        .await
        .expect("failed to spawn DbActor");

    DbActorHandle { actor }
}

async fn apply_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for stmt in SQLITE_INIT.split(';') {
        let s = stmt.trim();
        if s.is_empty() {
            continue;
        }
        sqlx::query(s).execute(pool).await?;
    }
    Ok(())
}
