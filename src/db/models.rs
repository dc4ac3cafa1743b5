use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// `Sync.status`/`SyncJob.status` state machine:
/// `Pending -> Running -> {Completed, Failed, Cancelling -> Cancelled}`.
/// Terminal states (`Completed`, `Failed`, `Cancelled`) never transition
/// further; `SyncJob` rows in a terminal state are treated as immutable by
/// every write path in `db::actor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncJobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelling,
    Cancelled,
}

impl SyncJobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncJobStatus::Pending => "PENDING",
            SyncJobStatus::Running => "RUNNING",
            SyncJobStatus::Completed => "COMPLETED",
            SyncJobStatus::Failed => "FAILED",
            SyncJobStatus::Cancelling => "CANCELLING",
            SyncJobStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SyncJobStatus::Completed | SyncJobStatus::Failed | SyncJobStatus::Cancelled
        )
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(SyncJobStatus::Pending),
            "RUNNING" => Some(SyncJobStatus::Running),
            "COMPLETED" => Some(SyncJobStatus::Completed),
            "FAILED" => Some(SyncJobStatus::Failed),
            "CANCELLING" => Some(SyncJobStatus::Cancelling),
            "CANCELLED" => Some(SyncJobStatus::Cancelled),
            _ => None,
        }
    }
}

/// Row shape as it comes back from sqlite; `status` is stored as the
/// uppercase tag from [`SyncJobStatus::as_str`] and decoded on read via
/// [`SyncJobRow::status`].
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SyncJobRow {
    pub id: String,
    pub sync_id: String,
    pub status: String,
    pub entities_inserted: i64,
    pub entities_updated: i64,
    pub entities_kept: i64,
    pub entities_deleted: i64,
    pub entities_skipped: i64,
    pub entities_failed: i64,
    pub error: Option<String>,
    pub stack_trace: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl SyncJobRow {
    pub fn status(&self) -> SyncJobStatus {
        SyncJobStatus::parse(&self.status).unwrap_or(SyncJobStatus::Failed)
    }

    pub fn job_id(&self) -> Uuid {
        Uuid::parse_str(&self.id).unwrap_or_default()
    }

    pub fn sync_uuid(&self) -> Uuid {
        Uuid::parse_str(&self.sync_id).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SyncRow {
    pub id: String,
    pub name: String,
    pub collection_id: String,
    pub dedupe_by_collection: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CollectionRow {
    pub id: String,
    pub embedding_model_name: Option<String>,
    pub vector_size: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SyncCursorRow {
    pub sync_id: String,
    pub cursor_data: String,
    pub modified_at: DateTime<Utc>,
}

/// One persisted entity row, the unit the bulk lookup in §6 reads and the
/// resolver's insert/update/delete classification writes back.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EntityRow {
    pub id: String,
    pub sync_id: String,
    pub entity_id: String,
    pub entity_definition_id: String,
    pub hash: String,
    pub collection_id: String,
    pub skip_content_handlers: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// The composite key the resolver looks entities up by. Not `Hash`/`Eq` on
/// `EntityRow` itself since rows carry mutable fields (`hash`,
/// `modified_at`) the key must ignore.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub entity_id: String,
    pub entity_definition_id: String,
}

impl EntityRow {
    pub fn key(&self) -> EntityKey {
        EntityKey {
            entity_id: self.entity_id.clone(),
            entity_definition_id: self.entity_definition_id.clone(),
        }
    }
}
