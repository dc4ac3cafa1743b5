//! SQL DDL for initializing the entity/sync-job store. SQLite-first design.

/// Schema includes:
/// - `syncs` / `sync_jobs` (the sync run state machine)
/// - `collections` (lazily-stamped embedding config)
/// - `sync_cursors` (per-sync incremental-sync cursor)
/// - `entities` (one row per persisted entity, keyed by
///   `(sync_id, entity_id, entity_definition_id)`, the key the bulk lookup in
///   §6 reads and writes)
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS syncs (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    collection_id TEXT NOT NULL,
    dedupe_by_collection INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    modified_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sync_jobs (
    id TEXT PRIMARY KEY NOT NULL,
    sync_id TEXT NOT NULL REFERENCES syncs(id),
    status TEXT NOT NULL,
    entities_inserted INTEGER NOT NULL DEFAULT 0,
    entities_updated INTEGER NOT NULL DEFAULT 0,
    entities_kept INTEGER NOT NULL DEFAULT 0,
    entities_deleted INTEGER NOT NULL DEFAULT 0,
    entities_skipped INTEGER NOT NULL DEFAULT 0,
    entities_failed INTEGER NOT NULL DEFAULT 0,
    error TEXT NULL,
    stack_trace TEXT NULL,
    started_at TEXT NULL,
    completed_at TEXT NULL,
    created_at TEXT NOT NULL,
    modified_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sync_jobs_sync_id ON sync_jobs(sync_id);

CREATE TABLE IF NOT EXISTS collections (
    id TEXT PRIMARY KEY NOT NULL,
    embedding_model_name TEXT NULL,
    vector_size INTEGER NULL,
    created_at TEXT NOT NULL,
    modified_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sync_cursors (
    sync_id TEXT PRIMARY KEY NOT NULL REFERENCES syncs(id),
    cursor_data TEXT NOT NULL,
    modified_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS entities (
    id TEXT PRIMARY KEY NOT NULL,
    sync_id TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    entity_definition_id TEXT NOT NULL,
    hash TEXT NOT NULL,
    collection_id TEXT NOT NULL,
    skip_content_handlers INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    modified_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_entities_sync_entity_def
    ON entities(sync_id, entity_id, entity_definition_id);

CREATE INDEX IF NOT EXISTS idx_entities_collection_entity_def
    ON entities(collection_id, entity_id, entity_definition_id);
"#;
