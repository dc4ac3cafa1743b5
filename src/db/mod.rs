//! Entity/sync-job store: models and schema for persistent storage.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `actor.rs`: the `ractor` actor fronting the `SqlitePool`

pub mod actor;
pub mod models;
pub mod schema;

pub use actor::{spawn, DbActorHandle, EntityUpsert};
pub use models::{CollectionRow, EntityKey, EntityRow, SyncCursorRow, SyncJobRow, SyncJobStatus, SyncRow};
