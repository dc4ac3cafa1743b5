use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use airweave_hash::{HashInput, Hashable};

use crate::breadcrumb::Breadcrumb;
use crate::definition::{reserved_table_entity_id, EntityDefinitionId};
use crate::metadata::AirweaveSystemMetadata;

/// A source-defined entity with a fixed, compile-time-known schema (the
/// common case: an Asana task, a GitHub issue, a Slack message...).
/// `fields` holds everything the source connector extracted beyond the
/// identity columns; kept as a `BTreeMap` so field order never affects the
/// hash (the hash engine also normalizes key order, but a stable iteration
/// order keeps textual-representation rendering stable too).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardEntity {
    pub entity_id: String,
    pub entity_definition_id: EntityDefinitionId,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub fields: BTreeMap<String, Value>,
    pub textual_representation: Option<String>,
    pub airweave_system_metadata: AirweaveSystemMetadata,
}

impl StandardEntity {
    pub fn new(entity_id: impl Into<String>, entity_definition_id: EntityDefinitionId) -> Self {
        Self {
            entity_id: entity_id.into(),
            entity_definition_id,
            breadcrumbs: Vec::new(),
            fields: BTreeMap::new(),
            textual_representation: None,
            airweave_system_metadata: AirweaveSystemMetadata::default(),
        }
    }
}

impl Hashable for StandardEntity {
    fn hash_input(&self) -> HashInput<'_> {
        // entity_id/entity_definition_id/fields are the stable identity and
        // content; breadcrumbs, textual_representation and system metadata
        // are all volatile or derived, so none of them enter the hash.
        HashInput::Json(serde_json::json!({
            "entity_id": self.entity_id,
            "entity_definition_id": self.entity_definition_id.as_str(),
            "fields": self.fields,
        }))
    }
}

/// A downloaded-file entity. `content` is populated transiently by
/// `FileService` for the duration of hashing and upload, then dropped —
/// entities are never persisted with their raw bytes attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntity {
    pub entity_id: String,
    pub entity_definition_id: EntityDefinitionId,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub name: String,
    pub mime_type: Option<String>,
    pub total_size: Option<u64>,
    /// Source-defined metadata excluding `download_url`: a URL change alone
    /// must never change the hash, only a rename or a content change does.
    pub source_metadata: BTreeMap<String, Value>,
    /// Set on code-file entities (a source control connector's file
    /// listing); `None` for every other kind of downloaded file.
    pub commit_id: Option<String>,
    pub sha: Option<String>,
    pub language: Option<String>,
    #[serde(skip)]
    pub content: Option<Vec<u8>>,
    pub airweave_system_metadata: AirweaveSystemMetadata,
}

impl FileEntity {
    pub fn new(entity_id: impl Into<String>, entity_definition_id: EntityDefinitionId, name: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            entity_definition_id,
            breadcrumbs: Vec::new(),
            name: name.into(),
            mime_type: None,
            total_size: None,
            source_metadata: BTreeMap::new(),
            commit_id: None,
            sha: None,
            language: None,
            content: None,
            airweave_system_metadata: AirweaveSystemMetadata::default(),
        }
    }

    /// Marks this as a code-file entity so its hash folds in
    /// `commit_id`/`sha`/`language` alongside content and metadata.
    pub fn with_code_attrs(
        mut self,
        commit_id: impl Into<String>,
        sha: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        self.commit_id = Some(commit_id.into());
        self.sha = Some(sha.into());
        self.language = Some(language.into());
        self
    }

    fn metadata_value(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "mime_type": self.mime_type,
            "total_size": self.total_size,
            "source_metadata": self.source_metadata,
        })
    }

    fn is_code_file(&self) -> bool {
        self.commit_id.is_some() || self.sha.is_some() || self.language.is_some()
    }
}

impl Hashable for FileEntity {
    fn hash_input(&self) -> HashInput<'_> {
        let content = self.content.as_deref().unwrap_or(&[]);
        if self.is_code_file() {
            HashInput::CodeFileBytes {
                content,
                metadata: self.metadata_value(),
                commit_id: self.commit_id.clone(),
                sha: self.sha.clone(),
                language: self.language.clone(),
            }
        } else {
            HashInput::FileBytes { content, metadata: self.metadata_value() }
        }
    }
}

/// A piece of a parent `StandardEntity`/`FileEntity` produced by chunking.
/// `entity_id` is always `{parent_entity_id}.__chunk_{chunk_index}`;
/// `original_entity_id`/`chunk_index` live in `airweave_system_metadata`
/// rather than on the struct itself so both chunk and non-chunk entities
/// share the same system-metadata slot the pipeline stamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkEntity {
    pub entity_id: String,
    pub entity_definition_id: EntityDefinitionId,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub chunk_text: String,
    pub airweave_system_metadata: AirweaveSystemMetadata,
}

impl ChunkEntity {
    pub fn chunk_id(parent_entity_id: &str, chunk_index: u32) -> String {
        format!("{parent_entity_id}.__chunk_{chunk_index}")
    }

    pub fn new(
        parent_entity_id: &str,
        chunk_index: u32,
        entity_definition_id: EntityDefinitionId,
        chunk_text: impl Into<String>,
    ) -> Self {
        let mut metadata = AirweaveSystemMetadata::default();
        metadata.chunk_index = Some(chunk_index);
        metadata.original_entity_id = Some(parent_entity_id.to_string());
        Self {
            entity_id: Self::chunk_id(parent_entity_id, chunk_index),
            entity_definition_id,
            breadcrumbs: Vec::new(),
            chunk_text: chunk_text.into(),
            airweave_system_metadata: metadata,
        }
    }
}

impl Hashable for ChunkEntity {
    fn hash_input(&self) -> HashInput<'_> {
        HashInput::Json(serde_json::json!({
            "entity_id": self.entity_id,
            "entity_definition_id": self.entity_definition_id.as_str(),
            "chunk_text": self.chunk_text,
        }))
    }
}

/// An entity whose schema is only known at runtime (database-table sources).
/// `entity_definition_id` defaults to [`crate::RESERVED_TABLE_ENTITY_ID`]
/// unless the connector registered a concrete definition for this table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolymorphicEntity {
    pub entity_id: String,
    pub entity_definition_id: EntityDefinitionId,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub table_name: String,
    pub primary_key_columns: Vec<String>,
    pub fields: BTreeMap<String, Value>,
    pub airweave_system_metadata: AirweaveSystemMetadata,
}

impl PolymorphicEntity {
    pub fn new(entity_id: impl Into<String>, table_name: impl Into<String>, primary_key_columns: Vec<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            entity_definition_id: reserved_table_entity_id(),
            breadcrumbs: Vec::new(),
            table_name: table_name.into(),
            primary_key_columns,
            fields: BTreeMap::new(),
            airweave_system_metadata: AirweaveSystemMetadata::default(),
        }
    }
}

impl Hashable for PolymorphicEntity {
    fn hash_input(&self) -> HashInput<'_> {
        HashInput::Json(serde_json::json!({
            "entity_id": self.entity_id,
            "table_name": self.table_name,
            "primary_key_columns": self.primary_key_columns,
            "fields": self.fields,
        }))
    }
}

/// A tombstone: "this `entity_id` no longer exists at the source." Carries
/// no content to hash — `ActionResolver` routes deletions by `entity_id`
/// alone and never consults `airweave_system_metadata.hash` on them, so
/// `compute_hash` here exists only to satisfy `Hashable` uniformly and is
/// never consulted by the resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionEntity {
    pub entity_id: String,
    pub entity_definition_id: Option<EntityDefinitionId>,
}

impl DeletionEntity {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            entity_definition_id: None,
        }
    }
}

impl Hashable for DeletionEntity {
    fn hash_input(&self) -> HashInput<'_> {
        HashInput::Json(serde_json::json!({ "entity_id": self.entity_id }))
    }
}

/// The closed set of entity shapes the pipeline moves through hash, resolve,
/// route and persist. A tagged enum rather than a class hierarchy: every
/// operation on an entity is one `match`, resolved at compile time, with no
/// runtime type resolution needed anywhere in the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Entity {
    Standard(StandardEntity),
    File(FileEntity),
    Chunk(ChunkEntity),
    Polymorphic(PolymorphicEntity),
    Deletion(DeletionEntity),
}

impl Entity {
    pub fn entity_id(&self) -> &str {
        match self {
            Entity::Standard(e) => &e.entity_id,
            Entity::File(e) => &e.entity_id,
            Entity::Chunk(e) => &e.entity_id,
            Entity::Polymorphic(e) => &e.entity_id,
            Entity::Deletion(e) => &e.entity_id,
        }
    }

    pub fn entity_definition_id(&self) -> Option<&EntityDefinitionId> {
        match self {
            Entity::Standard(e) => Some(&e.entity_definition_id),
            Entity::File(e) => Some(&e.entity_definition_id),
            Entity::Chunk(e) => Some(&e.entity_definition_id),
            Entity::Polymorphic(e) => Some(&e.entity_definition_id),
            Entity::Deletion(e) => e.entity_definition_id.as_ref(),
        }
    }

    pub fn breadcrumbs(&self) -> &[Breadcrumb] {
        match self {
            Entity::Standard(e) => &e.breadcrumbs,
            Entity::File(e) => &e.breadcrumbs,
            Entity::Chunk(e) => &e.breadcrumbs,
            Entity::Polymorphic(e) => &e.breadcrumbs,
            Entity::Deletion(_) => &[],
        }
    }

    pub fn is_deletion(&self) -> bool {
        matches!(self, Entity::Deletion(_))
    }

    pub fn system_metadata(&self) -> Option<&AirweaveSystemMetadata> {
        match self {
            Entity::Standard(e) => Some(&e.airweave_system_metadata),
            Entity::File(e) => Some(&e.airweave_system_metadata),
            Entity::Chunk(e) => Some(&e.airweave_system_metadata),
            Entity::Polymorphic(e) => Some(&e.airweave_system_metadata),
            Entity::Deletion(_) => None,
        }
    }

    pub fn system_metadata_mut(&mut self) -> Option<&mut AirweaveSystemMetadata> {
        match self {
            Entity::Standard(e) => Some(&mut e.airweave_system_metadata),
            Entity::File(e) => Some(&mut e.airweave_system_metadata),
            Entity::Chunk(e) => Some(&mut e.airweave_system_metadata),
            Entity::Polymorphic(e) => Some(&mut e.airweave_system_metadata),
            Entity::Deletion(_) => None,
        }
    }
}

impl Hashable for Entity {
    fn hash_input(&self) -> HashInput<'_> {
        match self {
            Entity::Standard(e) => e.hash_input(),
            Entity::File(e) => e.hash_input(),
            Entity::Chunk(e) => e.hash_input(),
            Entity::Polymorphic(e) => e.hash_input(),
            Entity::Deletion(e) => e.hash_input(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(id: &str) -> EntityDefinitionId {
        EntityDefinitionId::new(id)
    }

    #[test]
    fn standard_entity_hash_ignores_breadcrumbs() {
        let mut a = StandardEntity::new("task-1", def("asana_task"));
        a.fields.insert("title".into(), serde_json::json!("Write spec"));
        let mut b = a.clone();
        b.breadcrumbs.push(Breadcrumb::new("Project X", "proj-1"));
        assert_eq!(a.compute_hash(), b.compute_hash());
    }

    #[test]
    fn file_entity_hash_ignores_url_like_fields_outside_metadata() {
        let mut a = FileEntity::new("file-1", def("google_drive_file"), "report.pdf");
        a.content = Some(b"hello".to_vec());
        let b = a.clone();
        // source_metadata deliberately excludes any url field by construction;
        // two entities differing only in a field the caller never put into
        // source_metadata must hash identically.
        assert_eq!(a.compute_hash(), b.compute_hash());
    }

    #[test]
    fn file_entity_rename_changes_hash() {
        let mut a = FileEntity::new("file-1", def("google_drive_file"), "old.pdf");
        a.content = Some(b"hello".to_vec());
        let mut b = a.clone();
        b.name = "new.pdf".into();
        assert_ne!(a.compute_hash(), b.compute_hash());
    }

    #[test]
    fn code_file_hash_changes_with_commit_even_with_same_bytes() {
        let mut a = FileEntity::new("file-1", def("github_code_file"), "main.rs").with_code_attrs("commit-a", "sha1", "rust");
        a.content = Some(b"fn main() {}".to_vec());
        let mut b = a.clone();
        b.commit_id = Some("commit-b".into());
        assert_ne!(a.compute_hash(), b.compute_hash());
    }

    #[test]
    fn non_code_file_is_unaffected_by_code_attr_fields() {
        let mut plain = FileEntity::new("file-1", def("google_drive_file"), "report.pdf");
        plain.content = Some(b"hello".to_vec());
        assert!(!plain.is_code_file());
    }

    #[test]
    fn chunk_id_format() {
        assert_eq!(ChunkEntity::chunk_id("parent-1", 3), "parent-1.__chunk_3");
    }

    #[test]
    fn chunk_entity_stamps_original_id_and_index() {
        let chunk = ChunkEntity::new("parent-1", 0, def("chunk"), "first chunk text");
        assert_eq!(
            chunk.airweave_system_metadata.original_entity_id.as_deref(),
            Some("parent-1")
        );
        assert_eq!(chunk.airweave_system_metadata.chunk_index, Some(0));
    }

    #[test]
    fn polymorphic_entity_defaults_to_reserved_definition() {
        let e = PolymorphicEntity::new("row-1", "customers", vec!["id".into()]);
        assert_eq!(e.entity_definition_id.as_str(), reserved_table_entity_id().as_str());
    }

    #[test]
    fn entity_enum_dispatches_entity_id() {
        let e = Entity::Deletion(DeletionEntity::new("gone-1"));
        assert_eq!(e.entity_id(), "gone-1");
        assert!(e.is_deletion());
        assert!(e.system_metadata().is_none());
    }
}
