use airweave_entities::Entity;

/// Deterministic point/node IDs so repeated inserts of the same entity
/// always resolve to the same destination record, making `bulk_insert`
/// naturally idempotent without a separate upsert-lookup round trip.
pub fn point_id(collection_id: &str, entity_id: &str) -> String {
    format!("{collection_id}:{entity_id}")
}

pub fn chunk_point_id(collection_id: &str, parent_entity_id: &str, chunk_index: u32) -> String {
    format!("{collection_id}:{parent_entity_id}__chunk_{chunk_index}")
}

/// Resolves the destination-facing ID for any entity shape: chunks use
/// their stamped `original_entity_id`/`chunk_index` rather than their own
/// `entity_id`, keeping the `__chunk_{i}` suffix canonical to one place.
pub fn destination_id(collection_id: &str, entity: &Entity) -> String {
    if let Entity::Chunk(chunk) = entity {
        let parent = chunk
            .airweave_system_metadata
            .original_entity_id
            .as_deref()
            .unwrap_or(&chunk.entity_id);
        let index = chunk.airweave_system_metadata.chunk_index.unwrap_or(0);
        return chunk_point_id(collection_id, parent, index);
    }
    point_id(collection_id, entity.entity_id())
}
