//! Two resolve passes over the same sqlite-backed store: the first pass over
//! an empty sync classifies everything as inserts, persisting them commits
//! their hashes, and a second pass over identical entities must classify
//! everything as keeps. A changed hash on the second pass must classify as
//! an update rather than a keep.

use airweave_entities::{Entity, EntityDefinitionId, StandardEntity};
use airweave_sync::action_resolver::{ActionResolver, ActionResolverConfig, EntityInsert};
use airweave_sync::db::EntityUpsert;
use uuid::Uuid;

fn hashed_entity(id: &str, hash: &str) -> Entity {
    let mut e = StandardEntity::new(id, EntityDefinitionId::new("asana_task"));
    e.airweave_system_metadata.hash = Some(hash.to_string());
    Entity::Standard(e)
}

async fn persist(db: &airweave_sync::db::DbActorHandle, sync_id: Uuid, collection_id: &str, inserts: &[EntityInsert]) {
    let upserts = inserts
        .iter()
        .map(|ins| EntityUpsert {
            sync_id,
            entity_id: ins.entity.entity_id().to_string(),
            entity_definition_id: ins.entity.entity_definition_id().unwrap().to_string(),
            hash: ins.entity.system_metadata().unwrap().hash.clone().unwrap(),
            collection_id: collection_id.to_string(),
            skip_content_handlers: ins.skip_content_handlers,
        })
        .collect();
    db.upsert_entities(upserts).await.unwrap();
}

#[tokio::test]
async fn rerun_over_unchanged_entities_classifies_as_keeps() {
    let db = airweave_sync::db::spawn("sqlite::memory:").await;
    let sync = db.create_sync("rerun-test".into(), "collection-a".into(), false).await.unwrap();
    let sync_id = Uuid::parse_str(&sync.id).unwrap();

    let resolver = ActionResolver::new(db.clone(), 100);
    let config = ActionResolverConfig::default();

    let entities = vec![hashed_entity("task-1", &"a".repeat(64)), hashed_entity("task-2", &"b".repeat(64))];

    let first = resolver.resolve(sync_id, "collection-a", false, entities.clone(), &config).await.unwrap();
    assert_eq!(first.inserts.len(), 2);
    assert!(first.updates.is_empty());
    assert!(first.keeps.is_empty());

    persist(&db, sync_id, "collection-a", &first.inserts).await;

    let second = resolver.resolve(sync_id, "collection-a", false, entities, &config).await.unwrap();
    assert_eq!(second.keeps.len(), 2);
    assert!(second.inserts.is_empty());
    assert!(second.updates.is_empty());
}

#[tokio::test]
async fn rerun_with_changed_hash_classifies_as_update() {
    let db = airweave_sync::db::spawn("sqlite::memory:").await;
    let sync = db.create_sync("rerun-test-2".into(), "collection-b".into(), false).await.unwrap();
    let sync_id = Uuid::parse_str(&sync.id).unwrap();

    let resolver = ActionResolver::new(db.clone(), 100);
    let config = ActionResolverConfig::default();

    let first_pass = vec![hashed_entity("task-1", &"a".repeat(64))];
    let first = resolver.resolve(sync_id, "collection-b", false, first_pass.clone(), &config).await.unwrap();
    assert_eq!(first.inserts.len(), 1);
    persist(&db, sync_id, "collection-b", &first.inserts).await;

    let renamed = vec![hashed_entity("task-1", &"c".repeat(64))];
    let second = resolver.resolve(sync_id, "collection-b", false, renamed, &config).await.unwrap();
    assert_eq!(second.updates.len(), 1);
    assert!(second.keeps.is_empty());
    assert!(second.inserts.is_empty());
}

#[tokio::test]
async fn skip_hash_comparison_forces_inserts_on_rerun() {
    let db = airweave_sync::db::spawn("sqlite::memory:").await;
    let sync = db.create_sync("rerun-test-3".into(), "collection-c".into(), false).await.unwrap();
    let sync_id = Uuid::parse_str(&sync.id).unwrap();

    let resolver = ActionResolver::new(db.clone(), 100);

    let entities = vec![hashed_entity("task-1", &"a".repeat(64))];
    let first = resolver
        .resolve(sync_id, "collection-c", false, entities.clone(), &ActionResolverConfig::default())
        .await
        .unwrap();
    persist(&db, sync_id, "collection-c", &first.inserts).await;

    let replay_config = ActionResolverConfig { skip_hash_comparison: true };
    let second = resolver.resolve(sync_id, "collection-c", false, entities, &replay_config).await.unwrap();
    assert_eq!(second.inserts.len(), 1);
    assert!(second.keeps.is_empty());
}
