use std::collections::HashMap;

use airweave_entities::Entity;

use crate::error::SyncFailureError;

/// A pure, synchronous entity-to-entities transformation node in the DAG.
/// Transformers never touch the network or the database — anything that
/// does belongs in a source connector or a destination instead.
pub trait Transformer: Send + Sync {
    fn transform(&self, entity: Entity) -> Result<Vec<Entity>, SyncFailureError>;
}

/// The closed set of transformers available to a sync's DAG, resolved by
/// name at [`super::DagRouter::new`] time so a misconfigured DAG fails
/// before the first entity is routed rather than mid-run.
#[derive(Default)]
pub struct TransformerRegistry {
    by_name: HashMap<String, Box<dyn Transformer>>,
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, transformer: Box<dyn Transformer>) -> &mut Self {
        self.by_name.insert(name.into(), transformer);
        self
    }

    pub fn resolve(&self, name: &str) -> Option<&dyn Transformer> {
        self.by_name.get(name).map(Box::as_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airweave_entities::{DeletionEntity, EntityDefinitionId, StandardEntity};

    struct Passthrough;
    impl Transformer for Passthrough {
        fn transform(&self, entity: Entity) -> Result<Vec<Entity>, SyncFailureError> {
            Ok(vec![entity])
        }
    }

    #[test]
    fn registry_resolves_registered_transformer() {
        let mut registry = TransformerRegistry::new();
        registry.register("passthrough", Box::new(Passthrough));
        assert!(registry.resolve("passthrough").is_some());
        assert!(registry.resolve("missing").is_none());
    }

    #[test]
    fn passthrough_transformer_returns_input_unchanged() {
        let transformer = Passthrough;
        let entity = Entity::Standard(StandardEntity::new("t-1", EntityDefinitionId::new("k")));
        let out = transformer.transform(entity).unwrap();
        assert_eq!(out.len(), 1);
        let deletion = Entity::Deletion(DeletionEntity::new("gone"));
        assert_eq!(transformer.transform(deletion).unwrap().len(), 1);
    }
}
