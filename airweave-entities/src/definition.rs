use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque identifier for an entity's *type* (e.g. "Asana task", "GitHub
/// issue"). Replaces the source implementation's module-import + class-name
/// resolution with an explicit registry resolved once at startup — each
/// entity variant carries a compile-time-known tag (`StandardEntity::kind`,
/// etc.) that is looked up here instead of reflected on at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityDefinitionId(pub String);

impl EntityDefinitionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityDefinitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reserved definition id used as the polymorphic-entity fallback when an
/// entity's concrete schema is determined at runtime (database sources)
/// rather than known at compile time.
pub fn reserved_table_entity_id() -> EntityDefinitionId {
    EntityDefinitionId::new("__reserved_table_entity__")
}

/// Constant form for match-arm / comparison use; equal to
/// `reserved_table_entity_id()`.
pub const RESERVED_TABLE_ENTITY_ID: &str = "__reserved_table_entity__";

/// Registry mapping an entity "kind" tag (`StandardEntity::kind()` etc.) to
/// its definition id. Built once at orchestrator startup from the closed set
/// of compiled-in entity kinds, eliminating the per-entity DB/reflection
/// lookup the distilled system performed.
#[derive(Debug, Clone, Default)]
pub struct EntityDefinitionRegistry {
    by_kind: HashMap<String, EntityDefinitionId>,
}

impl EntityDefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: impl Into<String>, id: EntityDefinitionId) -> &mut Self {
        self.by_kind.insert(kind.into(), id);
        self
    }

    pub fn resolve(&self, kind: &str) -> Option<&EntityDefinitionId> {
        self.by_kind.get(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_registered_kind() {
        let mut registry = EntityDefinitionRegistry::new();
        registry.register("asana_task", EntityDefinitionId::new("def-asana-task"));
        assert_eq!(
            registry.resolve("asana_task"),
            Some(&EntityDefinitionId::new("def-asana-task"))
        );
        assert_eq!(registry.resolve("unknown"), None);
    }
}
