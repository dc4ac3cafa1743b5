use serde::{Deserialize, Serialize};

/// One ancestor hop in an entity's parent path (workspace -> project -> task).
/// Display-only: breadcrumbs are explicitly excluded from hashing and from
/// any uniqueness key, since they can change without the underlying entity
/// changing (e.g. the object is moved to a different folder).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub label: String,
    pub entity_id: String,
}

impl Breadcrumb {
    pub fn new(label: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            entity_id: entity_id.into(),
        }
    }
}
