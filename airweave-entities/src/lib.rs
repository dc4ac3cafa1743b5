pub mod breadcrumb;
pub mod definition;
pub mod entity;
pub mod metadata;

pub use breadcrumb::Breadcrumb;
pub use definition::{EntityDefinitionId, EntityDefinitionRegistry, RESERVED_TABLE_ENTITY_ID};
pub use entity::{ChunkEntity, DeletionEntity, Entity, FileEntity, PolymorphicEntity, StandardEntity};
pub use metadata::{AirweaveSystemMetadata, SparseVector};
