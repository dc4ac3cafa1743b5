pub mod engine;
pub mod hashable;
pub mod normalize;

pub use engine::EntityHasher;
pub use hashable::{Hashable, HashInput};
pub use normalize::normalize_json;
