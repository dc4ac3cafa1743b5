use crate::engine::EntityHasher;
use serde_json::Value;

/// Normalized input to the hash pipeline, so callers never need to know
/// whether they're hashing a plain entity or a file.
pub enum HashInput<'a> {
    /// Non-file entity: the full set of non-volatile fields as JSON.
    Json(Value),
    /// File entity: raw content bytes plus non-volatile, non-content
    /// metadata (name, size, content type, ...).
    FileBytes {
        content: &'a [u8],
        metadata: Value,
    },
    /// Code-file entity: like `FileBytes`, but also folds `commit_id`/
    /// `sha`/`language` into the digest.
    CodeFileBytes {
        content: &'a [u8],
        metadata: Value,
        commit_id: Option<String>,
        sha: Option<String>,
        language: Option<String>,
    },
}

/// Anything that can produce a stable content digest.
///
/// Implementors only need to describe *what* to hash via `hash_input`; the
/// shared `compute_hash` method picks the right `EntityHasher` branch. This
/// keeps hashing logic in one place instead of duplicated per entity kind.
pub trait Hashable {
    fn hash_input(&self) -> HashInput<'_>;

    fn compute_hash(&self) -> String {
        match self.hash_input() {
            HashInput::Json(value) => EntityHasher::hash_value(&value),
            HashInput::FileBytes { content, metadata } => {
                EntityHasher::hash_file(content, &metadata)
            }
            HashInput::CodeFileBytes { content, metadata, commit_id, sha, language } => {
                EntityHasher::hash_code_file_entity(
                    content,
                    &metadata,
                    commit_id.as_deref(),
                    sha.as_deref(),
                    language.as_deref(),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FakeTextEntity {
        name: String,
        body: String,
    }

    impl Hashable for FakeTextEntity {
        fn hash_input(&self) -> HashInput<'_> {
            HashInput::Json(json!({"name": self.name, "body": self.body}))
        }
    }

    struct FakeFileEntity {
        name: String,
        bytes: Vec<u8>,
    }

    impl Hashable for FakeFileEntity {
        fn hash_input(&self) -> HashInput<'_> {
            HashInput::FileBytes {
                content: &self.bytes,
                metadata: json!({"name": self.name}),
            }
        }
    }

    #[test]
    fn text_entity_hash_is_deterministic() {
        let a = FakeTextEntity {
            name: "A".into(),
            body: "hello".into(),
        };
        let b = FakeTextEntity {
            name: "A".into(),
            body: "hello".into(),
        };
        assert_eq!(a.compute_hash(), b.compute_hash());
    }

    #[test]
    fn file_entity_rename_changes_hash() {
        let a = FakeFileEntity {
            name: "old.pdf".into(),
            bytes: b"content".to_vec(),
        };
        let b = FakeFileEntity {
            name: "new.pdf".into(),
            bytes: b"content".to_vec(),
        };
        assert_ne!(a.compute_hash(), b.compute_hash());
    }
}
