use crate::normalize::normalize_json;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Computes deterministic, sha256-hex content digests for entities.
///
/// The technique (normalize, serialize, hash) is the same one used for
/// cache-key generation elsewhere in this codebase: recursively sort object
/// keys before serializing so that field-order differences never change the
/// digest, then hash the canonical bytes. Unlike a cache key, an entity hash
/// is persisted and compared across syncs, so it uses a cryptographic digest
/// (sha256) rather than a fast non-cryptographic one.
#[derive(Debug, Default, Clone, Copy)]
pub struct EntityHasher;

impl EntityHasher {
    /// Hashes an arbitrary JSON value after normalizing key order.
    pub fn hash_value(value: &serde_json::Value) -> String {
        let normalized = normalize_json(value);
        let bytes = serde_json::to_vec(&normalized).expect("normalized value always serializes");
        Self::hash_bytes(&bytes)
    }

    /// Convenience wrapper for hashing any `Serialize` type as JSON.
    pub fn hash_serializable(value: &impl Serialize) -> Option<String> {
        let value = serde_json::to_value(value).ok()?;
        Some(Self::hash_value(&value))
    }

    /// Hashes file content bytes concatenated with normalized metadata bytes,
    /// per the file-entity hashing rule: `sha256(content || metadata)`.
    /// A rename changes `metadata`, hence the hash, even with identical
    /// content; a URL change does not, because callers must exclude `url`
    /// from the metadata value before calling this.
    pub fn hash_file(content: &[u8], metadata: &serde_json::Value) -> String {
        let normalized_metadata = normalize_json(metadata);
        let metadata_bytes =
            serde_json::to_vec(&normalized_metadata).expect("normalized value always serializes");

        let mut hasher = Sha256::new();
        hasher.update(content);
        hasher.update(&metadata_bytes);
        hex::encode(hasher.finalize())
    }

    /// Hashes a code-file entity: same `content || metadata` rule as
    /// [`Self::hash_file`], but with `commit_id`/`sha`/`language` folded
    /// into the metadata first, so a file unchanged at the same commit
    /// hashes identically while a new commit or a language reclassification
    /// changes the digest even with identical bytes.
    pub fn hash_code_file_entity(
        content: &[u8],
        metadata: &serde_json::Value,
        commit_id: Option<&str>,
        sha: Option<&str>,
        language: Option<&str>,
    ) -> String {
        let mut augmented = metadata.clone();
        if !augmented.is_object() {
            augmented = serde_json::json!({});
        }
        let obj = augmented.as_object_mut().expect("forced to object above");
        obj.insert("commit_id".into(), serde_json::json!(commit_id));
        obj.insert("sha".into(), serde_json::json!(sha));
        obj.insert("language".into(), serde_json::json!(language));
        Self::hash_file(content, &augmented)
    }

    fn hash_bytes(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }
}

/// Every hash produced by this crate is a lowercase hex sha256 digest and is
/// therefore always exactly this many characters.
pub const HASH_HEX_LEN: usize = 64;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hash_is_64_hex_chars() {
        let h = EntityHasher::hash_value(&json!({"a": 1}));
        assert_eq!(h.len(), HASH_HEX_LEN);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn object_key_order_produces_same_hash() {
        let lhs = json!({"name": "task", "args": {"city": "Berlin", "unit": "c"}});
        let rhs = json!({"args": {"unit": "c", "city": "Berlin"}, "name": "task"});
        assert_eq!(EntityHasher::hash_value(&lhs), EntityHasher::hash_value(&rhs));
    }

    #[test]
    fn array_order_changes_hash() {
        let lhs = json!(["a", "b"]);
        let rhs = json!(["b", "a"]);
        assert_ne!(EntityHasher::hash_value(&lhs), EntityHasher::hash_value(&rhs));
    }

    #[test]
    fn content_change_changes_file_hash() {
        let meta = json!({"name": "a.pdf", "size": 10});
        let h1 = EntityHasher::hash_file(b"hello", &meta);
        let h2 = EntityHasher::hash_file(b"world", &meta);
        assert_ne!(h1, h2);
    }

    #[test]
    fn rename_changes_file_hash_even_with_same_bytes() {
        let meta_old = json!({"name": "old.pdf", "size": 5});
        let meta_new = json!({"name": "new.pdf", "size": 5});
        let h1 = EntityHasher::hash_file(b"hello", &meta_old);
        let h2 = EntityHasher::hash_file(b"hello", &meta_new);
        assert_ne!(h1, h2);
    }

    #[test]
    fn code_file_new_commit_changes_hash_even_with_same_bytes() {
        let meta = json!({"name": "main.rs"});
        let h1 = EntityHasher::hash_code_file_entity(b"fn main() {}", &meta, Some("abc"), Some("sha1"), Some("rust"));
        let h2 = EntityHasher::hash_code_file_entity(b"fn main() {}", &meta, Some("def"), Some("sha1"), Some("rust"));
        assert_ne!(h1, h2);
    }

    #[test]
    fn code_file_same_commit_sha_language_hashes_equal() {
        let meta = json!({"name": "main.rs"});
        let h1 = EntityHasher::hash_code_file_entity(b"fn main() {}", &meta, Some("abc"), Some("sha1"), Some("rust"));
        let h2 = EntityHasher::hash_code_file_entity(b"fn main() {}", &meta, Some("abc"), Some("sha1"), Some("rust"));
        assert_eq!(h1, h2);
    }

    #[test]
    fn identical_content_and_metadata_hash_equal() {
        let meta = json!({"name": "a.pdf", "size": 5});
        let h1 = EntityHasher::hash_file(b"hello", &meta);
        let h2 = EntityHasher::hash_file(b"hello", &meta);
        assert_eq!(h1, h2);
    }
}
