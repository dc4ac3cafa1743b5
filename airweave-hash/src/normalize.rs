use serde_json::Value;
use std::collections::BTreeMap;

/// Recursively rebuilds a JSON value with every object's keys in sorted
/// order, so that two structurally-equal-but-differently-ordered documents
/// serialize to identical bytes. Array order is preserved — only object key
/// order is normalized. This is the single primitive every deterministic
/// hash in this crate is built on.
pub fn normalize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), normalize_json(v)))
                .collect();
            let mut out = serde_json::Map::with_capacity(sorted.len());
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(normalize_json).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_key_order_is_normalized() {
        let lhs = json!({"b": 1, "a": 2});
        let rhs = json!({"a": 2, "b": 1});
        assert_eq!(normalize_json(&lhs), normalize_json(&rhs));
        assert_eq!(
            serde_json::to_vec(&normalize_json(&lhs)).unwrap(),
            serde_json::to_vec(&normalize_json(&rhs)).unwrap()
        );
    }

    #[test]
    fn nested_object_order_is_normalized() {
        let lhs = json!({"outer": {"z": 1, "y": 2}});
        let rhs = json!({"outer": {"y": 2, "z": 1}});
        assert_eq!(
            serde_json::to_vec(&normalize_json(&lhs)).unwrap(),
            serde_json::to_vec(&normalize_json(&rhs)).unwrap()
        );
    }

    #[test]
    fn array_order_is_preserved_not_sorted() {
        let lhs = json!(["a", "b"]);
        let rhs = json!(["b", "a"]);
        assert_ne!(
            serde_json::to_vec(&normalize_json(&lhs)).unwrap(),
            serde_json::to_vec(&normalize_json(&rhs)).unwrap()
        );
    }
}
