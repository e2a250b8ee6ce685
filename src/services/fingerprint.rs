//! Content fingerprinting for the result cache.
//!
//! The cache key is a SHA-256 over the image reference, the algorithm tier,
//! and a canonical rendering of the parameters. Canonicalization sorts object
//! keys recursively so `{"a":1,"b":2}` and `{"b":2,"a":1}` fingerprint
//! identically; array order is meaningful and preserved.

use sha2::{Digest, Sha256};
use serde_json::Value;

use crate::models::job::AlgorithmType;

/// Compute the cache key for one unit of analysis work.
pub fn cache_key(image_id: &str, algorithm_type: AlgorithmType, parameters: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(image_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(algorithm_type.to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(canonical(parameters).as_bytes());
    hex::encode(hasher.finalize())
}

/// Deterministic JSON rendering: object keys sorted, no whitespace.
fn canonical(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_is_deterministic() {
        let params = json!({"threshold": 0.5, "mode": "fast"});
        let a = cache_key("img-1", AlgorithmType::Basic, &params);
        let b = cache_key("img-1", AlgorithmType::Basic, &params);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64); // hex sha-256
    }

    #[test]
    fn test_parameter_order_is_normalized() {
        let a = json!({"a": 1, "b": {"y": 2, "x": 3}});
        let b = json!({"b": {"x": 3, "y": 2}, "a": 1});
        assert_eq!(
            cache_key("img-1", AlgorithmType::Advanced, &a),
            cache_key("img-1", AlgorithmType::Advanced, &b),
        );
    }

    #[test]
    fn test_distinct_inputs_differ() {
        let params = json!({});
        let base = cache_key("img-1", AlgorithmType::Basic, &params);
        assert_ne!(base, cache_key("img-2", AlgorithmType::Basic, &params));
        assert_ne!(base, cache_key("img-1", AlgorithmType::Advanced, &params));
        assert_ne!(
            base,
            cache_key("img-1", AlgorithmType::Basic, &json!({"k": 1}))
        );
    }

    #[test]
    fn test_array_order_is_preserved() {
        let a = json!({"channels": [1, 2, 3]});
        let b = json!({"channels": [3, 2, 1]});
        assert_ne!(
            cache_key("img-1", AlgorithmType::Basic, &a),
            cache_key("img-1", AlgorithmType::Basic, &b),
        );
    }

    #[test]
    fn test_canonical_rendering() {
        let value = json!({"b": [true, null], "a": "x"});
        assert_eq!(canonical(&value), r#"{"a":"x","b":[true,null]}"#);
    }
}
