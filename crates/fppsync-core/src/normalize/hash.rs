use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Serializes `value` to a canonical JSON string: object keys sorted,
/// `null` and omitted fields equivalent (both absent), stable number
/// formatting. This is the basis for identity/state hashing.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String> {
    let raw = serde_json::to_value(value)?;
    let normalized = strip_nulls(raw);
    Ok(canonical_string(&normalized))
}

fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (key, val) in map {
                if val.is_null() {
                    continue;
                }
                out.insert(key, strip_nulls(val));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(strip_nulls).collect()),
        other => other,
    }
}

fn canonical_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => serde_json::to_string(s).expect("string always serializes"),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonical_string).collect();
            format!("[{}]", parts.join(","))
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let parts: Vec<String> = entries
                .into_iter()
                .map(|(k, v)| format!("{}:{}", serde_json::to_string(k).expect("key serializes"), canonical_string(v)))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
    }
}

pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// `hash(normalized(identity))` — the event's identity hash.
pub fn identity_hash<T: Serialize>(identity: &T) -> Result<String> {
    Ok(sha256_hex(&canonical_json(identity)?))
}

/// `hash(identityHash || sorted subEvent stateHashes)` — the event's state
/// hash.
pub fn state_hash(identity_hash: &str, mut sub_event_state_hashes: Vec<String>) -> String {
    sub_event_state_hashes.sort();
    let joined = format!("{identity_hash}|{}", sub_event_state_hashes.join("|"));
    sha256_hex(&joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_json_sorts_keys() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(canonical_json(&a).unwrap(), canonical_json(&b).unwrap());
    }

    #[test]
    fn null_and_omitted_are_equivalent() {
        let with_null = json!({"a": 1, "b": null});
        let omitted = json!({"a": 1});
        assert_eq!(canonical_json(&with_null).unwrap(), canonical_json(&omitted).unwrap());
    }

    #[test]
    fn identity_hash_is_deterministic() {
        let identity = json!({"type": "playlist", "target": "Playlist A"});
        let first = identity_hash(&identity).unwrap();
        let second = identity_hash(&identity).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn state_hash_is_order_independent_over_subevents() {
        let a = state_hash("id1", vec!["x".to_string(), "y".to_string()]);
        let b = state_hash("id1", vec!["y".to_string(), "x".to_string()]);
        assert_eq!(a, b);
    }

    #[test]
    fn different_identity_yields_different_hash() {
        let first = identity_hash(&json!({"target": "A"})).unwrap();
        let second = identity_hash(&json!({"target": "B"})).unwrap();
        assert_ne!(first, second);
    }
}
