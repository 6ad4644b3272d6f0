//! Canonical manifest hashing.
//!
//! Only [`TRACKED_KEYS`] take part in the fingerprint. Volatile fields
//! (last-seen timestamps, derived scores) can change freely without
//! producing a delta.

use std::fmt::Write;

use harvest_common::{sha256_hex, Manifest};
use serde_json::Value;

/// Descriptive and identity fields covered by the fingerprint, sorted.
pub const TRACKED_KEYS: &[&str] = &[
    "auth_required",
    "description",
    "display_name",
    "env_vars",
    "homepage",
    "install",
    "license",
    "maintainer",
    "runtime",
    "source_repo",
    "tags",
    "tools",
    "transports",
];

/// Canonical form of a value: object keys sorted, list elements sorted by
/// their canonical serialization. Reordering a list is not a change;
/// duplicates are kept.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for key in keys {
                out.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            let mut items: Vec<(String, Value)> = items
                .iter()
                .map(|item| {
                    let item = canonicalize(item);
                    (to_canonical_string(&item), item)
                })
                .collect();
            items.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Array(items.into_iter().map(|(_, v)| v).collect())
        }
        other => other.clone(),
    }
}

/// Compact JSON with sorted keys and fixed `,`/`:` separators.
///
/// Key order is enforced here rather than relying on the map type, so the
/// output is stable whether or not `serde_json` preserves insertion order.
pub fn to_canonical_string(value: &Value) -> String {
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
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_canonical(&map[key], out);
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
        Value::String(s) => write_string(s, out),
        Value::Number(n) => {
            let _ = write!(out, "{n}");
        }
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Null => out.push_str("null"),
    }
}

fn write_string(s: &str, out: &mut String) {
    // serde_json's string escaping is the reference encoding
    match serde_json::to_string(s) {
        Ok(encoded) => out.push_str(&encoded),
        Err(_) => out.push_str("\"\""),
    }
}

/// The tracked subset of a manifest. Missing keys become `null`.
pub fn manifest_subset(manifest: &Manifest) -> Manifest {
    TRACKED_KEYS
        .iter()
        .map(|key| {
            let value = manifest.get(*key).map(canonicalize).unwrap_or(Value::Null);
            (key.to_string(), value)
        })
        .collect()
}

/// Hex SHA-256 over the canonical serialization of the tracked subset.
pub fn compute_sha256(manifest: &Manifest) -> String {
    let subset = Value::Object(manifest_subset(manifest));
    sha256_hex(&to_canonical_string(&subset))
}

/// Sorted tracked keys whose canonical values differ. With no prior
/// manifest, every tracked key counts as changed.
pub fn diff_keys(old: Option<&Manifest>, new: &Manifest) -> Vec<String> {
    let Some(old) = old else {
        return TRACKED_KEYS.iter().map(|k| k.to_string()).collect();
    };
    let old = manifest_subset(old);
    let new = manifest_subset(new);
    TRACKED_KEYS
        .iter()
        .filter(|key| old.get(**key) != new.get(**key))
        .map(|key| key.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest(v: Value) -> Manifest {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn tracked_keys_are_sorted() {
        let mut sorted = TRACKED_KEYS.to_vec();
        sorted.sort();
        assert_eq!(sorted, TRACKED_KEYS);
    }

    #[test]
    fn canonical_string_sorts_nested_keys() {
        let v = json!({"b": 1, "a": {"z": true, "y": null}, "c": "x\"y"});
        assert_eq!(
            to_canonical_string(&v),
            r#"{"a":{"y":null,"z":true},"b":1,"c":"x\"y"}"#
        );
    }

    #[test]
    fn list_order_is_ignored_but_duplicates_count() {
        let a = manifest(json!({"tools": ["send", "read"], "tags": ["x", "x"]}));
        let b = manifest(json!({"tools": ["read", "send"], "tags": ["x", "x"]}));
        let c = manifest(json!({"tools": ["read", "send"], "tags": ["x"]}));
        assert_eq!(compute_sha256(&a), compute_sha256(&b));
        assert_ne!(compute_sha256(&b), compute_sha256(&c));
        assert_eq!(diff_keys(Some(&a), &c), vec!["tags"]);
    }

    #[test]
    fn untracked_keys_do_not_affect_hash() {
        let a = manifest(json!({"display_name": "Gmail", "last_seen_iso": "2024-01-01"}));
        let b = manifest(json!({"display_name": "Gmail", "last_seen_iso": "2024-06-01"}));
        assert_eq!(compute_sha256(&a), compute_sha256(&b));
        assert!(diff_keys(Some(&a), &b).is_empty());
    }

    #[test]
    fn missing_key_equals_explicit_null() {
        let a = manifest(json!({"license": null}));
        let b = manifest(json!({}));
        assert_eq!(compute_sha256(&a), compute_sha256(&b));
    }

    #[test]
    fn no_prior_manifest_marks_every_tracked_key() {
        let keys = diff_keys(None, &Manifest::new());
        assert_eq!(keys.len(), TRACKED_KEYS.len());
    }
}
