//! # Deep Merge
//!
//! Non-destructive merging of JSON documents. Pipeline stages enrich project and
//! shot records independently; a patch only ever adds or overwrites the keys it
//! carries, nested objects are merged key by key, and everything else in the base
//! survives.

use serde_json::{Map, Value};

/// Merge `patch` into `base` in place.
///
/// Objects merge recursively. Any other patch value (including arrays and `null`)
/// replaces the base value at that key.
pub fn deep_merge(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            merge_maps(base_map, patch_map);
        }
        (base, patch) => *base = patch,
    }
}

/// Merge one JSON object into another, key by key
pub fn merge_maps(base: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (key, patch_value) in patch {
        match base.get_mut(&key) {
            Some(existing) if existing.is_object() && patch_value.is_object() => {
                deep_merge(existing, patch_value);
            }
            _ => {
                base.insert(key, patch_value);
            }
        }
    }
}

/// Return a merged copy without touching the inputs
pub fn merged(base: &Value, patch: &Value) -> Value {
    let mut out = base.clone();
    deep_merge(&mut out, patch.clone());
    out
}
