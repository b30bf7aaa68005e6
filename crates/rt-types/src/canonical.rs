//! Canonical JSON: keys sorted lexicographically, no insignificant
//! whitespace, UTF-8, integers within ±2^53. Signatures and event IDs are
//! computed over the canonical form of the signed subobject.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde_json::Value;

type Blake2b256 = Blake2b<U32>;

/// Render `value` as canonical JSON: object keys sorted, no extraneous
/// whitespace. `serde_json::Map` is insertion-ordered by default, so we
/// rebuild every object with a `BTreeMap` ordering before serializing.
pub fn to_canonical_json(value: &Value) -> String {
    serde_json::to_string(&sort_value(value)).expect("canonical value always serializes")
}

fn sort_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: std::collections::BTreeMap<String, Value> = Default::default();
            for (k, v) in map {
                sorted.insert(k.clone(), sort_value(v));
            }
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_value).collect()),
        other => other.clone(),
    }
}

/// BLAKE2b-256 hash of `value`'s canonical JSON form, hex-encoded.
pub fn canonical_hash(value: &Value) -> String {
    hash_bytes(to_canonical_json(value).as_bytes())
}

/// BLAKE2b-256 hash of raw bytes, hex-encoded. Shared by the event-id
/// derivation here and by `rt-crypto::hash` (real mode).
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
