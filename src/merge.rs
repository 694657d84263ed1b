use serde_json::{Map, Value};

use crate::value::loosely_equal;

/// Deep-merge `overlay` onto `base` and return the result. Neither input is
/// touched.
///
/// - maps on both sides merge key by key, recursively
/// - lists on both sides merge by value: overlay elements already present are
///   dropped, the rest are appended
/// - integer keys inside maps are positional and follow the list rule
/// - anything else: the overlay replaces the base
pub fn merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => Value::Object(merge_maps(base, overlay)),
        (Value::Array(base), Value::Array(overlay)) => Value::Array(union(base, overlay)),
        (_, overlay) => overlay.clone(),
    }
}

pub fn merge_maps(base: &Map<String, Value>, overlay: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();
    for (key, value) in overlay {
        if is_positional(key) {
            if !merged.values().any(|existing| loosely_equal(existing, value)) {
                let slot = next_index(&merged);
                merged.insert(slot.to_string(), value.clone());
            }
            continue;
        }
        let next = match merged.get(key) {
            Some(existing) => merge(existing, value),
            None => value.clone(),
        };
        merged.insert(key.clone(), next);
    }
    merged
}

fn union(base: &[Value], overlay: &[Value]) -> Vec<Value> {
    let mut merged = base.to_vec();
    for value in overlay {
        if !merged.iter().any(|existing| loosely_equal(existing, value)) {
            merged.push(value.clone());
        }
    }
    merged
}

fn is_positional(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit())
}

pub(crate) fn next_index(map: &Map<String, Value>) -> usize {
    map.keys()
        .filter(|k| is_positional(k))
        .filter_map(|k| k.parse::<usize>().ok())
        .max()
        .map(|max| max + 1)
        .unwrap_or(0)
}
