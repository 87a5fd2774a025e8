use serde_yaml::{Mapping, Value};

/// Merge `source` into `target`.
///
/// Nested mappings present on both sides are merged recursively; every other
/// value in `source` (scalars, sequences, null) replaces what `target` holds.
/// Sequences are never concatenated.
pub fn deep_merge(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Mapping(target_map), Value::Mapping(source_map)) => merge_mappings(target_map, source_map),
        (target, source) => *target = source,
    }
}

/// Merge two mappings key by key, `source` winning on conflicting leaves.
pub fn merge_mappings(target: &mut Mapping, source: Mapping) {
    for (key, value) in source {
        match target.get_mut(&key) {
            Some(existing) if existing.is_mapping() && value.is_mapping() => deep_merge(existing, value),
            Some(existing) => *existing = value,
            None => {
                target.insert(key, value);
            }
        }
    }
}
