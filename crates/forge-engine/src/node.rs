//! Tree walks over YAML documents
//!
//! `serde_yaml::Value` is already a tagged tree (`Mapping`, `Sequence`,
//! `Tagged`, scalars); these helpers walk it explicitly instead of poking at
//! untyped maps.

use serde_yaml::{Mapping, Value};

/// Visit every mapping in the tree, parents before children
pub fn walk_mappings_mut<F>(value: &mut Value, visit: &mut F)
where
    F: FnMut(&mut Mapping),
{
    match value {
        Value::Mapping(map) => {
            visit(map);
            for (_, child) in map.iter_mut() {
                walk_mappings_mut(child, visit);
            }
        }
        Value::Sequence(items) => {
            for item in items.iter_mut() {
                walk_mappings_mut(item, visit);
            }
        }
        Value::Tagged(tagged) => walk_mappings_mut(&mut tagged.value, visit),
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {}
    }
}

/// Remove `key` from every mapping in the tree; returns how many were removed
///
/// Used to drop `description` fields from CRD schemas, which can push a
/// CRD past the apply annotation limit.
pub fn strip_key(value: &mut Value, key: &str) -> usize {
    let mut removed = 0;
    walk_mappings_mut(value, &mut |map| {
        if map.remove(key).is_some() {
            removed += 1;
        }
    });
    removed
}

/// Mutable access to a nested mapping, creating missing levels
///
/// Returns `None` when a level exists but is not a mapping.
pub fn mapping_at_mut<'a>(value: &'a mut Value, path: &[&str]) -> Option<&'a mut Mapping> {
    let mut current = value;
    for key in path {
        let map = current.as_mapping_mut()?;
        current = map
            .entry(Value::String((*key).to_string()))
            .or_insert_with(|| Value::Mapping(Mapping::new()));
        if current.is_null() {
            *current = Value::Mapping(Mapping::new());
        }
    }
    current.as_mapping_mut()
}
