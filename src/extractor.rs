//! Per-field extraction helpers used by the post decomposer
//!
//! None of these fail: a sub-structure that does not have the expected
//! shape simply produces no columns.

use crate::registry::FieldRegistry;
use serde_json::Value;

/// Resolve an entity (or list of entities) to its identifying values.
///
/// Lists are walked recursively and results are kept in document order,
/// so callers can take the first value for single-valued references.
pub fn resolve_reference(registry: &FieldRegistry, field: &str, element: &Value) -> Vec<Value> {
    let Some(subfield) = registry.reference_subfield(field) else {
        return Vec::new();
    };

    let mut resolved = Vec::new();
    collect_references(subfield, element, &mut resolved);
    resolved
}

fn collect_references(subfield: &str, element: &Value, resolved: &mut Vec<Value>) {
    match element {
        Value::Object(obj) => {
            if let Some(value) = obj.get(subfield) {
                resolved.push(value.clone());
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_references(subfield, item, resolved);
            }
        }
        _ => {}
    }
}

/// Project the configured inner keys of an object field into
/// `<field>_<key>` columns. Absent inner keys are skipped.
pub fn flatten_object(registry: &FieldRegistry, field: &str, value: &Value) -> Vec<(String, Value)> {
    let (Some(inner_keys), Value::Object(obj)) = (registry.object_keys(field), value) else {
        return Vec::new();
    };

    inner_keys
        .iter()
        .filter_map(|key| {
            obj.get(key)
                .map(|inner| (format!("{}_{}", field, key), inner.clone()))
        })
        .collect()
}

/// Pair a raw coordinate list with the configured axis names.
///
/// Returns `None` when the field is not a coordinate field or when the
/// number of coordinates does not match the number of names.
pub fn extract_coordinates(
    registry: &FieldRegistry,
    field: &str,
    coordinates: &Value,
) -> Option<Vec<(String, Value)>> {
    let names = registry.coordinate_names(field)?;
    let Value::Array(values) = coordinates else {
        return None;
    };
    if values.len() != names.len() {
        return None;
    }

    Some(names.iter().cloned().zip(values.iter().cloned()).collect())
}
