//! Source normalization and field-path extraction

use serde_json::{Map, Value};

/// Envelope keys recognised as "the items collection", in lookup order
pub const ITEM_KEYS: &[&str] = &["Items", "items", "datasets", "data", "results"];

/// A collection of records plus the envelope fields that surrounded it
#[derive(Debug, Clone, Default)]
pub struct NormalizedSource {
    pub items: Vec<Value>,
    /// Non-item keys of the envelope object (e.g. `TotalResults`)
    pub metadata: Map<String, Value>,
    /// Envelope key the items were read from, if any
    pub items_key: Option<&'static str>,
}

/// Normalize a bare list, an items envelope, or a single record into a list
pub fn normalize(value: &Value) -> NormalizedSource {
    match value {
        Value::Array(items) => NormalizedSource {
            items: items.clone(),
            ..Default::default()
        },
        Value::Object(map) => {
            let found = ITEM_KEYS
                .iter()
                .find(|key| matches!(map.get(**key), Some(Value::Array(_))));

            match found {
                Some(key) => {
                    let items = match map.get(*key) {
                        Some(Value::Array(items)) => items.clone(),
                        _ => Vec::new(),
                    };
                    let metadata = map
                        .iter()
                        .filter(|(k, _)| k.as_str() != *key)
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect();
                    NormalizedSource {
                        items,
                        metadata,
                        items_key: Some(*key),
                    }
                }
                None => NormalizedSource {
                    items: vec![value.clone()],
                    ..Default::default()
                },
            }
        }
        Value::Null => NormalizedSource::default(),
        other => NormalizedSource {
            items: vec![other.clone()],
            ..Default::default()
        },
    }
}

/// Split a field path into segments. `a[0].b` and `a.0.b` are equivalent.
pub fn path_segments(path: &str) -> Vec<String> {
    path.replace('[', ".")
        .replace(']', "")
        .split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolve a dot-separated path; numeric segments index into arrays.
/// Anything unresolvable yields `None`.
pub fn extract_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if let Value::Object(map) = value {
        // Keys that themselves contain dots win over nested lookup
        if let Some(found) = map.get(path) {
            return Some(found);
        }
    }

    path_segments(path)
        .iter()
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment.as_str()),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

/// JSON type name used in schema summaries
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
