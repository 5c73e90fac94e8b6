//! Sample-based schema discovery for staged values

use super::dataset::TabularDataset;
use super::source::{json_type_name, normalize};
use crate::staging::StagedValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Maximum nesting depth walked below each sampled record
pub const MAX_DEPTH: usize = 3;
/// Maximum number of field summaries returned
pub const MAX_FIELDS: usize = 100;
/// Scalar samples are cut to this many characters
pub const SAMPLE_CHARS: usize = 50;

/// One discovered field path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSummary {
    pub path: String,
    pub types: Vec<String>,
    pub sample: String,
}

/// Schema summary of a staged value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSummary {
    pub total_items: usize,
    pub sample_count: usize,
    pub field_count: usize,
    pub fields: Vec<FieldSummary>,
    #[serde(rename = "_note")]
    pub note: String,
}

#[derive(Default)]
struct FieldAccumulator {
    types: BTreeSet<&'static str>,
    sample: Option<String>,
}

/// Summarize a staged value from its first `sample_size` records
pub fn inspect(value: &StagedValue, sample_size: usize) -> SchemaSummary {
    match value {
        StagedValue::Json(json) => inspect_json(json, sample_size),
        StagedValue::Table(table) => inspect_table(table, sample_size),
    }
}

fn inspect_json(value: &Value, sample_size: usize) -> SchemaSummary {
    let items = normalize(value).items;
    let sample = &items[..items.len().min(sample_size)];

    let mut fields: BTreeMap<String, FieldAccumulator> = BTreeMap::new();
    for item in sample {
        walk(item, "", 0, &mut fields);
    }

    let field_count = fields.len();
    let summaries = fields
        .into_iter()
        .take(MAX_FIELDS)
        .map(|(path, acc)| FieldSummary {
            path,
            types: acc.types.into_iter().map(str::to_string).collect(),
            sample: acc.sample.unwrap_or_default(),
        })
        .collect();

    finish(items.len(), sample.len(), field_count, summaries)
}

fn inspect_table(table: &TabularDataset, sample_size: usize) -> SchemaSummary {
    let sample_count = table.row_count().min(sample_size);
    let summaries: Vec<FieldSummary> = table
        .columns()
        .iter()
        .enumerate()
        .take(MAX_FIELDS)
        .map(|(idx, column)| FieldSummary {
            path: column.clone(),
            types: vec![serde_json::to_value(table.column_type(idx))
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default()],
            sample: table
                .column_values(idx)
                .take(sample_count)
                .find(|cell| !cell.is_null())
                .map(|cell| truncate_chars(&cell.to_string(), SAMPLE_CHARS))
                .unwrap_or_default(),
        })
        .collect();

    finish(table.row_count(), sample_count, table.column_count(), summaries)
}

fn finish(
    total_items: usize,
    sample_count: usize,
    field_count: usize,
    fields: Vec<FieldSummary>,
) -> SchemaSummary {
    let note = format!(
        "Analyzed {} samples. Showing first {} of {} fields. Use these paths in 'fields' to flatten only the data you need.",
        sample_count,
        fields.len(),
        field_count
    );
    SchemaSummary {
        total_items,
        sample_count,
        field_count,
        fields,
        note,
    }
}

fn walk(value: &Value, prefix: &str, depth: usize, fields: &mut BTreeMap<String, FieldAccumulator>) {
    if depth > MAX_DEPTH {
        return;
    }

    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };

                let acc = fields.entry(path.clone()).or_default();
                acc.types.insert(json_type_name(child));
                if acc.sample.is_none() {
                    acc.sample = sample_of(child);
                }

                match child {
                    Value::Object(_) => walk(child, &path, depth + 1, fields),
                    Value::Array(items) => {
                        if let Some(first) = items.first().filter(|v| v.is_object()) {
                            walk(first, &format!("{}[]", path), depth + 1, fields);
                        }
                    }
                    _ => {}
                }
            }
        }
        Value::Array(items) => {
            if let Some(first) = items.first().filter(|v| v.is_object()) {
                walk(first, prefix, depth, fields);
            }
        }
        _ => {}
    }
}

fn sample_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(truncate_chars(s, SAMPLE_CHARS)),
        Value::Bool(_) | Value::Number(_) => Some(truncate_chars(&value.to_string(), SAMPLE_CHARS)),
        Value::Array(items) => Some(format!("[array of {} items]", items.len())),
        Value::Object(map) => Some(format!("{{object with {} keys}}", map.len())),
    }
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
