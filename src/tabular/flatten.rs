//! Flatten nested JSON records into a tabular dataset
//!
//! Each field path becomes one column. Unresolvable paths yield null cells,
//! nested values are rendered as JSON text, and with `explode` the first
//! list-valued column of each row fans that row out into one row per element.

use super::dataset::{ColumnType, Record, Scalar, TabularDataset};
use super::source::{extract_path, normalize};
use crate::error::{Error, Result};
use crate::staging::{StagedValue, StagingCache};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

/// Rows shown back to the caller after flattening
pub const SAMPLE_ROWS: usize = 3;

/// Flatten options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlattenOptions {
    /// Field paths to extract; taken from the first record's keys when absent
    #[serde(default)]
    pub fields: Option<Vec<String>>,

    /// Fan out the first list-valued column of each row
    #[serde(default)]
    pub explode: bool,
}

/// Result of flattening before staging
#[derive(Debug, Clone)]
pub struct Flattened {
    pub dataset: TabularDataset,
    /// Extracted values per source record, nested structure intact
    pub raw_rows: Vec<Value>,
    pub source_count: usize,
}

/// What the caller sees after a staged flatten
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlattenSummary {
    pub dataframe_key: String,
    pub rows_key: String,
    pub source_count: usize,
    pub row_count: usize,
    pub column_count: usize,
    pub columns: Vec<String>,
    pub column_types: IndexMap<String, ColumnType>,
    pub sample: Vec<Record>,
    pub exploded: bool,
    pub next_step: String,
}

/// Flatten a staged or inline value
pub fn flatten(source: &Value, options: &FlattenOptions) -> Result<Flattened> {
    let items = normalize(source).items;
    if items.is_empty() {
        return Err(Error::NoItems);
    }

    let fields = match &options.fields {
        Some(fields) if !fields.is_empty() => fields.clone(),
        _ => detect_fields(&items)?,
    };

    debug!(
        "Flattening {} items over {} fields (explode={})",
        items.len(),
        fields.len(),
        options.explode
    );

    let mut dataset = TabularDataset::new(fields.clone());
    let mut raw_rows = Vec::with_capacity(items.len());

    for item in &items {
        let cells: Vec<Value> = fields
            .iter()
            .map(|path| extract_path(item, path).cloned().unwrap_or(Value::Null))
            .collect();

        raw_rows.push(Value::Object(
            fields.iter().cloned().zip(cells.iter().cloned()).collect::<Map<_, _>>(),
        ));

        for row in expand_row(&cells, options.explode) {
            dataset.push_row(row);
        }
    }

    Ok(Flattened {
        dataset,
        raw_rows,
        source_count: items.len(),
    })
}

/// Flatten and stage both the raw rows and the dataset
pub fn flatten_and_stage(
    cache: &StagingCache,
    source: &Value,
    options: &FlattenOptions,
) -> Result<FlattenSummary> {
    let Flattened {
        dataset,
        raw_rows,
        source_count,
    } = flatten(source, options)?;

    let summary_columns = dataset.columns().to_vec();
    let column_types = dataset.column_types();
    let sample = dataset.sample(SAMPLE_ROWS);
    let row_count = dataset.row_count();

    let rows_key = cache.store(StagedValue::Json(Value::Array(raw_rows)), None);
    let dataframe_key = cache.store(dataset, None);

    info!(
        "Flattened {} items into {} rows x {} columns (dataframe_key={})",
        source_count,
        row_count,
        summary_columns.len(),
        dataframe_key
    );

    Ok(FlattenSummary {
        next_step: format!(
            "Use dataframe_query with dataframe_key='{}' to filter, sort, group or select",
            dataframe_key
        ),
        dataframe_key,
        rows_key,
        source_count,
        row_count,
        column_count: summary_columns.len(),
        columns: summary_columns,
        column_types,
        sample,
        exploded: options.explode,
    })
}

/// Shallow key set of the first record
fn detect_fields(items: &[Value]) -> Result<Vec<String>> {
    match items.first() {
        Some(Value::Object(map)) if !map.is_empty() => Ok(map.keys().cloned().collect()),
        Some(Value::Object(_)) => Err(Error::invalid(
            "fields",
            "cannot auto-detect fields: first item has no keys",
        )),
        _ => Err(Error::invalid(
            "fields",
            "cannot auto-detect fields: first item is not an object",
        )),
    }
}

/// One source row, or several when exploding its first list-valued cell
fn expand_row(cells: &[Value], explode: bool) -> Vec<Vec<Scalar>> {
    let base: Vec<Scalar> = cells.iter().map(Scalar::from_json).collect();

    let target = if explode {
        cells.iter().position(Value::is_array)
    } else {
        None
    };

    match target {
        None => vec![base],
        Some(idx) => {
            let elements = cells[idx].as_array().map(Vec::as_slice).unwrap_or(&[]);
            if elements.is_empty() {
                let mut row = base;
                row[idx] = Scalar::Null;
                return vec![row];
            }
            elements
                .iter()
                .map(|element| {
                    let mut row = base.clone();
                    row[idx] = Scalar::from_json(element);
                    row
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn fields(paths: &[&str]) -> FlattenOptions {
        FlattenOptions {
            fields: Some(paths.iter().map(|p| p.to_string()).collect()),
            explode: false,
        }
    }

    #[test]
    fn test_flatten_example_dataset() {
        let source = json!([
            {"name": "A", "active": true},
            {"name": "B", "active": false},
            {"name": "C", "active": true}
        ]);
        let out = flatten(&source, &fields(&["name", "active"])).unwrap();
        assert_eq!(out.dataset.row_count(), 3);
        assert_eq!(out.dataset.columns(), &["name".to_string(), "active".to_string()]);
        assert_eq!(out.dataset.rows()[1][1], Scalar::Bool(false));
    }

    #[test]
    fn test_missing_paths_yield_null_and_nested_become_text() {
        let source = json!({"Items": [
            {"Id": "1", "Detail": {"en": {"Title": "X"}}, "Gps": {"Lat": 1}},
            {"Id": "2"}
        ]});
        let out = flatten(&source, &fields(&["Id", "Detail.en.Title", "Gps"])).unwrap();
        let rows = out.dataset.rows();
        assert_eq!(rows[0][1], Scalar::Str("X".into()));
        assert_eq!(rows[0][2], Scalar::Str(r#"{"Lat":1}"#.into()));
        assert_eq!(rows[1][1], Scalar::Null);
        assert_eq!(rows[1][2], Scalar::Null);
        assert_eq!(out.raw_rows[0]["Gps"], json!({"Lat": 1}));
    }

    #[test]
    fn test_auto_detect_fields_from_first_record() {
        let source = json!([{"b": 1, "a": 2}, {"a": 3, "c": 4}]);
        let out = flatten(&source, &FlattenOptions::default()).unwrap();
        assert_eq!(out.dataset.columns(), &["b".to_string(), "a".to_string()]);
        assert_eq!(out.dataset.rows()[1], vec![Scalar::Null, Scalar::Int(3)]);
    }

    #[test]
    fn test_empty_input_is_an_error() {
        let err = flatten(&json!([]), &FlattenOptions::default()).unwrap_err();
        assert!(matches!(err, Error::NoItems));
        let err = flatten(&json!({"Items": []}), &FlattenOptions::default()).unwrap_err();
        assert_eq!(err.to_string(), "No items to flatten");
    }

    #[test]
    fn test_explode_first_list_field_only() {
        let source = json!([
            {"id": 1, "tags": ["a", "b", "c"], "other": [1, 2]},
            {"id": 2, "tags": [], "other": [3]},
            {"id": 3, "tags": null, "other": "x"}
        ]);
        let options = FlattenOptions {
            fields: Some(vec!["id".into(), "tags".into(), "other".into()]),
            explode: true,
        };
        let out = flatten(&source, &options).unwrap();
        let rows = out.dataset.rows();

        // 3 rows for id=1, differing only in `tags`; `other` stays text
        assert_eq!(rows.len(), 3 + 1 + 1);
        for (i, tag) in ["a", "b", "c"].iter().enumerate() {
            assert_eq!(rows[i][0], Scalar::Int(1));
            assert_eq!(rows[i][1], Scalar::Str(tag.to_string()));
            assert_eq!(rows[i][2], Scalar::Str("[1,2]".into()));
        }
        // empty list stays a single row with the field unset
        assert_eq!(rows[3], vec![Scalar::Int(2), Scalar::Null, Scalar::Str("[3]".into())]);
        // `tags` is null, so the first list-valued cell is `other`
        assert_eq!(rows[4], vec![Scalar::Int(3), Scalar::Null, Scalar::Str("x".into())]);
    }

    #[test]
    fn test_flatten_shape_is_stable() {
        let source = json!([{"a": 1, "b": [1]}, {"a": 2, "b": [2, 3]}]);
        let options = FlattenOptions {
            fields: Some(vec!["a".into(), "b".into()]),
            explode: true,
        };
        let first = flatten(&source, &options).unwrap().dataset;
        let second = flatten(&source, &options).unwrap().dataset;
        assert_eq!(first.columns(), second.columns());
        assert_eq!(first.row_count(), second.row_count());
    }

    #[test]
    fn test_flatten_and_stage() {
        let cache = StagingCache::new(Duration::from_secs(60));
        let source = json!([{"n": 1}, {"n": 2}, {"n": 3}, {"n": 4.5}]);
        let summary = flatten_and_stage(&cache, &source, &fields(&["n"])).unwrap();

        assert_eq!(summary.row_count, 4);
        assert_eq!(summary.sample.len(), SAMPLE_ROWS);
        assert_eq!(summary.column_types["n"], ColumnType::Float);
        assert_ne!(summary.dataframe_key, summary.rows_key);
        assert_eq!(cache.get_table(&summary.dataframe_key).unwrap().row_count(), 4);
        assert!(matches!(
            cache.get(&summary.rows_key),
            Some(StagedValue::Json(Value::Array(rows))) if rows.len() == 4
        ));
    }
}
