//! Query execution over staged datasets
//!
//! Every operation reads an immutable dataset and yields either a new dataset
//! (staged under a fresh key for chaining) or a summary.

use super::condition::Condition;
use super::request::{AggFunc, QueryRequest};
use crate::error::{Error, Result};
use crate::staging::StagingCache;
use crate::tabular::dataset::{ColumnType, Record, Scalar, TabularDataset};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::{debug, info};

/// Result of one query operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    pub operation: String,
    pub result_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Record>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Value>,
}

/// Output of a pure query step
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    Table(TabularDataset),
    Summary { summary: Value, count: usize },
}

/// Run `request` against the dataset staged at `dataframe_key`.
///
/// `limit` is applied as a final head-truncation for every operation except
/// `head` and `tail`, whose row count it already is.
pub fn query(
    cache: &StagingCache,
    dataframe_key: &str,
    request: &QueryRequest,
    limit: Option<usize>,
) -> Result<OperationResult> {
    let dataset = cache.get_table(dataframe_key)?;
    debug!(
        "Running {} on '{}' ({} rows)",
        request.name(),
        dataframe_key,
        dataset.row_count()
    );

    match apply(&dataset, request)? {
        QueryOutput::Table(mut table) => {
            if let Some(limit) = limit.filter(|_| !request.consumes_limit()) {
                table = table.head(limit);
            }
            let columns = table.columns().to_vec();
            let data = table.records();
            let result_count = table.row_count();
            let cache_key = cache.store(table, None);

            info!(
                "{} on '{}' produced {} rows (cache_key={})",
                request.name(),
                dataframe_key,
                result_count,
                cache_key
            );

            Ok(OperationResult {
                success: true,
                operation: request.name().to_string(),
                result_count,
                columns: Some(columns),
                data: Some(data),
                cache_key: Some(cache_key),
                summary: None,
            })
        }
        QueryOutput::Summary { summary, count } => Ok(OperationResult {
            success: true,
            operation: request.name().to_string(),
            result_count: count,
            columns: None,
            data: None,
            cache_key: None,
            summary: Some(summary),
        }),
    }
}

/// Evaluate `request` against `dataset` without touching any cache
pub fn apply(dataset: &TabularDataset, request: &QueryRequest) -> Result<QueryOutput> {
    Ok(match request {
        QueryRequest::Filter { condition } => QueryOutput::Table(filter(dataset, condition)?),
        QueryRequest::Sort { by, ascending } => QueryOutput::Table(sort(dataset, by, *ascending)?),
        QueryRequest::Select { columns } => QueryOutput::Table(select(dataset, columns)?),
        QueryRequest::GroupBy { by, agg } => QueryOutput::Table(group_by(dataset, by, *agg)?),
        QueryRequest::Head { n } => QueryOutput::Table(dataset.head(*n)),
        QueryRequest::Tail { n } => QueryOutput::Table(dataset.tail(*n)),
        QueryRequest::Describe => QueryOutput::Summary {
            summary: describe(dataset),
            count: dataset.column_count(),
        },
        QueryRequest::ValueCounts { column } => {
            let counts = value_counts(dataset, column)?;
            QueryOutput::Summary {
                count: counts.len(),
                summary: Value::Object(counts.into_iter().map(|(k, n)| (k, json!(n))).collect()),
            }
        }
    })
}

fn column(dataset: &TabularDataset, name: &str) -> Result<usize> {
    dataset.column_index(name).ok_or_else(|| Error::UnknownColumn {
        column: name.to_string(),
        available: dataset.columns().to_vec(),
    })
}

pub fn filter(dataset: &TabularDataset, condition: &str) -> Result<TabularDataset> {
    let condition = Condition::compile(condition, dataset)?;
    let rows = dataset
        .rows()
        .iter()
        .filter(|row| condition.matches(row))
        .cloned()
        .collect();
    Ok(dataset.with_rows(rows))
}

/// Stable sort; nulls go last in both directions
pub fn sort(dataset: &TabularDataset, by: &str, ascending: bool) -> Result<TabularDataset> {
    let idx = column(dataset, by)?;
    let mut rows = dataset.rows().to_vec();
    rows.sort_by(|a, b| match (a[idx].is_null(), b[idx].is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let ordering = a[idx].sort_cmp(&b[idx]);
            if ascending {
                ordering
            } else {
                ordering.reverse()
            }
        }
    });
    Ok(dataset.with_rows(rows))
}

pub fn select(dataset: &TabularDataset, columns: &[String]) -> Result<TabularDataset> {
    let indices = columns
        .iter()
        .map(|name| column(dataset, name))
        .collect::<Result<Vec<_>>>()?;
    let rows = dataset
        .rows()
        .iter()
        .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
        .collect();
    Ok(TabularDataset::from_rows(columns.to_vec(), rows))
}

/// Partition rows by `by`. Groups are ordered by key with nulls last;
/// `count` yields one count column, other aggregates one column per
/// numeric column.
pub fn group_by(dataset: &TabularDataset, by: &str, agg: AggFunc) -> Result<TabularDataset> {
    let idx = column(dataset, by)?;

    let mut groups: IndexMap<(&'static str, String), (Scalar, Vec<usize>)> = IndexMap::new();
    for (row_idx, row) in dataset.rows().iter().enumerate() {
        let key = &row[idx];
        groups
            .entry((key.type_tag(), key.group_key()))
            .or_insert_with(|| (key.clone(), Vec::new()))
            .1
            .push(row_idx);
    }
    let mut groups: Vec<(Scalar, Vec<usize>)> = groups.into_values().collect();
    groups.sort_by(|a, b| a.0.sort_cmp(&b.0));

    if agg == AggFunc::Count {
        let rows = groups
            .into_iter()
            .map(|(key, members)| vec![key, Scalar::Int(members.len() as i64)])
            .collect();
        return Ok(TabularDataset::from_rows(
            vec![by.to_string(), "count".to_string()],
            rows,
        ));
    }

    let numeric: Vec<(usize, ColumnType)> = (0..dataset.column_count())
        .filter(|&i| i != idx)
        .map(|i| (i, dataset.column_type(i)))
        .filter(|(_, ty)| ty.is_numeric())
        .collect();
    if numeric.is_empty() {
        return Err(Error::invalid(
            "agg_func",
            format!("'{}' requires at least one numeric column", agg),
        ));
    }

    let mut columns = vec![by.to_string()];
    columns.extend(numeric.iter().map(|(i, _)| dataset.columns()[*i].clone()));

    let rows = groups
        .into_iter()
        .map(|(key, members)| {
            let mut row = vec![key];
            for (col, ty) in &numeric {
                let cells: Vec<&Scalar> = members
                    .iter()
                    .map(|&r| &dataset.rows()[r][*col])
                    .filter(|cell| !cell.is_null())
                    .collect();
                row.push(aggregate(&cells, agg, *ty));
            }
            row
        })
        .collect();

    Ok(TabularDataset::from_rows(columns, rows))
}

fn aggregate(cells: &[&Scalar], agg: AggFunc, ty: ColumnType) -> Scalar {
    if cells.is_empty() {
        return match agg {
            AggFunc::Count | AggFunc::Sum => Scalar::Int(0),
            _ => Scalar::Null,
        };
    }
    let values: Vec<f64> = cells.iter().filter_map(|c| c.as_f64()).collect();

    match agg {
        AggFunc::Count => Scalar::Int(cells.len() as i64),
        AggFunc::Sum if ty == ColumnType::Integer => cells
            .iter()
            .try_fold(0i64, |total, c| match c {
                Scalar::Int(i) => total.checked_add(*i),
                _ => Some(total),
            })
            .map(Scalar::Int)
            // out of i64 range
            .unwrap_or_else(|| Scalar::Float(values.iter().sum())),
        AggFunc::Sum => Scalar::Float(values.iter().sum()),
        AggFunc::Mean => Scalar::Float(values.iter().sum::<f64>() / values.len() as f64),
        AggFunc::Min => cells
            .iter()
            .copied()
            .min_by(|a, b| a.sort_cmp(b))
            .cloned()
            .unwrap_or(Scalar::Null),
        AggFunc::Max => cells
            .iter()
            .copied()
            .max_by(|a, b| a.sort_cmp(b))
            .cloned()
            .unwrap_or(Scalar::Null),
        AggFunc::Median => Scalar::Float(median(values)),
    }
}

fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Per-column statistics
pub fn describe(dataset: &TabularDataset) -> Value {
    let mut summary = Map::new();
    for (idx, name) in dataset.columns().iter().enumerate() {
        let ty = dataset.column_type(idx);
        let non_null: Vec<&Scalar> = dataset.column_values(idx).filter(|c| !c.is_null()).collect();

        let mut stats = Map::new();
        stats.insert("type".into(), json!(ty));
        stats.insert("count".into(), json!(non_null.len()));
        stats.insert("null_count".into(), json!(dataset.row_count() - non_null.len()));

        if ty.is_numeric() {
            let values: Vec<f64> = non_null.iter().filter_map(|c| c.as_f64()).collect();
            let min = non_null.iter().copied().min_by(|a, b| a.sort_cmp(b));
            let max = non_null.iter().copied().max_by(|a, b| a.sort_cmp(b));
            stats.insert("min".into(), min.map(Scalar::to_json).unwrap_or(Value::Null));
            stats.insert("max".into(), max.map(Scalar::to_json).unwrap_or(Value::Null));
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            stats.insert("mean".into(), json!(mean));
        } else {
            let distinct: HashSet<(&'static str, String)> = non_null
                .iter()
                .map(|c| (c.type_tag(), c.group_key()))
                .collect();
            stats.insert("distinct".into(), json!(distinct.len()));
        }

        summary.insert(name.clone(), Value::Object(stats));
    }
    Value::Object(summary)
}

/// Frequency of each value, descending by count; ties keep first-appearance
/// order. Keys are the JSON rendering of the value; a string that renders
/// like a non-string value in the same column keeps its JSON quotes.
pub fn value_counts(dataset: &TabularDataset, name: &str) -> Result<IndexMap<String, usize>> {
    let idx = column(dataset, name)?;
    let mut counts: IndexMap<(&'static str, String), usize> = IndexMap::new();
    for cell in dataset.column_values(idx) {
        *counts.entry((cell.type_tag(), cell.group_key())).or_insert(0) += 1;
    }
    counts.sort_by(|_, a, _, b| b.cmp(a));

    let rendered: HashSet<&str> = counts
        .keys()
        .filter(|(tag, _)| *tag != "string")
        .map(|(_, key)| key.as_str())
        .collect();
    Ok(counts
        .iter()
        .map(|((tag, key), count)| {
            let label = if *tag == "string" && rendered.contains(key.as_str()) {
                Value::String(key.clone()).to_string()
            } else {
                key.clone()
            };
            (label, *count)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn people() -> TabularDataset {
        TabularDataset::from_rows(
            vec!["name".into(), "active".into(), "age".into(), "city".into()],
            vec![
                vec![Scalar::Str("A".into()), Scalar::Bool(true), Scalar::Int(30), Scalar::Str("Bozen".into())],
                vec![Scalar::Str("B".into()), Scalar::Bool(false), Scalar::Int(25), Scalar::Str("Meran".into())],
                vec![Scalar::Str("C".into()), Scalar::Bool(true), Scalar::Null, Scalar::Str("Bozen".into())],
                vec![Scalar::Str("D".into()), Scalar::Bool(true), Scalar::Int(41), Scalar::Null],
            ],
        )
    }

    fn names(ds: &TabularDataset) -> Vec<String> {
        ds.rows().iter().map(|r| r[0].to_string()).collect()
    }

    #[test]
    fn test_sort_nulls_last_both_directions() {
        let ds = people();
        assert_eq!(names(&sort(&ds, "age", true).unwrap()), vec!["B", "A", "D", "C"]);
        assert_eq!(names(&sort(&ds, "age", false).unwrap()), vec!["D", "A", "B", "C"]);
    }

    #[test]
    fn test_sort_is_stable() {
        let ds = people();
        assert_eq!(names(&sort(&ds, "active", false).unwrap()), vec!["A", "C", "D", "B"]);
    }

    #[test]
    fn test_select_preserves_requested_order() {
        let ds = select(&people(), &["age".into(), "name".into()]).unwrap();
        assert_eq!(ds.columns(), &["age".to_string(), "name".to_string()]);
        assert_eq!(ds.rows()[0], vec![Scalar::Int(30), Scalar::Str("A".into())]);

        let err = select(&people(), &["nope".into()]).unwrap_err();
        assert_eq!(err.error_type(), "UnknownColumn");
    }

    #[test]
    fn test_group_by_count_orders_keys_with_null_last() {
        let ds = group_by(&people(), "city", AggFunc::Count).unwrap();
        assert_eq!(ds.columns(), &["city".to_string(), "count".to_string()]);
        assert_eq!(
            ds.rows(),
            &[
                vec![Scalar::Str("Bozen".into()), Scalar::Int(2)],
                vec![Scalar::Str("Meran".into()), Scalar::Int(1)],
                vec![Scalar::Null, Scalar::Int(1)],
            ]
        );
    }

    #[test]
    fn test_group_by_numeric_aggregates() {
        let ds = people();
        let mean = group_by(&ds, "active", AggFunc::Mean).unwrap();
        assert_eq!(mean.columns(), &["active".to_string(), "age".to_string()]);
        assert_eq!(mean.rows()[0], vec![Scalar::Bool(false), Scalar::Float(25.0)]);
        assert_eq!(mean.rows()[1], vec![Scalar::Bool(true), Scalar::Float(35.5)]);

        let sum = group_by(&ds, "active", AggFunc::Sum).unwrap();
        assert_eq!(sum.rows()[1][1], Scalar::Int(71));
        let max = group_by(&ds, "active", AggFunc::Max).unwrap();
        assert_eq!(max.rows()[1][1], Scalar::Int(41));
        let median = group_by(&ds, "city", AggFunc::Median).unwrap();
        assert_eq!(median.rows()[0][1], Scalar::Float(30.0));
        assert_eq!(median.rows()[2][1], Scalar::Float(41.0));
    }

    #[test]
    fn test_group_by_without_numeric_columns() {
        let ds = select(&people(), &["name".into(), "city".into()]).unwrap();
        let err = group_by(&ds, "city", AggFunc::Sum).unwrap_err();
        assert_eq!(err.error_type(), "InvalidParameter");
    }

    #[test]
    fn test_describe() {
        let summary = describe(&people());
        assert_eq!(
            summary["age"],
            json!({"type": "integer", "count": 3, "null_count": 1, "min": 25, "max": 41, "mean": 32.0})
        );
        assert_eq!(
            summary["city"],
            json!({"type": "string", "count": 3, "null_count": 1, "distinct": 2})
        );
    }

    #[test]
    fn test_value_counts_descending_with_stable_ties() {
        let counts = value_counts(&people(), "city").unwrap();
        let entries: Vec<(&str, usize)> = counts.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        assert_eq!(entries, vec![("Bozen", 2), ("Meran", 1), ("null", 1)]);
    }

    #[test]
    fn test_integer_sum_past_i64_falls_back_to_float() {
        let ds = TabularDataset::from_rows(
            vec!["group".into(), "n".into()],
            vec![
                vec![Scalar::Str("x".into()), Scalar::Int(i64::MAX)],
                vec![Scalar::Str("x".into()), Scalar::Int(1)],
                vec![Scalar::Str("y".into()), Scalar::Int(i64::MAX)],
            ],
        );
        let sum = group_by(&ds, "group", AggFunc::Sum).unwrap();
        assert_eq!(sum.rows()[0][1], Scalar::Float(i64::MAX as f64 + 1.0));
        assert_eq!(sum.rows()[1][1], Scalar::Int(i64::MAX));
    }

    #[test]
    fn test_value_counts_keeps_types_apart() {
        let ds = TabularDataset::from_rows(
            vec!["v".into()],
            vec![
                vec![Scalar::Bool(true)],
                vec![Scalar::Str("true".into())],
                vec![Scalar::Null],
                vec![Scalar::Str("null".into())],
                vec![Scalar::Bool(true)],
            ],
        );
        let counts = value_counts(&ds, "v").unwrap();
        let entries: Vec<(&str, usize)> = counts.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        assert_eq!(
            entries,
            vec![("true", 2), ("\"true\"", 1), ("null", 1), ("\"null\"", 1)]
        );
    }

    #[test]
    fn test_query_stages_and_limits() {
        let cache = StagingCache::new(Duration::from_secs(60));
        let key = cache.store(people(), None);

        let result = query(
            &cache,
            &key,
            &QueryRequest::Filter {
                condition: "active == True".into(),
            },
            Some(2),
        )
        .unwrap();
        assert_eq!(result.result_count, 2);
        let staged = cache.get_table(result.cache_key.as_deref().unwrap()).unwrap();
        assert_eq!(names(&staged), vec!["A", "C"]);

        let tail = query(&cache, &key, &QueryRequest::Tail { n: 3 }, Some(3)).unwrap();
        assert_eq!(tail.result_count, 3);

        let described = query(&cache, &key, &QueryRequest::Describe, Some(1)).unwrap();
        assert!(described.cache_key.is_none());
        assert_eq!(described.result_count, 4);
    }

    #[test]
    fn test_query_errors_are_distinct() {
        let cache = StagingCache::new(Duration::from_secs(60));
        let raw = cache.store(json!([{"a": 1}]), None);

        let miss = query(&cache, "cache_missing", &QueryRequest::Describe, None).unwrap_err();
        assert_eq!(miss.error_type(), "CacheMiss");
        let wrong = query(&cache, &raw, &QueryRequest::Describe, None).unwrap_err();
        assert_eq!(wrong.error_type(), "NotTabular");
    }

    #[test]
    fn test_chaining_matches_direct_computation() {
        let cache = StagingCache::new(Duration::from_secs(60));
        let key = cache.store(people(), None);

        let filtered = query(&cache, &key, &QueryRequest::Filter { condition: "age > 20".into() }, None).unwrap();
        let sorted = query(
            &cache,
            filtered.cache_key.as_deref().unwrap(),
            &QueryRequest::Sort { by: "age".into(), ascending: false },
            None,
        )
        .unwrap();
        let head = query(&cache, sorted.cache_key.as_deref().unwrap(), &QueryRequest::Head { n: 2 }, None).unwrap();

        let direct = sort(&filter(&people(), "age > 20").unwrap(), "age", false)
            .unwrap()
            .head(2);
        assert_eq!(head.data.unwrap(), direct.records());
    }
}
