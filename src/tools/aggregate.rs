//! `aggregate_data`: reduce a large collection with an explicit strategy
//!
//! The caller always names the strategy; there is no guessing from which
//! optional parameters happen to be present.

use crate::error::{Error, Result};
use crate::governor::{parse_args, Operation, OperationContext};
use crate::staging::StagedValue;
use crate::tabular::{extract_path, normalize};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use tracing::info;

/// Distinct values reported per field
pub const MAX_DISTINCT_VALUES: usize = 50;
/// Items kept per group by `group_by`
pub const GROUP_SAMPLE_SIZE: usize = 3;

fn default_sample_limit() -> usize {
    20
}

/// Aggregation strategy, tagged by `strategy`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Strategy {
    CountTotal,
    Sample {
        #[serde(default = "default_sample_limit")]
        limit: usize,
    },
    ExtractFields {
        fields: Vec<String>,
    },
    CountBy {
        group_by: String,
    },
    DistinctValues {
        fields: Vec<String>,
    },
    SummarizeFields {
        #[serde(default)]
        fields: Option<Vec<String>>,
    },
    GroupBy {
        group_by: String,
    },
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::CountTotal => "count_total",
            Strategy::Sample { .. } => "sample",
            Strategy::ExtractFields { .. } => "extract_fields",
            Strategy::CountBy { .. } => "count_by",
            Strategy::DistinctValues { .. } => "distinct_values",
            Strategy::SummarizeFields { .. } => "summarize_fields",
            Strategy::GroupBy { .. } => "group_by",
        }
    }
}

#[derive(Debug, Deserialize)]
struct AggregateArgs {
    #[serde(default)]
    cache_key: Option<String>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(flatten)]
    strategy: Strategy,
}

pub struct AggregateData;

#[async_trait]
impl Operation for AggregateData {
    fn name(&self) -> &'static str {
        "aggregate_data"
    }

    fn description(&self) -> &'static str {
        "Reduce staged or inline records. strategy is one of count_total, \
         sample(limit=20), extract_fields(fields), count_by(group_by), \
         distinct_values(fields), summarize_fields(fields?), group_by(group_by)."
    }

    async fn invoke(&self, args: Value, cx: &OperationContext) -> Result<Value> {
        let args: AggregateArgs = parse_args(self.name(), args)?;

        let source = match (args.data, args.cache_key) {
            (Some(data), _) => data,
            (None, Some(key)) => match cx.cache().get(&key) {
                Some(StagedValue::Json(value)) => value,
                Some(StagedValue::Table(table)) => table.to_json_rows(),
                None => return Err(Error::CacheMiss(key)),
            },
            (None, None) => return Err(Error::missing(self.name(), "cache_key")),
        };

        aggregate(&source, &args.strategy)
    }
}

/// Apply `strategy` to the items of `source`. The output carries the
/// strategy name, the item count and the envelope's other keys.
pub fn aggregate(source: &Value, strategy: &Strategy) -> Result<Value> {
    let normalized = normalize(source);
    let items = &normalized.items;

    let mut out = Map::new();
    out.insert("strategy".into(), json!(strategy.name()));
    out.insert("original_count".into(), json!(items.len()));
    for (key, value) in &normalized.metadata {
        out.entry(key.clone()).or_insert_with(|| value.clone());
    }

    match strategy {
        Strategy::CountTotal => {
            out.insert("count".into(), json!(items.len()));
        }
        Strategy::Sample { limit } => {
            let sampled: Vec<Value> = items.iter().take(*limit).cloned().collect();
            out.insert("sampled_count".into(), json!(sampled.len()));
            out.insert("items".into(), Value::Array(sampled));
        }
        Strategy::ExtractFields { fields } => {
            require_fields(strategy, fields)?;
            let extracted: Vec<Value> = items
                .iter()
                .map(|item| {
                    Value::Object(
                        fields
                            .iter()
                            .map(|f| (f.clone(), extract_path(item, f).cloned().unwrap_or(Value::Null)))
                            .collect(),
                    )
                })
                .collect();
            out.insert("items".into(), Value::Array(extracted));
            out.insert("extracted_fields".into(), json!(fields));
        }
        Strategy::CountBy { group_by } => {
            let mut counts: IndexMap<String, usize> = IndexMap::new();
            for item in items {
                *counts.entry(render_key(extract_path(item, group_by))).or_insert(0) += 1;
            }
            out.insert("unique_values".into(), json!(counts.len()));
            out.insert("counts".into(), json!(counts));
            out.insert("grouped_by".into(), json!(group_by));
        }
        Strategy::DistinctValues { fields } => {
            require_fields(strategy, fields)?;
            let mut distinct = Map::new();
            for field in fields {
                let mut values = BTreeSet::new();
                for value in items.iter().filter_map(|item| extract_path(item, field)) {
                    match value {
                        Value::Null => {}
                        Value::Array(list) => values.extend(list.iter().map(render)),
                        other => {
                            values.insert(render(other));
                        }
                    }
                }
                let capped: Vec<String> = values.into_iter().take(MAX_DISTINCT_VALUES).collect();
                distinct.insert(field.clone(), json!(capped));
            }
            out.insert("distinct_values".into(), Value::Object(distinct));
            out.insert("fields".into(), json!(fields));
        }
        Strategy::SummarizeFields { fields } => {
            let fields = match fields {
                Some(fields) if !fields.is_empty() => fields.clone(),
                _ => numeric_fields(items.first()),
            };
            let mut summary = Map::new();
            for field in &fields {
                let values: Vec<f64> = items
                    .iter()
                    .filter_map(|item| extract_path(item, field))
                    .filter_map(Value::as_f64)
                    .collect();
                if values.is_empty() {
                    continue;
                }
                let sum: f64 = values.iter().sum();
                summary.insert(
                    field.clone(),
                    json!({
                        "count": values.len(),
                        "min": values.iter().copied().fold(f64::INFINITY, f64::min),
                        "max": values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                        "avg": sum / values.len() as f64,
                        "sum": sum,
                    }),
                );
            }
            out.insert("summary".into(), Value::Object(summary));
        }
        Strategy::GroupBy { group_by } => {
            let mut groups: IndexMap<String, (usize, Vec<Value>)> = IndexMap::new();
            for item in items {
                let key = match extract_path(item, group_by) {
                    None | Some(Value::Null) => "unknown".to_string(),
                    Some(value) => render(value),
                };
                let group = groups.entry(key).or_insert_with(|| (0, Vec::new()));
                group.0 += 1;
                if group.1.len() < GROUP_SAMPLE_SIZE {
                    group.1.push(item.clone());
                }
            }
            let summary: Map<String, Value> = groups
                .into_iter()
                .map(|(key, (count, sample))| (key, json!({"count": count, "sample": sample})))
                .collect();
            out.insert("group_count".into(), json!(summary.len()));
            out.insert("groups".into(), Value::Object(summary));
            out.insert("grouped_by".into(), json!(group_by));
        }
    }

    info!(
        "Aggregated {} items with strategy '{}'",
        items.len(),
        strategy.name()
    );
    Ok(Value::Object(out))
}

fn require_fields(strategy: &Strategy, fields: &[String]) -> Result<()> {
    if fields.is_empty() {
        return Err(Error::missing(strategy.name(), "fields"));
    }
    Ok(())
}

/// Top-level numeric fields of the first record
fn numeric_fields(first: Option<&Value>) -> Vec<String> {
    match first {
        Some(Value::Object(map)) => map
            .iter()
            .filter(|(_, v)| v.is_number())
            .map(|(k, _)| k.clone())
            .collect(),
        _ => Vec::new(),
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_key(value: Option<&Value>) -> String {
    value.map(render).unwrap_or_else(|| "null".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hotels() -> Value {
        json!({
            "TotalResults": 4,
            "Items": [
                {"Id": "1", "Type": "Hotel", "Stars": 4, "Tags": ["spa", "pool"], "Gps": {"Alt": 300}},
                {"Id": "2", "Type": "Camping", "Stars": 2, "Tags": ["pool"]},
                {"Id": "3", "Type": "Hotel", "Stars": 5, "Tags": []},
                {"Id": "4", "Stars": 3}
            ]
        })
    }

    fn strategy(value: Value) -> Strategy {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_count_total_keeps_metadata() {
        let out = aggregate(&hotels(), &Strategy::CountTotal).unwrap();
        assert_eq!(out["count"], json!(4));
        assert_eq!(out["original_count"], json!(4));
        assert_eq!(out["TotalResults"], json!(4));
        assert_eq!(out["strategy"], json!("count_total"));
    }

    #[test]
    fn test_sample_limit() {
        let items: Vec<Value> = (0..10_000).map(|i| json!({"i": i})).collect();
        let out = aggregate(&Value::Array(items), &strategy(json!({"strategy": "sample"}))).unwrap();
        assert_eq!(out["sampled_count"], json!(20));
        assert_eq!(out["items"].as_array().map(Vec::len), Some(20));
        assert_eq!(out["original_count"], json!(10_000));
    }

    #[test]
    fn test_extract_fields_with_nested_paths() {
        let out = aggregate(
            &hotels(),
            &Strategy::ExtractFields {
                fields: vec!["Id".into(), "Gps.Alt".into()],
            },
        )
        .unwrap();
        assert_eq!(out["items"][0], json!({"Id": "1", "Gps.Alt": 300}));
        assert_eq!(out["items"][1], json!({"Id": "2", "Gps.Alt": null}));
    }

    #[test]
    fn test_count_by_and_group_by() {
        let counts = aggregate(&hotels(), &Strategy::CountBy { group_by: "Type".into() }).unwrap();
        assert_eq!(counts["counts"], json!({"Hotel": 2, "Camping": 1, "null": 1}));
        assert_eq!(counts["unique_values"], json!(3));

        let groups = aggregate(&hotels(), &Strategy::GroupBy { group_by: "Type".into() }).unwrap();
        assert_eq!(groups["group_count"], json!(3));
        assert_eq!(groups["groups"]["Hotel"]["count"], json!(2));
        assert_eq!(groups["groups"]["unknown"]["sample"][0]["Id"], json!("4"));
    }

    #[test]
    fn test_distinct_values_expand_lists() {
        let out = aggregate(
            &hotels(),
            &Strategy::DistinctValues {
                fields: vec!["Tags".into(), "Stars".into()],
            },
        )
        .unwrap();
        assert_eq!(out["distinct_values"]["Tags"], json!(["pool", "spa"]));
        assert_eq!(out["distinct_values"]["Stars"], json!(["2", "3", "4", "5"]));
    }

    #[test]
    fn test_summarize_detects_numeric_fields() {
        let out = aggregate(&hotels(), &Strategy::SummarizeFields { fields: None }).unwrap();
        assert_eq!(
            out["summary"]["Stars"],
            json!({"count": 4, "min": 2.0, "max": 5.0, "avg": 3.5, "sum": 14.0})
        );
        assert!(out["summary"].get("Id").is_none());
    }

    #[test]
    fn test_strategy_must_be_named() {
        let err = serde_json::from_value::<Strategy>(json!({"group_by": "Type"})).unwrap_err();
        assert!(err.to_string().contains("strategy"));
        let err = aggregate(&hotels(), &Strategy::ExtractFields { fields: vec![] }).unwrap_err();
        assert_eq!(err.error_type(), "MissingParameter");
    }
}
