//! Query request model
//!
//! The caller names an operation explicitly; parameters are checked against
//! that operation up front instead of inferring intent from which ones happen
//! to be present.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default row count for `head` / `tail`
pub const DEFAULT_LIMIT: usize = 10;

/// Supported operation names
pub const OPERATIONS: &[&str] = &[
    "filter",
    "sort",
    "select",
    "groupby",
    "head",
    "tail",
    "describe",
    "value_counts",
];

/// Loose parameter bag as sent by the agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryParams {
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub ascending: Option<bool>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub group_by: Option<String>,
    #[serde(default)]
    pub agg_func: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl QueryParams {
    /// Union of two parameter sets; a key given in both with different
    /// values is rejected
    pub fn merge(self, other: QueryParams) -> Result<QueryParams> {
        Ok(QueryParams {
            condition: pick("condition", self.condition, other.condition)?,
            sort_by: pick("sort_by", self.sort_by, other.sort_by)?,
            ascending: pick("ascending", self.ascending, other.ascending)?,
            columns: pick("columns", self.columns, other.columns)?,
            group_by: pick("group_by", self.group_by, other.group_by)?,
            agg_func: pick("agg_func", self.agg_func, other.agg_func)?,
            limit: pick("limit", self.limit, other.limit)?,
        })
    }
}

fn pick<T: PartialEq>(param: &str, a: Option<T>, b: Option<T>) -> Result<Option<T>> {
    match (a, b) {
        (Some(a), Some(b)) if a != b => Err(Error::invalid(
            param,
            "given both inside params and at top level with different values",
        )),
        (a, b) => Ok(a.or(b)),
    }
}

/// Aggregate applied per group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggFunc {
    Count,
    Sum,
    Mean,
    Min,
    Max,
    Median,
}

impl AggFunc {
    pub fn as_str(self) -> &'static str {
        match self {
            AggFunc::Count => "count",
            AggFunc::Sum => "sum",
            AggFunc::Mean => "mean",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::Median => "median",
        }
    }
}

impl fmt::Display for AggFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggFunc {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "count" | "size" => Ok(AggFunc::Count),
            "sum" => Ok(AggFunc::Sum),
            "mean" | "avg" | "average" => Ok(AggFunc::Mean),
            "min" => Ok(AggFunc::Min),
            "max" => Ok(AggFunc::Max),
            "median" => Ok(AggFunc::Median),
            other => Err(Error::invalid(
                "agg_func",
                format!("'{}' is not one of count, sum, mean, min, max, median", other),
            )),
        }
    }
}

/// A validated query operation
#[derive(Debug, Clone, PartialEq)]
pub enum QueryRequest {
    Filter { condition: String },
    Sort { by: String, ascending: bool },
    Select { columns: Vec<String> },
    GroupBy { by: String, agg: AggFunc },
    Head { n: usize },
    Tail { n: usize },
    Describe,
    ValueCounts { column: String },
}

impl QueryRequest {
    /// Build a request for `operation`, rejecting missing or malformed
    /// parameters
    pub fn from_params(operation: &str, params: &QueryParams) -> Result<Self> {
        let require = |value: &Option<String>, param: &str| {
            value
                .clone()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::missing(operation, param))
        };

        match operation {
            "filter" => Ok(QueryRequest::Filter {
                condition: require(&params.condition, "condition")?,
            }),
            "sort" => Ok(QueryRequest::Sort {
                by: require(&params.sort_by, "sort_by")?,
                ascending: params.ascending.unwrap_or(true),
            }),
            "select" => match &params.columns {
                Some(columns) if !columns.is_empty() => Ok(QueryRequest::Select {
                    columns: columns.clone(),
                }),
                _ => Err(Error::missing(operation, "columns")),
            },
            "groupby" | "group_by" => Ok(QueryRequest::GroupBy {
                by: require(&params.group_by, "group_by")?,
                agg: params
                    .agg_func
                    .as_deref()
                    .map(AggFunc::from_str)
                    .transpose()?
                    .unwrap_or(AggFunc::Count),
            }),
            "head" => Ok(QueryRequest::Head {
                n: params.limit.unwrap_or(DEFAULT_LIMIT),
            }),
            "tail" => Ok(QueryRequest::Tail {
                n: params.limit.unwrap_or(DEFAULT_LIMIT),
            }),
            "describe" => Ok(QueryRequest::Describe),
            "value_counts" => match params.columns.as_deref() {
                Some([column]) => Ok(QueryRequest::ValueCounts {
                    column: column.clone(),
                }),
                None | Some([]) => Err(Error::missing(operation, "columns")),
                Some(many) => Err(Error::invalid(
                    "columns",
                    format!("value_counts takes exactly one column, got {}", many.len()),
                )),
            },
            other => Err(Error::UnknownOperation {
                name: other.to_string(),
                available: OPERATIONS.iter().map(|s| s.to_string()).collect(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            QueryRequest::Filter { .. } => "filter",
            QueryRequest::Sort { .. } => "sort",
            QueryRequest::Select { .. } => "select",
            QueryRequest::GroupBy { .. } => "groupby",
            QueryRequest::Head { .. } => "head",
            QueryRequest::Tail { .. } => "tail",
            QueryRequest::Describe => "describe",
            QueryRequest::ValueCounts { .. } => "value_counts",
        }
    }

    /// Whether `limit` already is the row count of this operation
    pub fn consumes_limit(&self) -> bool {
        matches!(self, QueryRequest::Head { .. } | QueryRequest::Tail { .. })
    }
}

/// Accept `"col"` as shorthand for `["col"]`
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => None,
        Some(OneOrMany::One(column)) => Some(vec![column]),
        Some(OneOrMany::Many(columns)) => Some(columns),
    })
}
