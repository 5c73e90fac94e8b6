//! Tabular dataset model: fixed columns, ordered rows of scalar cells

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// A single cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// One row keyed by column name, in column order
pub type Record = IndexMap<String, Scalar>;

impl Scalar {
    /// Convert a JSON value; nested objects and arrays become their
    /// compact JSON text so every cell stays scalar
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Scalar::Null,
            Value::Bool(b) => Scalar::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Scalar::Int(i),
                None => Scalar::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Scalar::Str(s.clone()),
            Value::Array(_) | Value::Object(_) => Scalar::Str(value.to_string()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Int(i) => Value::from(*i),
            Scalar::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Scalar::Str(s) => Value::String(s.clone()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Type tag used in flatten and describe summaries
    pub fn type_tag(&self) -> &'static str {
        match self {
            Scalar::Null => "null",
            Scalar::Bool(_) => "boolean",
            Scalar::Int(_) => "integer",
            Scalar::Float(_) => "float",
            Scalar::Str(_) => "string",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Scalar::Bool(_) => 0,
            Scalar::Int(_) | Scalar::Float(_) => 1,
            Scalar::Str(_) => 2,
            Scalar::Null => 3,
        }
    }

    /// Total order used by sort and groupby: `bool < number < string`,
    /// null after everything
    pub fn sort_cmp(&self, other: &Scalar) -> Ordering {
        match (self, other) {
            (Scalar::Bool(a), Scalar::Bool(b)) => a.cmp(b),
            (Scalar::Int(a), Scalar::Int(b)) => a.cmp(b),
            (Scalar::Str(a), Scalar::Str(b)) => a.cmp(b),
            (a, b) if a.rank() == 1 && b.rank() == 1 => {
                let (x, y) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
                x.total_cmp(&y)
            }
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }

    /// Equality with numeric coercion between integers and floats
    pub fn loose_eq(&self, other: &Scalar) -> bool {
        match (self, other) {
            (Scalar::Int(_) | Scalar::Float(_), Scalar::Int(_) | Scalar::Float(_)) => {
                self.as_f64() == other.as_f64()
            }
            _ => self == other,
        }
    }

    /// Ordering between comparable values; `None` for nulls and mixed types
    pub fn partial_cmp_strict(&self, other: &Scalar) -> Option<Ordering> {
        match (self, other) {
            (Scalar::Null, _) | (_, Scalar::Null) => None,
            (Scalar::Bool(a), Scalar::Bool(b)) => Some(a.cmp(b)),
            (Scalar::Str(a), Scalar::Str(b)) => Some(a.cmp(b)),
            (Scalar::Int(a), Scalar::Int(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }

    /// Key used for grouping and counting (JSON rendering)
    pub fn group_key(&self) -> String {
        match self {
            Scalar::Str(s) => s.clone(),
            other => other.to_json().to_string(),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Str(s) => write!(f, "{}", s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

/// Inferred column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    String,
    Null,
    Mixed,
}

impl ColumnType {
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }
}

/// Ordered rows over a fixed column list; every row holds exactly one cell
/// per column
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TabularDataset {
    columns: Vec<String>,
    rows: Vec<Vec<Scalar>>,
}

impl TabularDataset {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build from rows, padding short rows with nulls and dropping extra cells
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Scalar>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Scalar::Null);
                row
            })
            .collect();
        Self { columns, rows }
    }

    /// Append a row, padding or trimming it to the column count
    pub fn push_row(&mut self, mut row: Vec<Scalar>) {
        row.resize(self.columns.len(), Scalar::Null);
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Scalar>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Iterate one column's cells in row order
    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &Scalar> + '_ {
        self.rows.iter().map(move |row| &row[idx])
    }

    /// New dataset with the same columns and the selected rows
    pub fn with_rows(&self, rows: Vec<Vec<Scalar>>) -> Self {
        Self::from_rows(self.columns.clone(), rows)
    }

    pub fn head(&self, n: usize) -> Self {
        self.with_rows(self.rows.iter().take(n).cloned().collect())
    }

    pub fn tail(&self, n: usize) -> Self {
        let skip = self.rows.len().saturating_sub(n);
        self.with_rows(self.rows.iter().skip(skip).cloned().collect())
    }

    /// Infer a column's type from its non-null cells
    pub fn column_type(&self, idx: usize) -> ColumnType {
        let mut inferred: Option<ColumnType> = None;
        for cell in self.column_values(idx) {
            let tag = match cell {
                Scalar::Null => continue,
                Scalar::Bool(_) => ColumnType::Boolean,
                Scalar::Int(_) => ColumnType::Integer,
                Scalar::Float(_) => ColumnType::Float,
                Scalar::Str(_) => ColumnType::String,
            };
            inferred = Some(match inferred {
                None => tag,
                Some(current) if current == tag => current,
                Some(ColumnType::Integer) if tag == ColumnType::Float => ColumnType::Float,
                Some(ColumnType::Float) if tag == ColumnType::Integer => ColumnType::Float,
                Some(_) => return ColumnType::Mixed,
            });
        }
        inferred.unwrap_or(ColumnType::Null)
    }

    /// Column name to inferred type, in column order
    pub fn column_types(&self) -> IndexMap<String, ColumnType> {
        (0..self.columns.len())
            .map(|idx| (self.columns[idx].clone(), self.column_type(idx)))
            .collect()
    }

    pub fn record(&self, row: &[Scalar]) -> Record {
        self.columns
            .iter()
            .cloned()
            .zip(row.iter().cloned())
            .collect()
    }

    /// Rows as column-keyed records
    pub fn records(&self) -> Vec<Record> {
        self.rows.iter().map(|row| self.record(row)).collect()
    }

    /// First `n` rows as records
    pub fn sample(&self, n: usize) -> Vec<Record> {
        self.rows.iter().take(n).map(|row| self.record(row)).collect()
    }

    /// Rows as JSON objects
    pub fn to_json_rows(&self) -> Value {
        Value::Array(
            self.rows
                .iter()
                .map(|row| {
                    Value::Object(
                        self.columns
                            .iter()
                            .cloned()
                            .zip(row.iter().map(Scalar::to_json))
                            .collect(),
                    )
                })
                .collect(),
        )
    }
}
