//! Tabular pipeline: nested JSON to fixed-column rows, and queries over them

pub mod dataset;
pub mod flatten;
pub mod inspect;
pub mod query;
pub mod source;

pub use dataset::{ColumnType, Record, Scalar, TabularDataset};
pub use flatten::{flatten, flatten_and_stage, FlattenOptions, FlattenSummary};
pub use inspect::{inspect, FieldSummary, SchemaSummary};
pub use query::{OperationResult, QueryParams, QueryRequest};
pub use source::{extract_path, normalize, NormalizedSource};
