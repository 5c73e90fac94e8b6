//! Query engine: filter, sort, select, groupby, head/tail, describe and
//! value_counts over staged datasets

pub mod condition;
pub mod engine;
pub mod request;

pub use condition::Condition;
pub use engine::{apply, query, OperationResult, QueryOutput};
pub use request::{AggFunc, QueryParams, QueryRequest, DEFAULT_LIMIT, OPERATIONS};
