//! Response governance for tool-using LLM agents
//!
//! Tool results are staged in a TTL cache instead of being returned whole,
//! flattened into tables, queried step by step, and every response is held
//! to a per-operation token budget.

pub mod api;
pub mod config;
pub mod error;
pub mod governor;
pub mod metrics;
pub mod staging;
pub mod tabular;
pub mod telemetry;
pub mod tokens;
pub mod tools;

pub use config::Config;
pub use error::{Error, Result};
pub use governor::{GovernedResponse, Operation, OperationContext, ResponseGovernor};
pub use staging::{SessionRegistry, StagedValue, StagingCache};
pub use tabular::TabularDataset;
pub use tokens::{build_estimator, CharRatioEstimator, TokenEstimator};
pub use tools::Toolkit;
