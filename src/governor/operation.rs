//! Operation abstraction and registration

use crate::error::{Error, Result};
use crate::staging::StagingCache;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Per-invocation context handed to an operation
#[derive(Clone)]
pub struct OperationContext {
    /// Cache resolved for this call (session cache or fallback)
    pub cache: Arc<StagingCache>,
}

impl OperationContext {
    pub fn new(cache: Arc<StagingCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &StagingCache {
        &self.cache
    }
}

/// A named, argument-taking operation run under the governor
#[async_trait]
pub trait Operation: Send + Sync {
    /// Operation name (must be unique)
    fn name(&self) -> &'static str;

    /// Operation description
    fn description(&self) -> &'static str {
        "No description available"
    }

    /// Execute with JSON arguments
    async fn invoke(&self, args: Value, cx: &OperationContext) -> Result<Value>;
}

/// Transform applied to a raw result before it is measured
pub type PostProcessor = Arc<dyn Fn(Value) -> Result<Value> + Send + Sync>;

/// An operation bound to its token budget
#[derive(Clone)]
pub struct Registration {
    pub operation: Arc<dyn Operation>,
    pub budget: usize,
    pub post_processor: Option<PostProcessor>,
}

/// Deserialize operation arguments, reporting the failure as a parameter
/// error
pub fn parse_args<T: DeserializeOwned>(operation: &str, args: Value) -> Result<T> {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args)
        .map_err(|e| Error::invalid("arguments", format!("{} for {}", e, operation)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Args {
        cache_key: String,
        #[serde(default)]
        limit: Option<usize>,
    }

    #[test]
    fn test_parse_args() {
        let args: Args = parse_args("probe", json!({"cache_key": "k"})).unwrap();
        assert_eq!(args.cache_key, "k");
        assert!(args.limit.is_none());

        let err = parse_args::<Args>("probe", json!({"limit": 3})).unwrap_err();
        assert_eq!(err.error_type(), "InvalidParameter");
        assert!(err.to_string().contains("cache_key"));

        let err = parse_args::<Args>("probe", Value::Null).unwrap_err();
        assert!(err.to_string().contains("cache_key"));
    }
}
