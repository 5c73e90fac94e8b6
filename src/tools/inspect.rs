//! `inspect_data`: field paths, types and samples of a staged value

use crate::error::{Error, Result};
use crate::governor::{parse_args, Operation, OperationContext};
use crate::tabular::{inspect, SchemaSummary};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_sample_size() -> usize {
    3
}

#[derive(Debug, Deserialize)]
struct InspectArgs {
    cache_key: String,
    #[serde(default = "default_sample_size")]
    sample_size: usize,
}

#[derive(Serialize)]
struct InspectOutput {
    cache_key: String,
    kind: &'static str,
    #[serde(flatten)]
    summary: SchemaSummary,
}

pub struct InspectData;

#[async_trait]
impl Operation for InspectData {
    fn name(&self) -> &'static str {
        "inspect_data"
    }

    fn description(&self) -> &'static str {
        "Discover the structure of a staged value from a small sample: field \
         paths (usable as flatten_data `fields`), their JSON types and a sample value."
    }

    async fn invoke(&self, args: Value, cx: &OperationContext) -> Result<Value> {
        let args: InspectArgs = parse_args(self.name(), args)?;
        let staged = cx
            .cache()
            .get(&args.cache_key)
            .ok_or_else(|| Error::CacheMiss(args.cache_key.clone()))?;

        let output = InspectOutput {
            kind: staged.kind(),
            summary: inspect(&staged, args.sample_size.max(1)),
            cache_key: args.cache_key,
        };
        Ok(serde_json::to_value(output)?)
    }
}
