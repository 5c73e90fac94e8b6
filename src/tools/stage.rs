//! `stage_data`: hand an oversized payload to the staging cache

use crate::error::Result;
use crate::governor::{parse_args, Operation, OperationContext};
use crate::tabular::normalize;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct StageArgs {
    data: Value,
    #[serde(default)]
    key: Option<String>,
}

pub struct StageData;

#[async_trait]
impl Operation for StageData {
    fn name(&self) -> &'static str {
        "stage_data"
    }

    fn description(&self) -> &'static str {
        "Store a payload in the staging cache and return its cache_key. \
         Pass `key` to choose a meaningful name; otherwise one is generated."
    }

    async fn invoke(&self, args: Value, cx: &OperationContext) -> Result<Value> {
        let args: StageArgs = parse_args(self.name(), args)?;
        let item_count = normalize(&args.data).items.len();
        let cache_key = cx.cache().store(args.data, args.key.as_deref());

        Ok(json!({
            "cache_key": cache_key,
            "kind": "json",
            "item_count": item_count,
        }))
    }
}
