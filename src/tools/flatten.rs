//! `flatten_data`: nested records to a staged tabular dataset

use crate::error::{Error, Result};
use crate::governor::{parse_args, Operation, OperationContext};
use crate::staging::StagedValue;
use crate::tabular::{flatten_and_stage, FlattenOptions};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct FlattenArgs {
    #[serde(default)]
    cache_key: Option<String>,
    /// Inline records, used instead of `cache_key`
    #[serde(default)]
    data: Option<Value>,
    #[serde(flatten)]
    options: FlattenOptions,
}

pub struct FlattenData;

#[async_trait]
impl Operation for FlattenData {
    fn name(&self) -> &'static str {
        "flatten_data"
    }

    fn description(&self) -> &'static str {
        "Turn nested records (from cache_key or inline data) into a table. \
         `fields` are dot paths such as Detail.en.Title or Tags.0; `explode` \
         fans out the first list-valued column. Returns a dataframe_key for dataframe_query."
    }

    async fn invoke(&self, args: Value, cx: &OperationContext) -> Result<Value> {
        let args: FlattenArgs = parse_args(self.name(), args)?;

        let source = match (args.data, args.cache_key) {
            (Some(data), _) => data,
            (None, Some(key)) => match cx.cache().get(&key) {
                Some(StagedValue::Json(value)) => value,
                Some(StagedValue::Table(table)) => table.to_json_rows(),
                None => return Err(Error::CacheMiss(key)),
            },
            (None, None) => return Err(Error::missing(self.name(), "cache_key")),
        };

        let summary = flatten_and_stage(cx.cache(), &source, &args.options)?;
        Ok(serde_json::to_value(summary)?)
    }
}
