//! `dataframe_query`: one query operation over a staged dataset

use crate::error::Result;
use crate::governor::{parse_args, Operation, OperationContext};
use crate::tabular::query::{query, QueryParams, QueryRequest};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct QueryArgs {
    dataframe_key: String,
    operation: String,
    /// Parameters nested under `params`, merged with top-level keys
    #[serde(default)]
    params: Option<QueryParams>,
    #[serde(flatten)]
    inline: QueryParams,
}

pub struct DataframeQuery;

#[async_trait]
impl Operation for DataframeQuery {
    fn name(&self) -> &'static str {
        "dataframe_query"
    }

    fn description(&self) -> &'static str {
        "Query a dataset produced by flatten_data. Operations: filter(condition), \
         sort(sort_by, ascending), select(columns), groupby(group_by, agg_func), \
         head/tail(limit), describe, value_counts(columns=[one]). Table results \
         return a new cache_key to chain the next operation."
    }

    async fn invoke(&self, args: Value, cx: &OperationContext) -> Result<Value> {
        let args: QueryArgs = parse_args(self.name(), args)?;
        let params = match args.params {
            Some(nested) => nested.merge(args.inline)?,
            None => args.inline,
        };
        let request = QueryRequest::from_params(&args.operation, &params)?;
        debug!("dataframe_query request: {:?}", request);

        let result = query(cx.cache(), &args.dataframe_key, &request, params.limit)?;
        Ok(serde_json::to_value(result)?)
    }
}
