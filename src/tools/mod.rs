//! Named operations exposed to the agent, wired into a response governor
//!
//! - `stage_data`: stage a payload, get a cache key
//! - `inspect_data`: sample-based schema of a staged value
//! - `flatten_data`: nested records to a staged dataset
//! - `dataframe_query`: query a staged dataset, chaining by key
//! - `aggregate_data`: strategy-based reduction of a large collection

pub mod aggregate;
pub mod flatten;
pub mod inspect;
pub mod query;
pub mod stage;

pub use aggregate::{aggregate, AggregateData, Strategy};
pub use flatten::FlattenData;
pub use inspect::InspectData;
pub use query::DataframeQuery;
pub use stage::StageData;

use crate::config::Config;
use crate::governor::{GovernedResponse, Operation, ResponseGovernor};
use crate::staging::{with_cache, CacheResolver, SessionRegistry, StagingCache};
use crate::tokens::build_estimator;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// The governed tool surface plus the caches it runs against
pub struct Toolkit {
    governor: ResponseGovernor,
    sessions: SessionRegistry,
    global_cache: Arc<StagingCache>,
}

impl Toolkit {
    /// Build the toolkit with every operation registered at its configured
    /// budget
    pub fn new(config: &Config) -> Self {
        let global_cache = Arc::new(StagingCache::new(config.cache.global_ttl()));
        let estimator = build_estimator(config.governor.tokenizer);
        info!(
            "Measuring tool responses with {} (default budget {} tokens)",
            estimator.name(),
            config.governor.default_max_tokens
        );

        let mut governor = ResponseGovernor::new(
            estimator,
            CacheResolver::new(Arc::clone(&global_cache)),
            config.governor.default_max_tokens,
        );

        let operations: Vec<Arc<dyn Operation>> = vec![
            Arc::new(StageData),
            Arc::new(InspectData),
            Arc::new(FlattenData),
            Arc::new(DataframeQuery),
            Arc::new(AggregateData),
        ];
        for operation in operations {
            let budget = config.governor.budget_for(operation.name());
            governor.register(operation, Some(budget));
        }

        Self {
            governor,
            sessions: SessionRegistry::new(config.cache.session_ttl(), config.cache.session_idle()),
            global_cache,
        }
    }

    /// Execute against the global fallback cache
    pub async fn execute(&self, name: &str, args: Value) -> GovernedResponse {
        self.governor.execute(name, args).await
    }

    /// Execute with the session's cache bound for the duration of the call
    pub async fn execute_for_session(
        &self,
        session_id: &str,
        name: &str,
        args: Value,
    ) -> GovernedResponse {
        let session = self.sessions.get_or_create(Some(session_id));
        with_cache(session.cache(), self.governor.execute(name, args)).await
    }

    /// Tear down a session and release its cache
    pub fn end_session(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id)
    }

    /// Drop idle sessions and expired fallback entries.
    /// Returns `(sessions_removed, entries_purged)`.
    pub fn sweep(&self) -> (usize, usize) {
        let sessions = self.sessions.sweep_idle();
        let entries = self.global_cache.purge_expired();
        if sessions > 0 || entries > 0 {
            info!(
                "Sweep removed {} idle sessions and {} expired entries",
                sessions, entries
            );
        }
        (sessions, entries)
    }

    /// Operation names with their descriptions
    pub fn describe(&self) -> Vec<(&str, &'static str)> {
        self.governor
            .operations()
            .into_iter()
            .filter_map(|name| {
                self.governor
                    .get(name)
                    .map(|r| (name, r.operation.description()))
            })
            .collect()
    }

    pub fn governor(&self) -> &ResponseGovernor {
        &self.governor
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn global_cache(&self) -> &Arc<StagingCache> {
        &self.global_cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenizerKind;
    use serde_json::json;

    fn toolkit() -> Toolkit {
        let mut config = Config::default();
        config.governor.tokenizer = TokenizerKind::Heuristic;
        Toolkit::new(&config)
    }

    #[tokio::test]
    async fn test_all_operations_registered_with_budgets() {
        let toolkit = toolkit();
        let names: Vec<&str> = toolkit.describe().into_iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            vec!["aggregate_data", "dataframe_query", "flatten_data", "inspect_data", "stage_data"]
        );
        assert_eq!(toolkit.governor().budget_for("stage_data"), Some(500));
        assert_eq!(toolkit.governor().budget_for("dataframe_query"), Some(8000));
    }

    #[tokio::test]
    async fn test_stage_then_inspect() {
        let toolkit = toolkit();
        let staged = toolkit
            .execute("stage_data", json!({"data": {"Items": [{"a": 1}, {"a": 2}]}, "key": "raw"}))
            .await;
        assert!(staged.success);
        assert_eq!(staged.result.as_ref().unwrap()["item_count"], json!(2));

        let inspected = toolkit.execute("inspect_data", json!({"cache_key": "raw"})).await;
        let result = inspected.result.unwrap();
        assert_eq!(result["total_items"], json!(2));
        assert_eq!(result["fields"][0]["path"], json!("a"));
        assert_eq!(result["kind"], json!("json"));
    }

    #[tokio::test]
    async fn test_flatten_requires_a_source() {
        let toolkit = toolkit();
        let response = toolkit.execute("flatten_data", json!({"fields": ["a"]})).await;
        assert!(!response.success);
        assert_eq!(response.error_type.as_deref(), Some("MissingParameter"));

        let response = toolkit
            .execute("flatten_data", json!({"cache_key": "cache_00000000"}))
            .await;
        assert_eq!(response.error_type.as_deref(), Some("CacheMiss"));
    }

    #[tokio::test]
    async fn test_query_params_nested_or_inline() {
        let toolkit = toolkit();
        let flat = toolkit
            .execute("flatten_data", json!({"data": [{"n": 3}, {"n": 1}, {"n": 2}]}))
            .await;
        let key = flat.result.unwrap()["dataframe_key"].as_str().unwrap().to_string();

        let inline = toolkit
            .execute(
                "dataframe_query",
                json!({"dataframe_key": key, "operation": "sort", "sort_by": "n"}),
            )
            .await;
        let nested = toolkit
            .execute(
                "dataframe_query",
                json!({"dataframe_key": key, "operation": "sort", "params": {"sort_by": "n"}}),
            )
            .await;
        assert_eq!(
            inline.result.as_ref().unwrap()["data"],
            nested.result.as_ref().unwrap()["data"]
        );
        assert_eq!(inline.result.unwrap()["data"][0], json!({"n": 1}));

        let mixed = toolkit
            .execute(
                "dataframe_query",
                json!({"dataframe_key": key, "operation": "sort", "params": {"sort_by": "n"}, "limit": 1}),
            )
            .await;
        assert_eq!(mixed.result.unwrap()["data"], json!([{"n": 1}]));

        let conflicting = toolkit
            .execute(
                "dataframe_query",
                json!({"dataframe_key": key, "operation": "head", "params": {"limit": 2}, "limit": 1}),
            )
            .await;
        assert_eq!(conflicting.error_type.as_deref(), Some("InvalidParameter"));
    }

    #[tokio::test]
    async fn test_end_session_clears_cache() {
        let toolkit = toolkit();
        toolkit
            .execute_for_session("s1", "stage_data", json!({"data": [1, 2], "key": "k"}))
            .await;
        let cache = toolkit.sessions().get("s1").unwrap().cache();
        assert!(cache.get("k").is_some());

        assert!(toolkit.end_session("s1"));
        assert!(cache.is_empty());
        assert!(toolkit.global_cache().get("k").is_none());
    }

    #[tokio::test]
    async fn test_sweep_keeps_live_state() {
        let toolkit = toolkit();
        toolkit
            .execute_for_session("s1", "stage_data", json!({"data": 1, "key": "k"}))
            .await;
        toolkit.execute("stage_data", json!({"data": 2, "key": "g"})).await;

        assert_eq!(toolkit.sweep(), (0, 0));
        assert_eq!(toolkit.sessions().len(), 1);
        assert!(toolkit.global_cache().get("g").is_some());
    }
}
