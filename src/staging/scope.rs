//! Ambient "current session" cache for the task performing a tool call
//!
//! The active cache is bound with [`with_cache`] for exactly the lifetime of
//! one future. It is never inherited by spawned tasks: every concurrent
//! execution path binds its own.

use super::cache::StagingCache;
use std::future::Future;
use std::sync::Arc;

tokio::task_local! {
    static ACTIVE_CACHE: Arc<StagingCache>;
}

/// Run `fut` with `cache` as the active cache
pub async fn with_cache<F>(cache: Arc<StagingCache>, fut: F) -> F::Output
where
    F: Future,
{
    ACTIVE_CACHE.scope(cache, fut).await
}

/// Run a synchronous closure with `cache` as the active cache
pub fn with_cache_sync<R>(cache: Arc<StagingCache>, f: impl FnOnce() -> R) -> R {
    ACTIVE_CACHE.sync_scope(cache, f)
}

/// The cache bound to the current task, if any
pub fn active_cache() -> Option<Arc<StagingCache>> {
    ACTIVE_CACHE.try_with(Arc::clone).ok()
}

/// Resolves the cache for an operation: the task's active cache, or the
/// fallback cache supplied at startup
#[derive(Clone)]
pub struct CacheResolver {
    fallback: Arc<StagingCache>,
}

impl CacheResolver {
    pub fn new(fallback: Arc<StagingCache>) -> Self {
        Self { fallback }
    }

    pub fn resolve(&self) -> Arc<StagingCache> {
        active_cache().unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    pub fn fallback(&self) -> &Arc<StagingCache> {
        &self.fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn cache() -> Arc<StagingCache> {
        Arc::new(StagingCache::new(Duration::from_secs(60)))
    }

    #[tokio::test]
    async fn test_resolver_prefers_active_cache() {
        let fallback = cache();
        let session = cache();
        let resolver = CacheResolver::new(Arc::clone(&fallback));

        with_cache(Arc::clone(&session), async {
            resolver.resolve().store(json!(1), Some("k"));
        })
        .await;

        assert!(session.get("k").is_some());
        assert!(fallback.get("k").is_none());
    }

    #[tokio::test]
    async fn test_scope_is_cleared_after_future() {
        let resolver = CacheResolver::new(cache());
        with_cache(cache(), async {
            assert!(active_cache().is_some());
        })
        .await;
        assert!(active_cache().is_none());
        assert!(Arc::ptr_eq(&resolver.resolve(), resolver.fallback()));
    }

    #[tokio::test]
    async fn test_spawned_task_does_not_inherit_scope() {
        let inherited = with_cache(cache(), async {
            tokio::spawn(async { active_cache().is_some() }).await.unwrap()
        })
        .await;
        assert!(!inherited);
    }

    #[test]
    fn test_sync_scope() {
        let session = cache();
        let bound = with_cache_sync(Arc::clone(&session), || {
            active_cache().map(|c| Arc::ptr_eq(&c, &session))
        });
        assert_eq!(bound, Some(true));
    }
}
