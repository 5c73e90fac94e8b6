//! Per-session cache ownership
//!
//! A session owns exactly one staging cache, created on first use and
//! cleared when the session is torn down.

use super::cache::StagingCache;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// A logical conversation session
pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    last_activity_ms: AtomicI64,
    cache_ttl: Duration,
    cache: OnceCell<Arc<StagingCache>>,
}

impl Session {
    pub fn new(id: impl Into<String>, cache_ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            created_at: now,
            last_activity_ms: AtomicI64::new(now.timestamp_millis()),
            cache_ttl,
            cache: OnceCell::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The session's cache, created on first use
    pub fn cache(&self) -> Arc<StagingCache> {
        Arc::clone(self.cache.get_or_init(|| {
            debug!("Created cache for session {}", self.id);
            Arc::new(StagingCache::new(self.cache_ttl))
        }))
    }

    pub fn has_cache(&self) -> bool {
        self.cache.get().is_some()
    }

    pub fn touch(&self) {
        self.last_activity_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn idle_for(&self) -> Duration {
        let idle_ms = Utc::now().timestamp_millis() - self.last_activity_ms.load(Ordering::Relaxed);
        Duration::from_millis(idle_ms.max(0) as u64)
    }

    /// Release the cache's memory
    pub fn teardown(&self) {
        if let Some(cache) = self.cache.get() {
            cache.clear();
        }
    }
}

/// Registry of live sessions
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
    cache_ttl: Duration,
    max_idle: Duration,
}

impl SessionRegistry {
    pub fn new(cache_ttl: Duration, max_idle: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            cache_ttl,
            max_idle,
        }
    }

    /// Fetch a session, creating it (with a generated id when `None`)
    pub fn get_or_create(&self, id: Option<&str>) -> Arc<Session> {
        let id = id
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let session = self
            .sessions
            .entry(id.clone())
            .or_insert_with(|| {
                info!("Created new session: {}", id);
                Arc::new(Session::new(id.clone(), self.cache_ttl))
            })
            .clone();
        session.touch();
        session
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|s| Arc::clone(s.value()))
    }

    /// Tear down a session and clear its cache
    pub fn remove(&self, id: &str) -> bool {
        match self.sessions.remove(id) {
            Some((_, session)) => {
                session.teardown();
                info!("Removed session: {}", id);
                true
            }
            None => false,
        }
    }

    /// Tear down sessions idle longer than the configured maximum
    pub fn sweep_idle(&self) -> usize {
        let idle: Vec<String> = self
            .sessions
            .iter()
            .filter(|s| s.idle_for() > self.max_idle)
            .map(|s| s.key().clone())
            .collect();

        let removed = idle.iter().filter(|id| self.remove(id)).count();
        if removed > 0 {
            info!("Swept {} idle sessions", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::StagedValue;
    use serde_json::json;

    #[test]
    fn test_cache_is_lazy_and_stable() {
        let session = Session::new("s1", Duration::from_secs(60));
        assert!(!session.has_cache());
        let a = session.cache();
        let b = session.cache();
        assert!(session.has_cache());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.ttl(), Duration::from_secs(60));
    }

    #[test]
    fn test_sessions_are_isolated() {
        let registry = SessionRegistry::new(Duration::from_secs(60), Duration::from_secs(3600));
        let a = registry.get_or_create(Some("a"));
        let b = registry.get_or_create(Some("b"));

        a.cache().store(json!("from a"), Some("shared_key"));
        b.cache().store(json!("from b"), Some("shared_key"));

        assert_eq!(a.cache().get("shared_key"), Some(StagedValue::Json(json!("from a"))));
        assert_eq!(b.cache().get("shared_key"), Some(StagedValue::Json(json!("from b"))));
    }

    #[test]
    fn test_remove_clears_cache() {
        let registry = SessionRegistry::new(Duration::from_secs(60), Duration::from_secs(3600));
        let session = registry.get_or_create(Some("gone"));
        let cache = session.cache();
        cache.store(json!(1), Some("k"));

        assert!(registry.remove("gone"));
        assert!(cache.is_empty());
        assert!(registry.get("gone").is_none());
        assert!(!registry.remove("gone"));
    }

    #[test]
    fn test_sweep_idle() {
        let registry = SessionRegistry::new(Duration::from_secs(60), Duration::from_millis(20));
        registry.get_or_create(Some("old"));
        std::thread::sleep(Duration::from_millis(40));
        registry.get_or_create(Some("fresh"));

        assert_eq!(registry.sweep_idle(), 1);
        assert!(registry.get("fresh").is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_generated_session_id() {
        let registry = SessionRegistry::new(Duration::from_secs(60), Duration::from_secs(60));
        let session = registry.get_or_create(None);
        assert_eq!(session.id().len(), 36);
    }
}
