//! Keyed staging cache with TTL expiry
//!
//! Holds oversized intermediate results (raw JSON or tabular datasets) out of
//! the model's context so later operations can reference them by key.

use crate::metrics::METRICS;
use crate::tabular::TabularDataset;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A value held in the staging cache
#[derive(Debug, Clone, PartialEq)]
pub enum StagedValue {
    Json(Value),
    Table(Arc<TabularDataset>),
}

impl StagedValue {
    pub fn kind(&self) -> &'static str {
        match self {
            StagedValue::Json(_) => "json",
            StagedValue::Table(_) => "table",
        }
    }
}

impl From<Value> for StagedValue {
    fn from(value: Value) -> Self {
        StagedValue::Json(value)
    }
}

impl From<TabularDataset> for StagedValue {
    fn from(table: TabularDataset) -> Self {
        StagedValue::Table(Arc::new(table))
    }
}

/// Cache entry with TTL bookkeeping
#[derive(Debug, Clone)]
struct CacheEntry {
    value: StagedValue,
    inserted_at: Instant,
    stored_at: DateTime<Utc>,
    access_count: u64,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() > ttl
    }
}

/// Per-entry statistics
#[derive(Debug, Clone, Serialize)]
pub struct EntryStats {
    pub key: String,
    pub kind: &'static str,
    pub stored_at: String,
    pub access_count: u64,
    pub age_seconds: f64,
}

/// Cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub entries: Vec<EntryStats>,
}

/// TTL-bound staging cache, safe for concurrent use
pub struct StagingCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl StagingCache {
    /// Create a new cache whose entries live for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn with_ttl_minutes(minutes: u64) -> Self {
        Self::new(Duration::from_secs(minutes * 60))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store a value under `key`, or under a generated key when `None`.
    /// Overwrites any existing value and restarts its TTL.
    pub fn store(&self, value: impl Into<StagedValue>, key: Option<&str>) -> String {
        let value = value.into();
        let kind = value.kind();
        let entry = CacheEntry {
            value,
            inserted_at: Instant::now(),
            stored_at: Utc::now(),
            access_count: 0,
        };

        let key = match key {
            Some(key) => {
                self.entries.insert(key.to_string(), entry);
                key.to_string()
            }
            None => self.insert_generated(entry),
        };

        METRICS.record_cache_store();
        info!("Staged {} value under key '{}'", kind, key);
        self.purge_expired();

        key
    }

    /// Insert under a fresh `cache_xxxxxxxx` key, retrying on collision
    /// with a live entry
    fn insert_generated(&self, entry: CacheEntry) -> String {
        loop {
            let key = generate_key();
            match self.entries.entry(key.clone()) {
                Entry::Occupied(mut existing) => {
                    if existing.get().is_expired(self.ttl) {
                        existing.insert(entry);
                        return key;
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(entry);
                    return key;
                }
            }
        }
    }

    /// Look up a live value. `None` for absent and expired keys; expired
    /// entries are removed on the way out.
    pub fn get(&self, key: &str) -> Option<StagedValue> {
        let expired = match self.entries.get_mut(key) {
            None => {
                warn!("Cache miss: key '{}' not found", key);
                METRICS.record_cache_lookup("miss");
                return None;
            }
            Some(mut entry) => {
                if entry.is_expired(self.ttl) {
                    true
                } else {
                    entry.access_count += 1;
                    debug!(
                        "Cache hit: key '{}' (accessed {} times)",
                        key, entry.access_count
                    );
                    METRICS.record_cache_lookup("hit");
                    return Some(entry.value.clone());
                }
            }
        };

        if expired {
            self.entries
                .remove_if(key, |_, entry| entry.is_expired(self.ttl));
            warn!("Cache expired: key '{}'", key);
            METRICS.record_cache_lookup("expired");
        }
        None
    }

    /// Look up a tabular dataset, distinguishing a miss from a wrong kind
    pub fn get_table(&self, key: &str) -> crate::error::Result<Arc<TabularDataset>> {
        match self.get(key) {
            None => Err(crate::error::Error::CacheMiss(key.to_string())),
            Some(StagedValue::Table(table)) => Ok(table),
            Some(other) => Err(crate::error::Error::NotTabular {
                key: key.to_string(),
                found: other.kind(),
            }),
        }
    }

    /// Number of times a live entry has been read
    pub fn access_count(&self, key: &str) -> Option<u64> {
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(self.ttl))
            .map(|entry| entry.access_count)
    }

    /// Remove a key; true if something was removed
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            info!("Deleted cache key: {}", key);
        }
        removed
    }

    /// Drop every entry
    pub fn clear(&self) {
        let count = self.entries.len();
        self.entries.clear();
        info!("Cleared {} cache entries", count);
    }

    /// Remove expired entries, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(self.ttl));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            info!("Cleaned up {} expired cache entries", removed);
        }
        removed
    }

    /// Number of entries currently held, expired or not
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let mut entries: Vec<EntryStats> = self
            .entries
            .iter()
            .map(|item| EntryStats {
                key: item.key().clone(),
                kind: item.value.kind(),
                stored_at: item.stored_at.to_rfc3339(),
                access_count: item.access_count,
                age_seconds: item.inserted_at.elapsed().as_secs_f64(),
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        CacheStats {
            total_entries: entries.len(),
            entries,
        }
    }
}

fn generate_key() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("cache_{}", &id[..8])
}
