//! Result caching keyed on query semantics.
//!
//! The cache is an optimization, never a correctness dependency: every
//! backing-store failure is absorbed into a miss (`get`) or a no-op (`set`,
//! `invalidate`) with a warning, and the pipeline degrades to always-miss
//! when the store is unavailable.

mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use memory::InMemoryStore;
#[cfg(feature = "redis")]
pub use redis::RedisStore;

use crate::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Key namespace for cascade search results.
pub const SEARCH_NAMESPACE: &str = "search";
/// Key namespace for intent-analysis results.
pub const INTENT_NAMESPACE: &str = "intent";
/// Key namespace for end-to-end agent outcomes.
pub const AGENT_NAMESPACE: &str = "agent";

/// Default TTL for positive cache entries (1 hour).
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);
/// Shorter TTL for ambiguous/not-found outcomes (30 minutes), so the same
/// unanswerable question is not recomputed on every ask.
pub const NEGATIVE_TTL: Duration = Duration::from_secs(1800);

/// Backing store for cached payloads.
///
/// Implementations must be safe to call from multiple threads. Errors are
/// surfaced to [`ResultCache`], which absorbs them; stores should not retry
/// internally.
pub trait CacheStore: Send + Sync {
    /// Fetches a raw payload by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable or the read fails.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores a raw payload under a key with a time-to-live.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable or the write fails.
    fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Deletes all keys matching a glob-style pattern, returning the count.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    fn delete_by_pattern(&self, pattern: &str) -> Result<usize>;

    /// Counts keys matching a glob-style pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    fn key_count(&self, pattern: &str) -> Result<usize>;
}

/// Cache usage statistics for operational dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Whether a backing store is configured.
    pub enabled: bool,
    /// Total keys in the store (0 when the store is unreachable).
    pub total_keys: usize,
    /// Keys in the search namespace.
    pub search_cache_keys: usize,
    /// Hit rate in percent since process start.
    pub hit_rate: f64,
}

/// Normalizes a query for key derivation: lowercase, trimmed, collapsed
/// whitespace. Two queries that normalize identically share a cache entry.
#[must_use]
pub fn normalize_key_input(query: &str) -> String {
    query
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Query-result cache with namespaced, hash-derived keys.
pub struct ResultCache {
    store: Option<Arc<dyn CacheStore>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    /// Creates a cache over the given backing store.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store: Some(store),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Creates a disabled cache: every `get` misses, every `set` is a no-op.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            store: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Derives the storage key for a query within a namespace.
    #[must_use]
    pub fn cache_key(namespace: &str, query: &str) -> String {
        let normalized = normalize_key_input(query);
        let digest = Sha256::digest(normalized.as_bytes());
        format!("{namespace}:{}", hex::encode(digest))
    }

    /// Fetches and deserializes a cached payload.
    ///
    /// Any store or deserialization failure is treated as a miss.
    pub fn get<T: DeserializeOwned>(&self, namespace: &str, query: &str) -> Option<T> {
        let store = self.store.as_ref()?;
        let key = Self::cache_key(namespace, query);

        match store.get(&key) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!("cache_hits_total", "namespace" => namespace.to_string())
                        .increment(1);
                    tracing::debug!(namespace, "cache hit");
                    Some(value)
                },
                Err(err) => {
                    // A stale or hand-edited entry; drop it and miss.
                    tracing::warn!(namespace, error = %err, "cache payload failed to parse");
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    None
                },
            },
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("cache_misses_total", "namespace" => namespace.to_string())
                    .increment(1);
                None
            },
            Err(err) => {
                tracing::warn!(namespace, error = %err, "cache get failed, treating as miss");
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            },
        }
    }

    /// Serializes and stores a payload. Returns whether it was stored.
    ///
    /// Failures are logged and absorbed; callers never see a cache error.
    pub fn set<T: Serialize>(&self, namespace: &str, query: &str, value: &T, ttl: Duration) -> bool {
        let Some(store) = self.store.as_ref() else {
            return false;
        };
        let key = Self::cache_key(namespace, query);

        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(namespace, error = %err, "cache payload failed to serialize");
                return false;
            },
        };

        match store.set_with_ttl(&key, &raw, ttl) {
            Ok(()) => {
                tracing::debug!(namespace, ttl_secs = ttl.as_secs(), "cached result");
                true
            },
            Err(err) => {
                tracing::warn!(namespace, error = %err, "cache set failed, not stored");
                false
            },
        }
    }

    /// Deletes cached entries matching a pattern (e.g. `search:*`),
    /// returning how many were removed. Failures count as zero.
    pub fn invalidate(&self, pattern: &str) -> usize {
        let Some(store) = self.store.as_ref() else {
            return 0;
        };

        match store.delete_by_pattern(pattern) {
            Ok(count) => {
                tracing::info!(pattern, count, "invalidated cache entries");
                count
            },
            Err(err) => {
                tracing::warn!(pattern, error = %err, "cache invalidation failed");
                0
            },
        }
    }

    /// Returns usage statistics. A failing store reports as disabled-like
    /// zeros rather than an error.
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        #[allow(clippy::cast_precision_loss)]
        let hit_rate = (hits as f64) / ((hits + misses).max(1) as f64) * 100.0;

        let Some(store) = self.store.as_ref() else {
            return CacheStats {
                enabled: false,
                total_keys: 0,
                search_cache_keys: 0,
                hit_rate,
            };
        };

        let total_keys = store.key_count("*").unwrap_or(0);
        let search_cache_keys = store
            .key_count(&format!("{SEARCH_NAMESPACE}:*"))
            .unwrap_or(0);

        CacheStats {
            enabled: true,
            total_keys,
            search_cache_keys,
            hit_rate,
        }
    }

    /// Whether a backing store is configured.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.store.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use proptest::prelude::*;

    /// Store that fails every operation, simulating an unreachable backend.
    struct FailingStore;

    impl CacheStore for FailingStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(Error::OperationFailed {
                operation: "cache_get".to_string(),
                cause: "connection refused".to_string(),
            })
        }

        fn set_with_ttl(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
            Err(Error::OperationFailed {
                operation: "cache_set".to_string(),
                cause: "connection refused".to_string(),
            })
        }

        fn delete_by_pattern(&self, _pattern: &str) -> Result<usize> {
            Err(Error::OperationFailed {
                operation: "cache_delete".to_string(),
                cause: "connection refused".to_string(),
            })
        }

        fn key_count(&self, _pattern: &str) -> Result<usize> {
            Err(Error::OperationFailed {
                operation: "cache_keys".to_string(),
                cause: "connection refused".to_string(),
            })
        }
    }

    #[test]
    fn test_equivalent_queries_share_a_key() {
        let a = ResultCache::cache_key(SEARCH_NAMESPACE, "Когда Зарплата");
        let b = ResultCache::cache_key(SEARCH_NAMESPACE, "  когда   зарплата  ");
        assert_eq!(a, b);
    }

    #[test]
    fn test_namespaces_do_not_collide() {
        let a = ResultCache::cache_key(SEARCH_NAMESPACE, "зарплата");
        let b = ResultCache::cache_key(INTENT_NAMESPACE, "зарплата");
        assert_ne!(a, b);
    }

    #[test]
    fn test_round_trip_through_memory_store() {
        let cache = ResultCache::new(Arc::new(InMemoryStore::new()));
        assert!(cache.set(SEARCH_NAMESPACE, "q", &vec![1, 2, 3], DEFAULT_TTL));
        let back: Option<Vec<i32>> = cache.get(SEARCH_NAMESPACE, "q");
        assert_eq!(back, Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_failing_store_degrades_to_miss() {
        let cache = ResultCache::new(Arc::new(FailingStore));
        let got: Option<Vec<i32>> = cache.get(SEARCH_NAMESPACE, "q");
        assert!(got.is_none());
        assert!(!cache.set(SEARCH_NAMESPACE, "q", &vec![1], DEFAULT_TTL));
        assert_eq!(cache.invalidate("search:*"), 0);

        let stats = cache.stats();
        assert!(stats.enabled);
        assert_eq!(stats.total_keys, 0);
    }

    #[test]
    fn test_disabled_cache_always_misses() {
        let cache = ResultCache::disabled();
        assert!(!cache.is_enabled());
        let got: Option<Vec<i32>> = cache.get(SEARCH_NAMESPACE, "q");
        assert!(got.is_none());
        assert!(!cache.set(SEARCH_NAMESPACE, "q", &vec![1], DEFAULT_TTL));
        assert!(!cache.stats().enabled);
    }

    #[test]
    fn test_garbage_payload_is_a_miss() {
        let store = Arc::new(InMemoryStore::new());
        let key = ResultCache::cache_key(SEARCH_NAMESPACE, "q");
        store.set_with_ttl(&key, "not json at all", DEFAULT_TTL).unwrap();

        let cache = ResultCache::new(store);
        let got: Option<Vec<i32>> = cache.get(SEARCH_NAMESPACE, "q");
        assert!(got.is_none());
    }

    #[test]
    fn test_hit_rate_tracks_hits_and_misses() {
        let cache = ResultCache::new(Arc::new(InMemoryStore::new()));
        let _: Option<Vec<i32>> = cache.get(SEARCH_NAMESPACE, "miss");
        cache.set(SEARCH_NAMESPACE, "hit", &vec![1], DEFAULT_TTL);
        let _: Option<Vec<i32>> = cache.get(SEARCH_NAMESPACE, "hit");

        let stats = cache.stats();
        assert!((stats.hit_rate - 50.0).abs() < 1e-9);
        assert_eq!(stats.total_keys, 1);
        assert_eq!(stats.search_cache_keys, 1);
    }

    proptest! {
        #[test]
        fn prop_key_is_casing_and_spacing_invariant(query in "[a-zA-Zа-яА-Я ]{1,40}") {
            let spaced = format!("  {}  ", query.to_uppercase());
            prop_assert_eq!(
                ResultCache::cache_key(SEARCH_NAMESPACE, &query),
                ResultCache::cache_key(SEARCH_NAMESPACE, &spaced)
            );
        }
    }
}
