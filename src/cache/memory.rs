//! In-memory cache store.

use super::CacheStore;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Process-local cache store backed by a mutex-guarded map.
///
/// Entries expire lazily: an expired entry is dropped the next time it is
/// read or whenever a pattern scan touches it.
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

struct Entry {
    value: String,
    expires_at: Instant,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries.lock().map_err(|_| Error::OperationFailed {
            operation: "memory_cache_lock".to_string(),
            cause: "poisoned mutex".to_string(),
        })
    }

    /// Matches a glob-style pattern supporting a single trailing `*`.
    fn matches(pattern: &str, key: &str) -> bool {
        pattern.strip_suffix('*').map_or_else(
            || key == pattern,
            |prefix| key.starts_with(prefix),
        )
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            },
            None => Ok(None),
        }
    }

    fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.lock()?;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    fn delete_by_pattern(&self, pattern: &str) -> Result<usize> {
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|key, _| !Self::matches(pattern, key));
        Ok(before - entries.len())
    }

    fn key_count(&self, pattern: &str) -> Result<usize> {
        let mut entries = self.lock()?;
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);
        Ok(entries
            .keys()
            .filter(|key| Self::matches(pattern, key))
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_set_get_round_trip() {
        let store = InMemoryStore::new();
        store
            .set_with_ttl("search:abc", "payload", Duration::from_secs(60))
            .unwrap();
        assert_eq!(
            store.get("search:abc").unwrap(),
            Some("payload".to_string())
        );
        assert_eq!(store.get("search:other").unwrap(), None);
    }

    #[test]
    fn test_entries_expire() {
        let store = InMemoryStore::new();
        store
            .set_with_ttl("search:abc", "payload", Duration::from_millis(20))
            .unwrap();
        thread::sleep(Duration::from_millis(40));
        assert_eq!(store.get("search:abc").unwrap(), None);
        assert_eq!(store.key_count("*").unwrap(), 0);
    }

    #[test]
    fn test_delete_by_pattern() {
        let store = InMemoryStore::new();
        let ttl = Duration::from_secs(60);
        store.set_with_ttl("search:a", "1", ttl).unwrap();
        store.set_with_ttl("search:b", "2", ttl).unwrap();
        store.set_with_ttl("intent:a", "3", ttl).unwrap();

        assert_eq!(store.delete_by_pattern("search:*").unwrap(), 2);
        assert_eq!(store.key_count("*").unwrap(), 1);
        assert_eq!(store.get("intent:a").unwrap(), Some("3".to_string()));
    }

    #[test]
    fn test_exact_pattern_without_star() {
        let store = InMemoryStore::new();
        let ttl = Duration::from_secs(60);
        store.set_with_ttl("agent:x", "1", ttl).unwrap();
        store.set_with_ttl("agent:xy", "2", ttl).unwrap();

        assert_eq!(store.delete_by_pattern("agent:x").unwrap(), 1);
        assert_eq!(store.get("agent:xy").unwrap(), Some("2".to_string()));
    }
}
