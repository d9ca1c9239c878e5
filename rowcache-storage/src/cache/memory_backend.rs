//! In-process cache backend.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use rowcache_core::{CacheError, RowcacheResult};

use super::traits::{Expiration, KvCache};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Thread-safe in-memory [`KvCache`] with per-entry expiry.
///
/// Expired entries read as misses until [`InMemoryKvCache::purge_expired`]
/// drops them.
#[derive(Debug, Default)]
pub struct InMemoryKvCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryKvCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.read()
            .map(|entries| entries.values().filter(|e| e.is_live(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        matches!(self.get(key), Ok(Some(_)))
    }

    /// Remove expired entries, returning how many were dropped.
    pub fn purge_expired(&self) -> RowcacheResult<usize> {
        let now = Instant::now();
        let mut entries = self.write()?;
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        Ok(before - entries.len())
    }

    fn read(&self) -> RowcacheResult<RwLockReadGuard<'_, HashMap<String, Entry>>> {
        self.entries.read().map_err(|_| poisoned())
    }

    fn write(&self) -> RowcacheResult<RwLockWriteGuard<'_, HashMap<String, Entry>>> {
        self.entries.write().map_err(|_| poisoned())
    }
}

fn poisoned() -> rowcache_core::RowcacheError {
    CacheError::Backend {
        reason: "in-memory cache lock poisoned".to_string(),
    }
    .into()
}

fn entry(value: &str, expiration: Expiration) -> Entry {
    Entry {
        value: value.to_string(),
        expires_at: match expiration {
            Expiration::Never => None,
            Expiration::After(ttl) => Some(Instant::now() + ttl),
        },
    }
}

impl KvCache for InMemoryKvCache {
    fn get(&self, key: &str) -> RowcacheResult<Option<String>> {
        let now = Instant::now();
        let entries = self.read()?;
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    fn get_multi(&self, keys: &[String]) -> RowcacheResult<HashMap<String, String>> {
        let now = Instant::now();
        let entries = self.read()?;
        Ok(keys
            .iter()
            .filter_map(|key| {
                entries
                    .get(key)
                    .filter(|e| e.is_live(now))
                    .map(|e| (key.clone(), e.value.clone()))
            })
            .collect())
    }

    fn set(&self, key: &str, value: &str, expiration: Expiration) -> RowcacheResult<bool> {
        let mut entries = self.write()?;
        entries.insert(key.to_string(), entry(value, expiration));
        Ok(true)
    }

    fn set_multi(
        &self,
        items: &[(String, String)],
        expiration: Expiration,
    ) -> RowcacheResult<bool> {
        let mut entries = self.write()?;
        for (key, value) in items {
            entries.insert(key.clone(), entry(value, expiration));
        }
        Ok(true)
    }

    fn delete(&self, key: &str) -> RowcacheResult<bool> {
        self.write()?.remove(key);
        Ok(true)
    }

    fn delete_multi(&self, keys: &[String]) -> RowcacheResult<bool> {
        let mut entries = self.write()?;
        for key in keys {
            entries.remove(key);
        }
        Ok(true)
    }

    fn flush(&self) -> RowcacheResult<bool> {
        self.write()?.clear();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_set_get_delete() {
        let cache = InMemoryKvCache::new();
        assert_eq!(cache.get("a").unwrap(), None);
        cache.set("a", "1", Expiration::Never).unwrap();
        assert_eq!(cache.get("a").unwrap().as_deref(), Some("1"));
        cache.delete("a").unwrap();
        assert!(!cache.contains("a"));
    }

    #[test]
    fn test_get_multi_returns_partial_mapping() {
        let cache = InMemoryKvCache::new();
        cache
            .set_multi(
                &[("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())],
                Expiration::Never,
            )
            .unwrap();
        let found = cache
            .get_multi(&["a".to_string(), "missing".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found.get("b").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_expired_entries_read_as_misses() {
        let cache = InMemoryKvCache::new();
        cache
            .set("short", "x", Expiration::After(Duration::from_millis(1)))
            .unwrap();
        cache.set("forever", "y", Expiration::Never).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("short").unwrap(), None);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.purge_expired().unwrap(), 1);
    }

    #[test]
    fn test_delete_multi_and_flush() {
        let cache = InMemoryKvCache::new();
        for key in ["a", "b", "c"] {
            cache.set(key, key, Expiration::Never).unwrap();
        }
        cache
            .delete_multi(&["a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(cache.len(), 1);
        cache.flush().unwrap();
        assert!(cache.is_empty());
    }
}
