//! Cache backend trait and usage statistics.

use rowcache_core::RowcacheResult;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Lifetime of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiration {
    /// Keep until deleted or evicted.
    #[default]
    Never,
    /// Expire after the given duration.
    After(Duration),
}

impl Expiration {
    /// Seconds-based constructor where 0 means [`Expiration::Never`].
    pub fn from_secs(secs: u64) -> Self {
        if secs == 0 {
            Self::Never
        } else {
            Self::After(Duration::from_secs(secs))
        }
    }

    /// Whole seconds, rounding sub-second lifetimes up to one. 0 for `Never`.
    pub fn as_secs(&self) -> u64 {
        match self {
            Self::Never => 0,
            Self::After(d) if d.subsec_nanos() > 0 => d.as_secs() + 1,
            Self::After(d) => d.as_secs().max(1),
        }
    }
}

/// Key-value cache client.
///
/// Values are opaque strings. Implementations must be thread-safe; each
/// method is a blocking call. The boolean results report whether the backend
/// accepted the operation, not whether a key existed.
pub trait KvCache: Send + Sync {
    fn get(&self, key: &str) -> RowcacheResult<Option<String>>;

    /// Values for the keys that were found. Missing keys are absent from the map.
    fn get_multi(&self, keys: &[String]) -> RowcacheResult<HashMap<String, String>>;

    fn set(&self, key: &str, value: &str, expiration: Expiration) -> RowcacheResult<bool>;

    fn set_multi(&self, items: &[(String, String)], expiration: Expiration)
        -> RowcacheResult<bool>;

    fn delete(&self, key: &str) -> RowcacheResult<bool>;

    fn delete_multi(&self, keys: &[String]) -> RowcacheResult<bool>;

    /// Drop every entry.
    fn flush(&self) -> RowcacheResult<bool>;
}

impl<T: KvCache + ?Sized> KvCache for Arc<T> {
    fn get(&self, key: &str) -> RowcacheResult<Option<String>> {
        (**self).get(key)
    }

    fn get_multi(&self, keys: &[String]) -> RowcacheResult<HashMap<String, String>> {
        (**self).get_multi(keys)
    }

    fn set(&self, key: &str, value: &str, expiration: Expiration) -> RowcacheResult<bool> {
        (**self).set(key, value, expiration)
    }

    fn set_multi(
        &self,
        items: &[(String, String)],
        expiration: Expiration,
    ) -> RowcacheResult<bool> {
        (**self).set_multi(items, expiration)
    }

    fn delete(&self, key: &str) -> RowcacheResult<bool> {
        (**self).delete(key)
    }

    fn delete_multi(&self, keys: &[String]) -> RowcacheResult<bool> {
        (**self).delete_multi(keys)
    }

    fn flush(&self) -> RowcacheResult<bool> {
        (**self).flush()
    }
}

/// Statistics about cache usage for one cache-db instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads answered from the cache.
    pub hits: u64,
    /// Reads that fell through to the relational source.
    pub misses: u64,
    /// Rows written into the cache after a miss.
    pub stores: u64,
    /// Entry keys deleted because of writes.
    pub invalidations: u64,
    /// Primary keys buffered while a transaction was open.
    pub deferred: u64,
    /// Whole-table generation rotations.
    pub generations_rotated: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
