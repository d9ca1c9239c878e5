//! Key-value cache capability and backends.
//!
//! The cache layer only ever talks to a [`KvCache`]. Two backends ship here:
//! [`InMemoryKvCache`] for tests and single-process use, and (with the
//! `redis` feature) [`RedisKvCache`], which shards keys over the configured
//! endpoints.

pub mod memory_backend;
#[cfg(feature = "redis")]
pub mod redis_backend;
pub mod traits;

pub use memory_backend::InMemoryKvCache;
#[cfg(feature = "redis")]
pub use redis_backend::RedisKvCache;
pub use traits::{CacheStats, Expiration, KvCache};

use rowcache_core::{CacheEndpoint, CacheError, RowcacheResult};
use std::sync::Arc;

/// Materialize a cache client from an endpoint list.
///
/// Fails with [`CacheError::Unavailable`] when the list is empty or the
/// client cannot be constructed.
pub fn connect(endpoints: &[CacheEndpoint]) -> RowcacheResult<Arc<dyn KvCache>> {
    if endpoints.is_empty() {
        return Err(CacheError::Unavailable {
            reason: "no cache instance or cache endpoints configured".to_string(),
        }
        .into());
    }

    #[cfg(feature = "redis")]
    {
        let cache = RedisKvCache::connect(endpoints)?;
        Ok(Arc::new(cache))
    }

    #[cfg(not(feature = "redis"))]
    {
        Err(CacheError::Unavailable {
            reason: "built without a cache transport; inject a KvCache instead".to_string(),
        }
        .into())
    }
}
