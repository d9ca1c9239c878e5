//! Redis-backed cache with client-side key sharding.
//!
//! Each configured endpoint gets its own `redis::Client`. Keys are assigned
//! to an endpoint by a stable SHA-256 hash, so every process that shares the
//! endpoint list agrees on where a key lives. Connections are opened lazily
//! on first use and dropped after a failed command; the next call reconnects.
//! There is no retry within a call.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use redis::{Client, Connection, RedisError, RedisResult};
use rowcache_core::{CacheEndpoint, CacheError, RowcacheError, RowcacheResult};
use sha2::{Digest, Sha256};

use super::traits::{Expiration, KvCache};

fn backend_error(e: RedisError) -> RowcacheError {
    CacheError::Backend {
        reason: e.to_string(),
    }
    .into()
}

struct Shard {
    endpoint: CacheEndpoint,
    client: Client,
    connection: Mutex<Option<Connection>>,
}

/// Redis [`KvCache`] over one or more endpoints.
pub struct RedisKvCache {
    shards: Vec<Shard>,
}

impl std::fmt::Debug for RedisKvCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisKvCache")
            .field(
                "endpoints",
                &self.shards.iter().map(|s| s.endpoint.to_string()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl RedisKvCache {
    /// Build clients for every endpoint. No connection is opened yet.
    pub fn connect(endpoints: &[CacheEndpoint]) -> RowcacheResult<Self> {
        if endpoints.is_empty() {
            return Err(CacheError::Unavailable {
                reason: "no redis endpoints configured".to_string(),
            }
            .into());
        }
        let shards = endpoints
            .iter()
            .map(|endpoint| {
                let url = format!("redis://{}:{}/", endpoint.host, endpoint.port);
                let client = Client::open(url.as_str()).map_err(|e| CacheError::Unavailable {
                    reason: format!("invalid redis endpoint {}: {}", endpoint, e),
                })?;
                Ok(Shard {
                    endpoint: endpoint.clone(),
                    client,
                    connection: Mutex::new(None),
                })
            })
            .collect::<Result<Vec<_>, CacheError>>()?;
        tracing::debug!(shards = shards.len(), "redis cache client configured");
        Ok(Self { shards })
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &CacheEndpoint> {
        self.shards.iter().map(|s| &s.endpoint)
    }

    fn shard_index(&self, key: &str) -> usize {
        if self.shards.len() == 1 {
            return 0;
        }
        let digest = Sha256::digest(key.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        (u64::from_be_bytes(prefix) % self.shards.len() as u64) as usize
    }

    /// Group keys by shard, keeping each shard's keys in input order.
    fn group<'k, T>(&self, items: &'k [T], key_of: impl Fn(&T) -> &str) -> BTreeMap<usize, Vec<&'k T>> {
        let mut groups: BTreeMap<usize, Vec<&T>> = BTreeMap::new();
        for item in items {
            groups
                .entry(self.shard_index(key_of(item)))
                .or_default()
                .push(item);
        }
        groups
    }

    fn with_connection<T>(
        &self,
        index: usize,
        op: impl FnOnce(&mut Connection) -> RedisResult<T>,
    ) -> RowcacheResult<T> {
        let shard = &self.shards[index];
        let mut slot = shard.connection.lock().map_err(|_| CacheError::Backend {
            reason: format!("connection lock poisoned for {}", shard.endpoint),
        })?;
        if slot.is_none() {
            let connection = shard.client.get_connection().map_err(|e| CacheError::Unavailable {
                reason: format!("cannot connect to {}: {}", shard.endpoint, e),
            })?;
            *slot = Some(connection);
        }
        let Some(connection) = slot.as_mut() else {
            return Err(CacheError::Unavailable {
                reason: format!("no connection to {}", shard.endpoint),
            }
            .into());
        };
        match op(connection) {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::warn!(endpoint = %shard.endpoint, error = %e, "redis command failed");
                *slot = None;
                Err(backend_error(e))
            }
        }
    }
}

fn set_command(key: &str, value: &str, expiration: Expiration) -> redis::Cmd {
    let mut cmd = redis::cmd("SET");
    cmd.arg(key).arg(value);
    if let Expiration::After(_) = expiration {
        cmd.arg("EX").arg(expiration.as_secs());
    }
    cmd
}

impl KvCache for RedisKvCache {
    fn get(&self, key: &str) -> RowcacheResult<Option<String>> {
        self.with_connection(self.shard_index(key), |con| {
            redis::cmd("GET").arg(key).query::<Option<String>>(con)
        })
    }

    fn get_multi(&self, keys: &[String]) -> RowcacheResult<HashMap<String, String>> {
        let mut found = HashMap::with_capacity(keys.len());
        for (index, group) in self.group(keys, |k| k.as_str()) {
            let values = self.with_connection(index, |con| {
                redis::cmd("MGET").arg(&group).query::<Vec<Option<String>>>(con)
            })?;
            for (key, value) in group.into_iter().zip(values) {
                if let Some(value) = value {
                    found.insert(key.clone(), value);
                }
            }
        }
        Ok(found)
    }

    fn set(&self, key: &str, value: &str, expiration: Expiration) -> RowcacheResult<bool> {
        self.with_connection(self.shard_index(key), |con| {
            set_command(key, value, expiration).query::<()>(con)
        })?;
        Ok(true)
    }

    fn set_multi(
        &self,
        items: &[(String, String)],
        expiration: Expiration,
    ) -> RowcacheResult<bool> {
        for (index, group) in self.group(items, |(k, _)| k.as_str()) {
            let mut pipe = redis::pipe();
            for (key, value) in group {
                pipe.add_command(set_command(key, value, expiration)).ignore();
            }
            self.with_connection(index, |con| pipe.query::<()>(con))?;
        }
        Ok(true)
    }

    fn delete(&self, key: &str) -> RowcacheResult<bool> {
        self.with_connection(self.shard_index(key), |con| {
            redis::cmd("DEL").arg(key).query::<i64>(con)
        })?;
        Ok(true)
    }

    fn delete_multi(&self, keys: &[String]) -> RowcacheResult<bool> {
        for (index, group) in self.group(keys, |k| k.as_str()) {
            self.with_connection(index, |con| redis::cmd("DEL").arg(&group).query::<i64>(con))?;
        }
        Ok(true)
    }

    fn flush(&self) -> RowcacheResult<bool> {
        for index in 0..self.shards.len() {
            self.with_connection(index, |con| redis::cmd("FLUSHDB").query::<()>(con))?;
        }
        Ok(true)
    }
}
