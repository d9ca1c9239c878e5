//! Generation-versioned cache keyspace for one table.
//!
//! Every cached row key mixes in a generation token. The token lives in the
//! cache itself under a deterministic prefix key, so deleting that single
//! entry orphans every row cached under the old generation. The next lookup
//! mints a new token and all derived keys change with it.

use chrono::Utc;
use rowcache_core::{ConnectionIdentity, PrimaryKey, RowcacheResult};
use rowcache_storage::{Expiration, KvCache};
use sha2::{Digest, Sha256};
use uuid::Uuid;

fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Cache namespace of one table on one relational connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyspace {
    table: String,
    prefix_key: String,
}

impl Keyspace {
    pub fn new(identity: &ConnectionIdentity, table: &str) -> Self {
        let prefix_key = sha256_hex(&format!(
            "{}{}{}{}",
            identity.host, identity.port, identity.schema, table
        ));
        Self {
            table: table.to_string(),
            prefix_key,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Cache key holding the generation token. Stable across restarts.
    pub fn prefix_key(&self) -> &str {
        &self.prefix_key
    }

    /// Current generation token, minting and storing a new one when absent.
    pub fn current_prefix(&self, cache: &dyn KvCache) -> RowcacheResult<String> {
        if let Some(token) = cache.get(&self.prefix_key)? {
            if !token.is_empty() {
                return Ok(token);
            }
        }
        let token = self.mint_token();
        cache.set(&self.prefix_key, &token, Expiration::Never)?;
        tracing::info!(table = %self.table, "minted cache generation");
        Ok(token)
    }

    /// Resolve the generation once for a batch of key derivations.
    pub fn generation(&self, cache: &dyn KvCache) -> RowcacheResult<Generation> {
        Ok(Generation {
            token: self.current_prefix(cache)?,
        })
    }

    /// Drop the generation token. Cost does not depend on how many rows are
    /// cached.
    pub fn invalidate_all(&self, cache: &dyn KvCache) -> RowcacheResult<bool> {
        let deleted = cache.delete(&self.prefix_key)?;
        tracing::info!(table = %self.table, "cache generation invalidated");
        Ok(deleted)
    }

    fn mint_token(&self) -> String {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        sha256_hex(&format!("{}{}{}", nanos, Uuid::now_v7(), self.prefix_key))
    }
}

/// A resolved generation token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    token: String,
}

impl Generation {
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Cache key of the row with primary key `pk` under this generation.
    pub fn entry_key(&self, pk: &PrimaryKey) -> String {
        sha256_hex(&format!("{}_{}", self.token, pk))
    }

    pub fn entry_keys(&self, pks: &[PrimaryKey]) -> Vec<String> {
        pks.iter().map(|pk| self.entry_key(pk)).collect()
    }
}
