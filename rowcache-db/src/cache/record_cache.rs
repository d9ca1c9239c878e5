//! Read-through row cache keyed by primary key.
//!
//! Rows are stored as JSON text under keys derived from the table's current
//! generation. A row is only written to the cache right after the relational
//! source returned it, never from a write payload.

use std::collections::{HashMap, HashSet};

use rowcache_core::{CacheError, PrimaryKey, Row, RowcacheResult};
use rowcache_storage::{CacheStats, Expiration, KvCache};

use super::keyspace::{Generation, Keyspace};

/// Loads one row from the relational source on a cache miss.
pub trait RowFetcher {
    fn fetch(&self, pk: &PrimaryKey) -> RowcacheResult<Option<Row>>;
}

impl<F> RowFetcher for F
where
    F: Fn(&PrimaryKey) -> RowcacheResult<Option<Row>>,
{
    fn fetch(&self, pk: &PrimaryKey) -> RowcacheResult<Option<Row>> {
        self(pk)
    }
}

fn encode(row: &Row) -> RowcacheResult<String> {
    serde_json::to_string(row).map_err(|e| {
        CacheError::Serialization {
            reason: e.to_string(),
        }
        .into()
    })
}

/// Undecodable or empty entries read as misses and get overwritten.
fn decode(raw: &str) -> Option<Row> {
    match serde_json::from_str::<Row>(raw) {
        Ok(row) if !row.is_empty() => Some(row),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(error = %e, "discarding undecodable cache entry");
            None
        }
    }
}

/// Cache view for one terminal call.
///
/// Opening it resolves the table generation once; every key derived through
/// this view uses that generation.
pub struct RecordCache<'a> {
    cache: &'a dyn KvCache,
    generation: Generation,
    expiration: Expiration,
    store_misses: bool,
    stats: &'a mut CacheStats,
}

impl<'a> RecordCache<'a> {
    pub fn open(
        cache: &'a dyn KvCache,
        keyspace: &Keyspace,
        expiration: Expiration,
        stats: &'a mut CacheStats,
    ) -> RowcacheResult<Self> {
        Ok(Self {
            cache,
            generation: keyspace.generation(cache)?,
            expiration,
            store_misses: true,
            stats,
        })
    }

    /// Whether rows loaded on a miss are written back. Turned off inside an
    /// open transaction, where the source may return uncommitted rows.
    pub fn store_misses(mut self, store: bool) -> Self {
        self.store_misses = store;
        self
    }

    pub fn generation(&self) -> &Generation {
        &self.generation
    }

    /// Cached row for `pk`, loading and storing it on a miss.
    ///
    /// Returns `None` when the source has no such row; nothing is cached then.
    pub fn get<F>(&mut self, pk: &PrimaryKey, fetcher: &F) -> RowcacheResult<Option<Row>>
    where
        F: RowFetcher + ?Sized,
    {
        let key = self.generation.entry_key(pk);
        if let Some(row) = self.cache.get(&key)?.as_deref().and_then(decode) {
            self.stats.hits += 1;
            tracing::debug!(%pk, "row cache hit");
            return Ok(Some(row));
        }

        self.stats.misses += 1;
        tracing::debug!(%pk, "row cache miss");
        let Some(row) = fetcher.fetch(pk)?.filter(|row| !row.is_empty()) else {
            return Ok(None);
        };
        if self.store_misses {
            self.cache.set(&key, &encode(&row)?, self.expiration)?;
            self.stats.stores += 1;
        }
        Ok(Some(row))
    }

    /// Rows for `pks` paired with their keys, in input order.
    ///
    /// Hits come from one multi-get. Each distinct missing key costs one
    /// source lookup; rows found that way are stored with one multi-set.
    /// Keys without a row are omitted.
    pub fn get_batch_keyed<F>(
        &mut self,
        pks: &[PrimaryKey],
        fetcher: &F,
    ) -> RowcacheResult<Vec<(PrimaryKey, Row)>>
    where
        F: RowFetcher + ?Sized,
    {
        if pks.is_empty() {
            return Ok(Vec::new());
        }

        let keys = self.generation.entry_keys(pks);
        let cached = self.cache.get_multi(&keys)?;
        let mut loaded: HashMap<&PrimaryKey, Option<Row>> = HashMap::new();
        let mut to_store = Vec::new();
        let mut rows = Vec::with_capacity(pks.len());

        for (pk, key) in pks.iter().zip(&keys) {
            let row = match cached.get(key).and_then(|raw| decode(raw)) {
                Some(row) => {
                    self.stats.hits += 1;
                    Some(row)
                }
                None => match loaded.get(pk) {
                    Some(row) => row.clone(),
                    None => {
                        self.stats.misses += 1;
                        let row = fetcher.fetch(pk)?.filter(|row| !row.is_empty());
                        if let Some(row) = row.as_ref().filter(|_| self.store_misses) {
                            to_store.push((key.clone(), encode(row)?));
                        }
                        loaded.insert(pk, row.clone());
                        row
                    }
                },
            };
            if let Some(row) = row {
                rows.push((pk.clone(), row));
            }
        }

        tracing::debug!(
            requested = pks.len(),
            found = rows.len(),
            loaded = loaded.len(),
            "row cache batch lookup"
        );
        if !to_store.is_empty() {
            self.cache.set_multi(&to_store, self.expiration)?;
            self.stats.stores += to_store.len() as u64;
        }
        Ok(rows)
    }

    /// Rows for `pks` in input order, missing keys omitted.
    pub fn get_batch_ordered<F>(
        &mut self,
        pks: &[PrimaryKey],
        fetcher: &F,
    ) -> RowcacheResult<Vec<Row>>
    where
        F: RowFetcher + ?Sized,
    {
        Ok(self
            .get_batch_keyed(pks, fetcher)?
            .into_iter()
            .map(|(_, row)| row)
            .collect())
    }

    /// Delete the entries for `pks` with one batch delete.
    pub fn purge(&mut self, pks: &[PrimaryKey]) -> RowcacheResult<bool> {
        let mut seen = HashSet::new();
        let keys: Vec<String> = pks
            .iter()
            .filter(|pk| seen.insert(*pk))
            .map(|pk| self.generation.entry_key(pk))
            .collect();
        if keys.is_empty() {
            return Ok(true);
        }
        let deleted = self.cache.delete_multi(&keys)?;
        if !deleted {
            tracing::warn!(keys = keys.len(), "cache batch delete reported failure");
        }
        self.stats.invalidations += keys.len() as u64;
        Ok(deleted)
    }
}
