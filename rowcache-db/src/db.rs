//! The cache-db facade.
//!
//! A [`CacheDb`] binds one table on one routed relational source to a
//! key-value cache. It is a single-threaded unit of work: shaping state,
//! the transaction buffer and the cache toggle are instance state behind
//! `&mut self`. Use one instance per caller.

use std::fmt;
use std::sync::Arc;

use rowcache_core::{
    Aggregate, CacheEndpoint, CacheError, Changes, Predicate, PrimaryKey, Projection, Row,
    RowcacheConfig, RowcacheResult, SelectQuery, SourceError, TableBinding, Window,
};
use rowcache_storage::{CacheStats, Expiration, KvCache, RelationalSource};

use crate::cache::{Invalidation, InvalidationCoordinator, Keyspace, RecordCache, RowFetcher};
use crate::pipeline::{FilterHooks, RowFilter};
use crate::query::{Query, QueryShape};
use crate::router::{Access, Replicated, Single, SourceRouter};

/// Where the cache client comes from.
enum CacheHandle {
    Unconfigured,
    /// Built from endpoints on first cache-backed use.
    Endpoints {
        endpoints: Vec<CacheEndpoint>,
        client: Option<Arc<dyn KvCache>>,
    },
    /// Supplied by the caller. Wins over endpoints.
    Injected(Arc<dyn KvCache>),
}

impl fmt::Debug for CacheHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unconfigured => f.write_str("Unconfigured"),
            Self::Endpoints { endpoints, client } => f
                .debug_struct("Endpoints")
                .field("endpoints", endpoints)
                .field("connected", &client.is_some())
                .finish(),
            Self::Injected(_) => f.write_str("Injected"),
        }
    }
}

/// Point lookup by primary key against one source.
struct SourceFetcher<'s, S> {
    source: &'s S,
    binding: &'s TableBinding,
}

impl<S: RelationalSource> RowFetcher for SourceFetcher<'_, S> {
    fn fetch(&self, pk: &PrimaryKey) -> RowcacheResult<Option<Row>> {
        let query =
            SelectQuery::new().filter(Predicate::eq(&self.binding.primary_key, pk.to_value()));
        self.source.select_one(&self.binding.name, &query)
    }
}

/// Cache-aside access to a single table.
#[derive(Debug)]
pub struct CacheDb<R: SourceRouter> {
    router: R,
    table: TableBinding,
    cache: CacheHandle,
    enabled: bool,
    expiration: Expiration,
    hooks: FilterHooks,
    invalidation: InvalidationCoordinator,
    stats: CacheStats,
}

impl<S: RelationalSource> CacheDb<Single<S>> {
    /// One connection for reads and writes.
    pub fn single(source: S) -> Self {
        Self::new(Single::new(source))
    }
}

impl<S: RelationalSource> CacheDb<Replicated<S>> {
    /// Writes to `primary`, reads from a random replica.
    pub fn replicated(primary: S, replicas: Vec<S>) -> Self {
        Self::new(Replicated::new(primary, replicas))
    }
}

impl<R: SourceRouter> CacheDb<R> {
    pub fn new(router: R) -> Self {
        Self {
            router,
            table: TableBinding::new("", ""),
            cache: CacheHandle::Unconfigured,
            enabled: true,
            expiration: Expiration::from_secs(rowcache_core::config::DEFAULT_TTL_SECS),
            hooks: FilterHooks::new(),
            invalidation: InvalidationCoordinator::new(),
            stats: CacheStats::default(),
        }
    }

    /// Build an instance from validated configuration.
    pub fn from_config(router: R, config: &RowcacheConfig) -> RowcacheResult<Self> {
        config.validate()?;
        let mut db = Self::new(router);
        db.config_table(&config.table.name, &config.table.primary_key)
            .set_expired_time(config.cache.ttl_secs);
        if !config.cache.endpoints.is_empty() {
            db.config_cache(config.cache.endpoints.clone());
        }
        db.enabled = config.cache.enabled;
        Ok(db)
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    pub fn config_table(&mut self, name: &str, primary_key: &str) -> &mut Self {
        self.table = TableBinding::new(name, primary_key);
        self
    }

    /// Entry lifetime in seconds; 0 never expires.
    pub fn set_expired_time(&mut self, secs: u64) -> &mut Self {
        self.expiration = Expiration::from_secs(secs);
        self
    }

    /// Cache endpoints, connected lazily. Ignored while an injected cache is
    /// set.
    pub fn config_cache(&mut self, endpoints: Vec<CacheEndpoint>) -> &mut Self {
        match self.cache {
            CacheHandle::Injected(_) => {
                tracing::debug!("cache endpoints ignored, an injected cache is set");
            }
            _ => {
                self.cache = CacheHandle::Endpoints {
                    endpoints,
                    client: None,
                };
            }
        }
        self
    }

    pub fn set_cache(&mut self, cache: Arc<dyn KvCache>) -> &mut Self {
        self.cache = CacheHandle::Injected(cache);
        self
    }

    pub fn register_filter_insert(&mut self, hook: impl RowFilter + 'static) -> &mut Self {
        self.hooks.set_insert(Arc::new(hook));
        self
    }

    pub fn register_filter_update(&mut self, hook: impl RowFilter + 'static) -> &mut Self {
        self.hooks.set_update(Arc::new(hook));
        self
    }

    pub fn register_filter_show(&mut self, hook: impl RowFilter + 'static) -> &mut Self {
        self.hooks.set_show(Arc::new(hook));
        self
    }

    pub fn enable_cache(&mut self) -> &mut Self {
        if !self.enabled {
            tracing::info!(table = %self.table.name, "cache enabled");
        }
        self.enabled = true;
        self
    }

    /// Stop using the cache and rotate the table generation, so entries
    /// cached before this point are never read again.
    ///
    /// With no cache configured there is nothing to rotate.
    pub fn disable_cache(&mut self) -> RowcacheResult<()> {
        self.enabled = false;
        tracing::info!(table = %self.table.name, "cache disabled");
        if matches!(self.cache, CacheHandle::Unconfigured) {
            return Ok(());
        }
        self.invalidate_all().map(|_| ())
    }

    pub fn is_cache_enabled(&self) -> bool {
        self.enabled
    }

    /// Orphan every cached row of the table in one cache operation.
    pub fn invalidate_all(&mut self) -> RowcacheResult<bool> {
        let keyspace = self.keyspace()?;
        let cache = self.cache_client()?;
        let rotated = keyspace.invalidate_all(cache.as_ref())?;
        self.stats.generations_rotated += 1;
        Ok(rotated)
    }

    pub fn table_name(&self) -> RowcacheResult<&str> {
        self.table.validate()?;
        Ok(&self.table.name)
    }

    pub fn primary_key(&self) -> RowcacheResult<&str> {
        self.table.validate()?;
        Ok(&self.table.primary_key)
    }

    /// Primary key column without validation; terminal calls validate.
    pub(crate) fn primary_key_or_blank(&self) -> &str {
        &self.table.primary_key
    }

    pub fn router(&self) -> &R {
        &self.router
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn in_transaction(&self) -> bool {
        self.invalidation.in_transaction()
    }

    /// Start shaping a query.
    pub fn query(&mut self) -> Query<'_, R> {
        Query::new(self)
    }

    // ------------------------------------------------------------------
    // Unshaped shortcuts
    // ------------------------------------------------------------------

    pub fn fetch_by_primary(&mut self, pk: impl Into<PrimaryKey>) -> RowcacheResult<Option<Row>> {
        self.query().fetch_by_primary(pk)
    }

    pub fn fetch_by_primary_cache(
        &mut self,
        pk: impl Into<PrimaryKey>,
    ) -> RowcacheResult<Option<Row>> {
        self.query().fetch_by_primary_cache(pk)
    }

    pub fn fetch_by_primary_arr_cache(&mut self, pks: &[PrimaryKey]) -> RowcacheResult<Vec<Row>> {
        self.query().fetch_by_primary_arr_cache(pks)
    }

    pub fn update_by_primary_cache(
        &mut self,
        pk: impl Into<PrimaryKey>,
        changes: Row,
    ) -> RowcacheResult<u64> {
        self.query().update_by_primary_cache(pk, changes)
    }

    pub fn delete_by_primary_cache(&mut self, pk: impl Into<PrimaryKey>) -> RowcacheResult<u64> {
        self.query().delete_by_primary_cache(pk)
    }

    // ------------------------------------------------------------------
    // Inserts and deltas
    // ------------------------------------------------------------------

    /// Insert one row through the insert hook, returning its key.
    pub fn insert_data(&mut self, row: Row) -> RowcacheResult<PrimaryKey> {
        let binding = self.binding()?;
        let payload = self.hooks.on_insert(row);
        self.writer().insert(&binding.name, &payload)
    }

    /// Insert one row and return the stored payload with its key set.
    pub fn insert_data_returning(&mut self, row: Row) -> RowcacheResult<Row> {
        let binding = self.binding()?;
        let mut payload = self.hooks.on_insert(row);
        let pk = self.writer().insert(&binding.name, &payload)?;
        payload.insert(binding.primary_key, pk.to_value());
        Ok(payload)
    }

    pub fn insert_multi_data(&mut self, rows: Vec<Row>) -> RowcacheResult<Vec<PrimaryKey>> {
        let binding = self.binding()?;
        let payload = self.hooks.on_insert_all(rows);
        self.writer().insert_multi(&binding.name, &payload)
    }

    /// Insert or overwrite by key. An overwritten row may be cached, so the
    /// key is invalidated.
    pub fn replace_data(&mut self, row: Row) -> RowcacheResult<PrimaryKey> {
        let binding = self.binding()?;
        let payload = self.hooks.on_insert(row);
        let pk = self.writer().replace(&binding.name, &payload)?;
        self.after_write(vec![pk.clone()])?;
        Ok(pk)
    }

    /// Add `by` to an integer column. Write hooks are not applied.
    pub fn increase(
        &mut self,
        pk: impl Into<PrimaryKey>,
        column: &str,
        by: i64,
    ) -> RowcacheResult<u64> {
        let pk = pk.into();
        let binding = self.binding()?;
        let scope = point_scope(SelectQuery::new(), &binding, &pk);
        let affected =
            self.writer()
                .update(&binding.name, &scope, &Changes::increment(column, by))?;
        self.after_write(vec![pk])?;
        Ok(affected)
    }

    pub fn decrease(
        &mut self,
        pk: impl Into<PrimaryKey>,
        column: &str,
        by: i64,
    ) -> RowcacheResult<u64> {
        let binding = self.binding()?;
        let by = by.checked_neg().ok_or_else(|| SourceError::UpdateFailed {
            table: binding.name,
            reason: format!("column {} overflows", column),
        })?;
        self.increase(pk, column, by)
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Begin a transaction on the primary. Until it resolves, every statement
    /// runs on the primary and invalidations are buffered.
    pub fn start_transaction(&mut self) -> RowcacheResult<()> {
        self.router.primary().begin()?;
        self.invalidation.begin();
        Ok(())
    }

    /// Commit, then invalidate every key written inside the transaction.
    ///
    /// Buffered keys are invalidated even when the commit reports failure;
    /// the commit error is returned first.
    pub fn commit(&mut self) -> RowcacheResult<()> {
        let committed = self.router.primary().commit();
        let pks = self.invalidation.on_commit();
        let purged = if self.enabled && !pks.is_empty() {
            self.purge(&pks).map(|_| ())
        } else {
            Ok(())
        };
        committed?;
        purged
    }

    /// Roll back and drop the buffered invalidations.
    pub fn rollback(&mut self) -> RowcacheResult<()> {
        let rolled_back = self.router.primary().rollback();
        self.invalidation.on_rollback();
        rolled_back
    }

    // ------------------------------------------------------------------
    // Shaped terminals (driven by `Query`)
    // ------------------------------------------------------------------

    pub(crate) fn fetch_one_shaped(&mut self, shape: QueryShape) -> RowcacheResult<Option<Row>> {
        let binding = self.binding()?;
        let row = self
            .reader()
            .select_one(&binding.name, &shape.select(&binding.primary_key))?;
        Ok(row
            .filter(|row| !row.is_empty())
            .map(|row| self.hooks.show_one(row, &shape.projection)))
    }

    pub(crate) fn fetch_one_by_cache_shaped(
        &mut self,
        shape: QueryShape,
    ) -> RowcacheResult<Option<Row>> {
        if !self.enabled {
            return self.fetch_one_shaped(shape);
        }
        let binding = self.binding()?;
        let mut scan = shape.key_scan(&binding.primary_key);
        if scan.window == Window::All {
            scan.window = Window::Limit(1);
        }
        let pk = self
            .reader()
            .select_one(&binding.name, &scan)?
            .and_then(|row| row.primary_key(&binding.primary_key));
        match pk {
            Some(pk) => self.fetch_by_primary_cache_shaped(shape, &pk),
            None => Ok(None),
        }
    }

    pub(crate) fn fetch_all_shaped(&mut self, shape: QueryShape) -> RowcacheResult<Vec<Row>> {
        let binding = self.binding()?;
        let rows = self
            .reader()
            .select(&binding.name, &shape.select(&binding.primary_key))?;
        Ok(self.hooks.show_all(rows, &shape.projection))
    }

    pub(crate) fn fetch_all_by_cache_shaped(&mut self, shape: QueryShape) -> RowcacheResult<Vec<Row>> {
        if !self.enabled {
            return self.fetch_all_shaped(shape);
        }
        let pks = self.scan_keys(&shape, Access::Read)?;
        let rows = self.cached_rows(&pks)?.into_iter().map(|(_, row)| row).collect();
        Ok(self.hooks.show_all(rows, &shape.projection))
    }

    pub(crate) fn fetch_keyed_by_cache_shaped(
        &mut self,
        shape: QueryShape,
    ) -> RowcacheResult<Vec<(PrimaryKey, Row)>> {
        let binding = self.binding()?;
        let keyed = if self.enabled {
            let pks = self.scan_keys(&shape, Access::Read)?;
            self.cached_rows(&pks)?
        } else {
            let mut query = shape.select(&binding.primary_key);
            query.projection = Projection::All;
            let rows = self.reader().select(&binding.name, &query)?;
            key_rows(rows, &binding.primary_key)
        };
        Ok(self.show_keyed(keyed, &shape.projection))
    }

    pub(crate) fn fetch_by_primary_shaped(
        &mut self,
        shape: QueryShape,
        pk: &PrimaryKey,
    ) -> RowcacheResult<Option<Row>> {
        let binding = self.binding()?;
        let query = point_scope(shape.predicates_only(), &binding, pk)
            .projection(shape.projection.clone());
        let row = self.reader().select_one(&binding.name, &query)?;
        Ok(row
            .filter(|row| !row.is_empty())
            .map(|row| self.hooks.show_one(row, &shape.projection)))
    }

    pub(crate) fn fetch_by_primary_cache_shaped(
        &mut self,
        shape: QueryShape,
        pk: &PrimaryKey,
    ) -> RowcacheResult<Option<Row>> {
        if !self.enabled {
            return self.fetch_by_primary_shaped(shape, pk);
        }
        let row = self.cached_row(pk)?;
        Ok(row
            .filter(|row| shape.matches(row))
            .map(|row| self.hooks.show_one(row, &shape.projection)))
    }

    pub(crate) fn fetch_by_primary_arr_shaped(
        &mut self,
        shape: QueryShape,
        pks: &[PrimaryKey],
    ) -> RowcacheResult<Vec<Row>> {
        if pks.is_empty() {
            return Ok(Vec::new());
        }
        let binding = self.binding()?;
        let query = shape
            .predicates_only()
            .filter(Predicate::is_in(
                &binding.primary_key,
                pks.iter().map(PrimaryKey::to_value),
            ))
            .projection(shape.projection.clone());
        let rows = self.reader().select(&binding.name, &query)?;
        Ok(self.hooks.show_all(rows, &shape.projection))
    }

    pub(crate) fn fetch_by_primary_arr_cache_shaped(
        &mut self,
        shape: QueryShape,
        pks: &[PrimaryKey],
    ) -> RowcacheResult<Vec<Row>> {
        let keyed = self.keyed_by_primary_arr(&shape, pks)?;
        let rows = keyed.into_iter().map(|(_, row)| row).collect();
        Ok(self.hooks.show_all(rows, &shape.projection))
    }

    pub(crate) fn fetch_keyed_by_primary_arr_cache_shaped(
        &mut self,
        shape: QueryShape,
        pks: &[PrimaryKey],
    ) -> RowcacheResult<Vec<(PrimaryKey, Row)>> {
        let keyed = self.keyed_by_primary_arr(&shape, pks)?;
        Ok(self.show_keyed(keyed, &shape.projection))
    }

    pub(crate) fn count_shaped(
        &mut self,
        shape: QueryShape,
        aggregate: Aggregate,
    ) -> RowcacheResult<i64> {
        let binding = self.binding()?;
        let query = shape
            .predicates_only()
            .projection(shape.projection.clone());
        self.reader().aggregate(&binding.name, &aggregate, &query)
    }

    pub(crate) fn update_by_primary_cache_shaped(
        &mut self,
        shape: QueryShape,
        pk: PrimaryKey,
        changes: Row,
    ) -> RowcacheResult<u64> {
        let binding = self.binding()?;
        let payload = self.hooks.on_update(changes);
        let scope = point_scope(shape.predicates_only(), &binding, &pk);
        let affected = self
            .writer()
            .update(&binding.name, &scope, &Changes::set(payload))?;
        self.after_write(vec![pk])?;
        Ok(affected)
    }

    /// With caching enabled each matching key is updated on its own and
    /// invalidated; otherwise one scoped statement runs.
    pub(crate) fn update_by_cache_shaped(
        &mut self,
        shape: QueryShape,
        changes: Row,
    ) -> RowcacheResult<u64> {
        let binding = self.binding()?;
        let changes = Changes::set(self.hooks.on_update(changes));
        if !self.enabled {
            return self.writer().update(
                &binding.name,
                &shape.select(&binding.primary_key),
                &changes,
            );
        }
        let pks = self.scan_keys(&shape, Access::Write)?;
        self.per_key_write(&binding, pks, |source, scope| {
            source.update(&binding.name, scope, &changes)
        })
    }

    pub(crate) fn delete_by_primary_cache_shaped(
        &mut self,
        shape: QueryShape,
        pk: PrimaryKey,
    ) -> RowcacheResult<u64> {
        let binding = self.binding()?;
        let scope = point_scope(shape.predicates_only(), &binding, &pk);
        let affected = self.writer().delete(&binding.name, &scope)?;
        self.after_write(vec![pk])?;
        Ok(affected)
    }

    pub(crate) fn delete_by_cache_shaped(&mut self, shape: QueryShape) -> RowcacheResult<u64> {
        let binding = self.binding()?;
        if !self.enabled {
            return self
                .writer()
                .delete(&binding.name, &shape.select(&binding.primary_key));
        }
        let pks = self.scan_keys(&shape, Access::Write)?;
        self.per_key_write(&binding, pks, |source, scope| {
            source.delete(&binding.name, scope)
        })
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn binding(&self) -> RowcacheResult<TableBinding> {
        self.table.validate()?;
        Ok(self.table.clone())
    }

    fn keyspace(&self) -> RowcacheResult<Keyspace> {
        let binding = self.binding()?;
        Ok(Keyspace::new(&self.router.identity(), &binding.name))
    }

    fn reader(&self) -> &R::Source {
        self.router
            .route(Access::Read, self.invalidation.in_transaction())
    }

    fn writer(&self) -> &R::Source {
        self.router.route(Access::Write, true)
    }

    /// Resolve the cache client, connecting configured endpoints on first
    /// use.
    fn cache_client(&mut self) -> RowcacheResult<Arc<dyn KvCache>> {
        match &mut self.cache {
            CacheHandle::Injected(cache) => Ok(Arc::clone(cache)),
            CacheHandle::Endpoints {
                client: Some(cache),
                ..
            } => Ok(Arc::clone(cache)),
            CacheHandle::Endpoints { endpoints, client } => {
                let cache = rowcache_storage::connect(endpoints)?;
                tracing::debug!(endpoints = endpoints.len(), "cache client created");
                *client = Some(Arc::clone(&cache));
                Ok(cache)
            }
            CacheHandle::Unconfigured => Err(CacheError::Unavailable {
                reason: "no cache instance or cache endpoints configured".to_string(),
            }
            .into()),
        }
    }

    /// Run `op` against a record cache and a primary-key fetcher on the
    /// current read source. Misses are not written back inside a
    /// transaction.
    fn with_records<T>(
        &mut self,
        op: impl FnOnce(
            &mut RecordCache<'_>,
            &SourceFetcher<'_, R::Source>,
        ) -> RowcacheResult<T>,
    ) -> RowcacheResult<T> {
        let binding = self.binding()?;
        let keyspace = self.keyspace()?;
        let cache = self.cache_client()?;
        let in_transaction = self.invalidation.in_transaction();
        let fetcher = SourceFetcher {
            source: self.router.route(Access::Read, in_transaction),
            binding: &binding,
        };
        let mut records =
            RecordCache::open(cache.as_ref(), &keyspace, self.expiration, &mut self.stats)?
                .store_misses(!in_transaction);
        op(&mut records, &fetcher)
    }

    fn cached_row(&mut self, pk: &PrimaryKey) -> RowcacheResult<Option<Row>> {
        self.with_records(|records, fetcher| records.get(pk, fetcher))
    }

    fn cached_rows(&mut self, pks: &[PrimaryKey]) -> RowcacheResult<Vec<(PrimaryKey, Row)>> {
        self.with_records(|records, fetcher| records.get_batch_keyed(pks, fetcher))
    }

    /// Keyed rows for `pks` in input order, through the cache when enabled.
    fn keyed_by_primary_arr(
        &mut self,
        shape: &QueryShape,
        pks: &[PrimaryKey],
    ) -> RowcacheResult<Vec<(PrimaryKey, Row)>> {
        if pks.is_empty() {
            return Ok(Vec::new());
        }
        if self.enabled {
            let keyed = self.cached_rows(pks)?;
            return Ok(keyed
                .into_iter()
                .filter(|(_, row)| shape.matches(row))
                .collect());
        }

        let binding = self.binding()?;
        let query = shape.predicates_only().filter(Predicate::is_in(
            &binding.primary_key,
            pks.iter().map(PrimaryKey::to_value),
        ));
        let rows = self.reader().select(&binding.name, &query)?;
        let found: std::collections::HashMap<PrimaryKey, Row> =
            key_rows(rows, &binding.primary_key).into_iter().collect();
        Ok(pks
            .iter()
            .filter_map(|pk| found.get(pk).map(|row| (pk.clone(), row.clone())))
            .collect())
    }

    /// Keyed results go through the single-row entry point so a sequence
    /// hook that drops or reorders rows cannot pair a key with another row.
    fn show_keyed(
        &self,
        keyed: Vec<(PrimaryKey, Row)>,
        projection: &Projection,
    ) -> Vec<(PrimaryKey, Row)> {
        keyed
            .into_iter()
            .map(|(pk, row)| (pk, self.hooks.show_one(row, projection)))
            .collect()
    }

    /// Primary keys selected by the shape.
    fn scan_keys(&self, shape: &QueryShape, access: Access) -> RowcacheResult<Vec<PrimaryKey>> {
        let binding = self.binding()?;
        let source = match access {
            Access::Read => self.reader(),
            Access::Write => self.writer(),
        };
        let rows = source.select(&binding.name, &shape.key_scan(&binding.primary_key))?;
        Ok(rows
            .iter()
            .filter_map(|row| row.primary_key(&binding.primary_key))
            .collect())
    }

    /// Apply `write` to each key on the primary, invalidating the keys that
    /// were written even when a later one fails.
    fn per_key_write(
        &mut self,
        binding: &TableBinding,
        pks: Vec<PrimaryKey>,
        write: impl Fn(&R::Source, &SelectQuery) -> RowcacheResult<u64>,
    ) -> RowcacheResult<u64> {
        let mut affected = 0;
        let mut written = Vec::with_capacity(pks.len());
        let mut failure = None;
        for pk in pks {
            let scope = point_scope(SelectQuery::new(), binding, &pk);
            match write(self.writer(), &scope) {
                Ok(n) => {
                    affected += n;
                    written.push(pk);
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        self.after_write(written)?;
        match failure {
            Some(e) => Err(e),
            None => Ok(affected),
        }
    }

    /// Invalidate or buffer keys after a write the source accepted.
    fn after_write(&mut self, pks: Vec<PrimaryKey>) -> RowcacheResult<()> {
        if !self.enabled || pks.is_empty() {
            return Ok(());
        }
        let count = pks.len() as u64;
        match self.invalidation.on_write(pks) {
            Invalidation::Deferred => {
                self.stats.deferred += count;
                Ok(())
            }
            Invalidation::Immediate(pks) => self.purge(&pks).map(|_| ()),
        }
    }

    fn purge(&mut self, pks: &[PrimaryKey]) -> RowcacheResult<bool> {
        self.with_records(|records, _| records.purge(pks))
    }
}

/// `query` narrowed to the row with key `pk`.
fn point_scope(query: SelectQuery, binding: &TableBinding, pk: &PrimaryKey) -> SelectQuery {
    query.filter(Predicate::eq(&binding.primary_key, pk.to_value()))
}

fn key_rows(rows: Vec<Row>, primary_key: &str) -> Vec<(PrimaryKey, Row)> {
    rows.into_iter()
        .filter_map(|row| row.primary_key(primary_key).map(|pk| (pk, row)))
        .collect()
}
