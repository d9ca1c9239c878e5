//! rowcache Test Utilities
//!
//! Centralized test infrastructure for the rowcache workspace:
//! - Recording wrappers around the in-memory source and cache
//! - Proptest generators for rows and key sets
//! - Fixtures for a seeded `user` table
//! - Custom assertions for rowcache error variants

pub use rowcache_core::{
    CacheEndpoint, CacheError, ConfigError, ConnectionIdentity, PrimaryKey, Row, RowcacheError,
    RowcacheResult, SourceError,
};
pub use rowcache_storage::{CacheStats, Expiration, InMemoryKvCache, KvCache, MemorySource};

use rowcache_core::{Aggregate, Changes, SelectQuery};
use rowcache_storage::RelationalSource;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Install a test-friendly tracing subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to `warn`.
pub fn init_test_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// RECORDING SOURCE
// ============================================================================

#[derive(Debug, Default)]
struct SourceCalls {
    selects: AtomicUsize,
    aggregates: AtomicUsize,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

/// [`MemorySource`] that counts the statements it receives.
///
/// Clones share counters. With [`RecordingSource::fail_writes`] set, every
/// write statement returns an error without touching the tables.
#[derive(Debug, Clone)]
pub struct RecordingSource {
    inner: MemorySource,
    calls: Arc<SourceCalls>,
}

impl RecordingSource {
    pub fn new(inner: MemorySource) -> Self {
        Self {
            inner,
            calls: Arc::new(SourceCalls::default()),
        }
    }

    /// A recording handle on the same tables under another identity, with
    /// its own counters.
    pub fn replica(&self, identity: ConnectionIdentity) -> Self {
        Self {
            inner: self.inner.replica(identity),
            calls: Arc::new(SourceCalls::default()),
        }
    }

    pub fn inner(&self) -> &MemorySource {
        &self.inner
    }

    /// `select` and `select_one` statements so far.
    pub fn selects(&self) -> usize {
        self.calls.selects.load(Ordering::SeqCst)
    }

    pub fn aggregates(&self) -> usize {
        self.calls.aggregates.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.calls.writes.load(Ordering::SeqCst)
    }

    pub fn reset_counts(&self) {
        self.calls.selects.store(0, Ordering::SeqCst);
        self.calls.aggregates.store(0, Ordering::SeqCst);
        self.calls.writes.store(0, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.calls.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn record_select(&self) {
        self.calls.selects.fetch_add(1, Ordering::SeqCst);
    }

    fn record_write(&self, table: &str) -> RowcacheResult<()> {
        self.calls.writes.fetch_add(1, Ordering::SeqCst);
        if self.calls.fail_writes.load(Ordering::SeqCst) {
            return Err(SourceError::QueryFailed {
                table: table.to_string(),
                reason: "injected write failure".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl RelationalSource for RecordingSource {
    fn identity(&self) -> ConnectionIdentity {
        self.inner.identity()
    }

    fn select_one(&self, table: &str, query: &SelectQuery) -> RowcacheResult<Option<Row>> {
        self.record_select();
        self.inner.select_one(table, query)
    }

    fn select(&self, table: &str, query: &SelectQuery) -> RowcacheResult<Vec<Row>> {
        self.record_select();
        self.inner.select(table, query)
    }

    fn aggregate(
        &self,
        table: &str,
        aggregate: &Aggregate,
        query: &SelectQuery,
    ) -> RowcacheResult<i64> {
        self.calls.aggregates.fetch_add(1, Ordering::SeqCst);
        self.inner.aggregate(table, aggregate, query)
    }

    fn insert(&self, table: &str, row: &Row) -> RowcacheResult<PrimaryKey> {
        self.record_write(table)?;
        self.inner.insert(table, row)
    }

    fn insert_multi(&self, table: &str, rows: &[Row]) -> RowcacheResult<Vec<PrimaryKey>> {
        self.record_write(table)?;
        self.inner.insert_multi(table, rows)
    }

    fn replace(&self, table: &str, row: &Row) -> RowcacheResult<PrimaryKey> {
        self.record_write(table)?;
        self.inner.replace(table, row)
    }

    fn update(&self, table: &str, query: &SelectQuery, changes: &Changes) -> RowcacheResult<u64> {
        self.record_write(table)?;
        self.inner.update(table, query, changes)
    }

    fn delete(&self, table: &str, query: &SelectQuery) -> RowcacheResult<u64> {
        self.record_write(table)?;
        self.inner.delete(table, query)
    }

    fn begin(&self) -> RowcacheResult<()> {
        self.inner.begin()
    }

    fn commit(&self) -> RowcacheResult<()> {
        self.inner.commit()
    }

    fn rollback(&self) -> RowcacheResult<()> {
        self.inner.rollback()
    }
}

// ============================================================================
// RECORDING CACHE
// ============================================================================

/// Per-operation call counts of a [`RecordingKvCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheOps {
    pub get: usize,
    pub get_multi: usize,
    pub set: usize,
    pub set_multi: usize,
    pub delete: usize,
    pub delete_multi: usize,
    pub flush: usize,
}

impl CacheOps {
    pub fn total(&self) -> usize {
        self.get + self.get_multi + self.set + self.set_multi + self.delete + self.delete_multi
            + self.flush
    }
}

/// [`InMemoryKvCache`] that counts operations and remembers deleted keys.
#[derive(Debug, Default)]
pub struct RecordingKvCache {
    inner: InMemoryKvCache,
    ops: Mutex<CacheOps>,
    deleted: Mutex<Vec<String>>,
}

impl RecordingKvCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryKvCache {
        &self.inner
    }

    pub fn ops(&self) -> CacheOps {
        self.ops.lock().map(|ops| *ops).unwrap_or_default()
    }

    /// Every key passed to `delete` or `delete_multi`, in call order.
    pub fn deleted_keys(&self) -> Vec<String> {
        self.deleted
            .lock()
            .map(|keys| keys.clone())
            .unwrap_or_default()
    }

    pub fn reset(&self) {
        if let Ok(mut ops) = self.ops.lock() {
            *ops = CacheOps::default();
        }
        if let Ok(mut keys) = self.deleted.lock() {
            keys.clear();
        }
    }

    fn record(&self, op: impl FnOnce(&mut CacheOps)) {
        if let Ok(mut ops) = self.ops.lock() {
            op(&mut ops);
        }
    }

    fn record_deleted<'k>(&self, keys: impl IntoIterator<Item = &'k String>) {
        if let Ok(mut deleted) = self.deleted.lock() {
            deleted.extend(keys.into_iter().cloned());
        }
    }
}

impl KvCache for RecordingKvCache {
    fn get(&self, key: &str) -> RowcacheResult<Option<String>> {
        self.record(|ops| ops.get += 1);
        self.inner.get(key)
    }

    fn get_multi(&self, keys: &[String]) -> RowcacheResult<HashMap<String, String>> {
        self.record(|ops| ops.get_multi += 1);
        self.inner.get_multi(keys)
    }

    fn set(&self, key: &str, value: &str, expiration: Expiration) -> RowcacheResult<bool> {
        self.record(|ops| ops.set += 1);
        self.inner.set(key, value, expiration)
    }

    fn set_multi(
        &self,
        items: &[(String, String)],
        expiration: Expiration,
    ) -> RowcacheResult<bool> {
        self.record(|ops| ops.set_multi += 1);
        self.inner.set_multi(items, expiration)
    }

    fn delete(&self, key: &str) -> RowcacheResult<bool> {
        self.record(|ops| ops.delete += 1);
        self.record_deleted([&key.to_string()]);
        self.inner.delete(key)
    }

    fn delete_multi(&self, keys: &[String]) -> RowcacheResult<bool> {
        self.record(|ops| ops.delete_multi += 1);
        self.record_deleted(keys);
        self.inner.delete_multi(keys)
    }

    fn flush(&self) -> RowcacheResult<bool> {
        self.record(|ops| ops.flush += 1);
        self.inner.flush()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for rows and key sets.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_city() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("Berlin".to_string()),
            Just("Lagos".to_string()),
            Just("Lima".to_string()),
            Just("Osaka".to_string()),
        ]
    }

    /// A `user` row without its primary key. `age` is sometimes absent.
    pub fn arb_user_row() -> impl Strategy<Value = Row> {
        (arb_city(), proptest::option::of(0i64..120), 0i64..1_000).prop_map(
            |(city, age, tag)| {
                let row = Row::new().with("city", city).with("tag", tag);
                match age {
                    Some(age) => row.with("age", age),
                    None => row,
                }
            },
        )
    }

    /// Primary keys in `1..=max_id`, with repeats, in arbitrary order.
    pub fn arb_key_list(max_id: i64, max_len: usize) -> impl Strategy<Value = Vec<PrimaryKey>> {
        proptest::collection::vec(1..=max_id, 0..=max_len)
            .prop_map(|ids| ids.into_iter().map(PrimaryKey::Int).collect())
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built sources and rows for common scenarios.

    use super::*;

    pub const USER_TABLE: &str = "user";
    pub const USER_KEY: &str = "id";

    pub fn primary_identity() -> ConnectionIdentity {
        ConnectionIdentity::new("db-primary", 3306, "app")
    }

    pub fn replica_identity(n: usize) -> ConnectionIdentity {
        ConnectionIdentity::new(format!("db-replica-{}", n), 3306, "app")
    }

    /// A source with an empty `user` table keyed by `id`.
    pub fn user_source() -> MemorySource {
        let source = MemorySource::new(primary_identity());
        // A fresh source has an unpoisoned lock.
        let _ = source.create_table(USER_TABLE, USER_KEY);
        source
    }

    /// `user` row with the given city and age.
    pub fn user(city: &str, age: i64) -> Row {
        Row::new().with("city", city).with("age", age).with("tag", 0)
    }

    /// A source whose `user` table holds `count` rows with ids `1..=count`.
    ///
    /// Cities cycle through A, B, C; ages are `20 + id`.
    pub fn seeded_user_source(count: i64) -> MemorySource {
        let source = user_source();
        for id in 1..=count {
            let city = ["A", "B", "C"][(id as usize - 1) % 3];
            let _ = source.insert(USER_TABLE, &user(city, 20 + id).with(USER_KEY, id));
        }
        source
    }

    pub fn keys(ids: &[i64]) -> Vec<PrimaryKey> {
        ids.iter().copied().map(PrimaryKey::Int).collect()
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for rowcache error variants and rows.

    use super::*;

    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &RowcacheResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &RowcacheResult<T>, expected: ConfigError) {
        match result {
            Err(RowcacheError::Config(e)) => assert_eq!(*e, expected),
            other => panic!("Expected Config error {:?}, got: {:?}", expected, other),
        }
    }

    #[track_caller]
    pub fn assert_cache_unavailable<T: std::fmt::Debug>(result: &RowcacheResult<T>) {
        match result {
            Err(RowcacheError::Cache(CacheError::Unavailable { .. })) => {}
            other => panic!("Expected cache unavailable error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_source_error<T: std::fmt::Debug>(result: &RowcacheResult<T>) {
        match result {
            Err(RowcacheError::Source(_)) => {}
            other => panic!("Expected Source error, got: {:?}", other),
        }
    }

    /// Assert that `rows` carry exactly `ids` in their `id` column, in order.
    #[track_caller]
    pub fn assert_ids(rows: &[Row], ids: &[i64]) {
        let actual: Vec<Option<i64>> = rows
            .iter()
            .map(|row| row.get(fixtures::USER_KEY).and_then(|v| v.as_i64()))
            .collect();
        let expected: Vec<Option<i64>> = ids.iter().copied().map(Some).collect();
        assert_eq!(actual, expected, "row ids differ");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowcache_core::Predicate;

    #[test]
    fn test_recording_source_counts_and_fails_writes() {
        let source = RecordingSource::new(fixtures::seeded_user_source(3));
        let query = SelectQuery::new().filter(Predicate::eq("id", 1));
        assert!(source.select_one("user", &query).unwrap().is_some());
        assert_eq!(source.selects(), 1);

        source.fail_writes(true);
        let result = source.delete("user", &query);
        assertions::assert_source_error(&result);
        assert_eq!(source.inner().row_count("user").unwrap(), 3);
        assert_eq!(source.writes(), 1);
    }

    #[test]
    fn test_recording_cache_tracks_deletes() {
        let cache = RecordingKvCache::new();
        cache.set("a", "1", Expiration::Never).unwrap();
        cache
            .delete_multi(&["a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(cache.deleted_keys(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(cache.ops().set, 1);
        assert_eq!(cache.ops().delete_multi, 1);
        assert!(cache.inner().is_empty());
    }

    #[test]
    fn test_seeded_source() {
        let source = fixtures::seeded_user_source(4);
        assert_eq!(source.row_count("user").unwrap(), 4);
    }
}
