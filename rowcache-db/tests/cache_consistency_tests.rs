use proptest::prelude::*;
use rowcache_db::{CacheDb, PrimaryKey, Row, Single};
use rowcache_test_utils::assertions::{assert_ids, assert_source_error};
use rowcache_test_utils::fixtures::{self, USER_KEY, USER_TABLE};
use rowcache_test_utils::generators::{arb_key_list, arb_user_row};
use rowcache_test_utils::{init_test_tracing, RecordingKvCache, RecordingSource};
use serde_json::json;
use std::sync::Arc;

fn cached_db(
    source: RecordingSource,
) -> (CacheDb<Single<RecordingSource>>, Arc<RecordingKvCache>) {
    let cache = Arc::new(RecordingKvCache::new());
    let mut db = CacheDb::single(source);
    db.config_table(USER_TABLE, USER_KEY).set_cache(cache.clone());
    (db, cache)
}

fn ids(rows: &[Row]) -> Vec<i64> {
    rows.iter()
        .filter_map(|row| row.get(USER_KEY).and_then(|v| v.as_i64()))
        .collect()
}

#[test]
fn update_then_read_never_returns_stale_row() {
    init_test_tracing();
    let (mut db, _cache) = cached_db(RecordingSource::new(fixtures::user_source()));

    db.insert_data(Row::new().with("id", 1).with("city", "A"))
        .expect("insert");
    let first = db.fetch_by_primary_cache(1).expect("fetch").expect("row");
    assert_eq!(first, Row::new().with("id", 1).with("city", "A"));

    let affected = db
        .update_by_primary_cache(1, Row::new().with("city", "B"))
        .expect("update");
    assert_eq!(affected, 1);

    let second = db.fetch_by_primary_cache(1).expect("fetch").expect("row");
    assert_eq!(second, Row::new().with("id", 1).with("city", "B"));
}

#[test]
fn rolled_back_update_leaves_pre_transaction_value() {
    let (mut db, _cache) = cached_db(RecordingSource::new(fixtures::user_source()));
    db.insert_data(Row::new().with("id", 1).with("city", "A"))
        .expect("insert");
    db.update_by_primary_cache(1, Row::new().with("city", "B"))
        .expect("update");
    db.fetch_by_primary_cache(1).expect("warm");

    db.start_transaction().expect("begin");
    db.update_by_primary_cache(1, Row::new().with("city", "C"))
        .expect("update in transaction");
    db.rollback().expect("rollback");

    let row = db.fetch_by_primary_cache(1).expect("fetch").expect("row");
    assert_eq!(row.get("city"), Some(&json!("B")));
    assert!(!db.in_transaction());
}

#[test]
fn delete_invalidates_cached_row() {
    let (mut db, cache) = cached_db(RecordingSource::new(fixtures::seeded_user_source(3)));
    assert!(db.fetch_by_primary_cache(2).expect("fetch").is_some());

    assert_eq!(db.delete_by_primary_cache(2).expect("delete"), 1);
    assert!(db.fetch_by_primary_cache(2).expect("fetch").is_none());
    assert_eq!(cache.deleted_keys().len(), 1);
}

#[test]
fn delta_writes_invalidate_cached_row() {
    let (mut db, _cache) = cached_db(RecordingSource::new(fixtures::seeded_user_source(1)));
    db.fetch_by_primary_cache(1).expect("warm");

    db.increase(1, "tag", 5).expect("increase");
    let row = db.fetch_by_primary_cache(1).expect("fetch").expect("row");
    assert_eq!(row.get("tag"), Some(&json!(5)));

    db.decrease(1, "tag", 2).expect("decrease");
    let row = db.fetch_by_primary_cache(1).expect("fetch").expect("row");
    assert_eq!(row.get("tag"), Some(&json!(3)));
}

#[test]
fn failed_write_leaves_cache_untouched() {
    let source = RecordingSource::new(fixtures::seeded_user_source(2));
    let (mut db, cache) = cached_db(source.clone());
    db.fetch_by_primary_cache(1).expect("warm");
    let entries = cache.inner().len();

    source.fail_writes(true);
    let result = db.update_by_primary_cache(1, Row::new().with("city", "Z"));
    assert_source_error(&result);
    let result = db.delete_by_primary_cache(1);
    assert_source_error(&result);

    assert!(cache.deleted_keys().is_empty());
    assert_eq!(cache.inner().len(), entries);
    assert_eq!(db.stats().invalidations, 0);

    source.fail_writes(false);
    let row = db.fetch_by_primary_cache(1).expect("fetch").expect("row");
    assert_eq!(row.get("city"), Some(&json!("A")));
}

#[test]
fn missing_rows_are_not_cached() {
    let (mut db, cache) = cached_db(RecordingSource::new(fixtures::seeded_user_source(1)));
    assert!(db.fetch_by_primary_cache(42).expect("fetch").is_none());
    // Only the generation token.
    assert_eq!(cache.inner().len(), 1);
}

#[test]
fn write_payloads_are_never_cached() {
    let (mut db, cache) = cached_db(RecordingSource::new(fixtures::user_source()));
    db.insert_data(fixtures::user("A", 30)).expect("insert");
    db.replace_data(fixtures::user("B", 31).with("id", 1))
        .expect("replace");
    db.insert_multi_data(vec![fixtures::user("C", 32), fixtures::user("A", 33)])
        .expect("insert many");
    // The replace resolved a generation to purge under; no row was stored.
    assert_eq!(cache.ops().set_multi, 0);
    assert_eq!(cache.inner().len(), 1);
}

#[test]
fn batch_reads_keep_input_order_across_hits_and_misses() {
    let (mut db, cache) = cached_db(RecordingSource::new(fixtures::seeded_user_source(6)));
    db.fetch_by_primary_cache(5).expect("warm");
    db.fetch_by_primary_cache(2).expect("warm");
    cache.reset();

    let rows = db
        .fetch_by_primary_arr_cache(&fixtures::keys(&[2, 9, 6, 5, 1]))
        .expect("batch");
    assert_ids(&rows, &[2, 6, 5, 1]);
    assert_eq!(cache.ops().get_multi, 1);
    assert_eq!(cache.ops().set_multi, 1);
}

#[test]
fn fetch_all_by_cache_uses_one_key_scan() {
    let source = RecordingSource::new(fixtures::seeded_user_source(9));
    let (mut db, _cache) = cached_db(source.clone());
    db.fetch_by_primary_arr_cache(&fixtures::keys(&[1, 2, 3, 4, 5, 6, 7, 8, 9]))
        .expect("warm");
    source.reset_counts();

    let rows = db
        .query()
        .where_eq("city", "C")
        .order_by_primary(true)
        .fetch_all_by_cache()
        .expect("fetch all");
    assert_ids(&rows, &[9, 6, 3]);
    assert_eq!(source.selects(), 1);
}

fn fresh_db_with(rows: &[Row]) -> CacheDb<Single<RecordingSource>> {
    let (mut db, _cache) = cached_db(RecordingSource::new(fixtures::user_source()));
    for row in rows {
        db.insert_data(row.clone()).expect("insert");
    }
    db
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_cache_path_matches_direct_path(
        rows in proptest::collection::vec(arb_user_row(), 1..8),
        probe in 1i64..10,
    ) {
        let mut db = fresh_db_with(&rows);
        let direct = db.fetch_by_primary(probe).unwrap();
        let miss = db.fetch_by_primary_cache(probe).unwrap();
        let hit = db.fetch_by_primary_cache(probe).unwrap();
        prop_assert_eq!(&direct, &miss);
        prop_assert_eq!(&direct, &hit);
        prop_assert_eq!(direct.is_some(), probe as usize <= rows.len());
    }

    #[test]
    fn prop_batch_order_matches_request(
        warm in arb_key_list(12, 6),
        request in arb_key_list(15, 10),
    ) {
        let (mut db, _cache) = cached_db(RecordingSource::new(fixtures::seeded_user_source(12)));
        db.fetch_by_primary_arr_cache(&warm).unwrap();

        let rows = db.fetch_by_primary_arr_cache(&request).unwrap();
        let expected: Vec<i64> = request
            .iter()
            .filter_map(PrimaryKey::as_int)
            .filter(|id| *id <= 12)
            .collect();
        prop_assert_eq!(ids(&rows), expected);
    }
}
