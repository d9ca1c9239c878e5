use rowcache_db::{CacheDb, Pagination, PrimaryKey, Projection, Row, RowFilter, Single};
use rowcache_test_utils::assertions::assert_ids;
use rowcache_test_utils::fixtures::{self, USER_KEY, USER_TABLE};
use rowcache_test_utils::{RecordingKvCache, RecordingSource};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Ten users: cities cycle A, B, C by id; age is `20 + id`; tag is 0.
fn users() -> (
    CacheDb<Single<RecordingSource>>,
    RecordingSource,
    Arc<RecordingKvCache>,
) {
    let source = RecordingSource::new(fixtures::seeded_user_source(10));
    let cache = Arc::new(RecordingKvCache::new());
    let mut db = CacheDb::single(source.clone());
    db.config_table(USER_TABLE, USER_KEY).set_cache(cache.clone());
    (db, source, cache)
}

fn bump_views(row: Row) -> Row {
    let views = row.get("views").and_then(Value::as_i64).unwrap_or(0);
    row.with("views", views + 1)
}

#[derive(Default)]
struct ShowCalls {
    single: AtomicUsize,
    sequence: AtomicUsize,
}

struct CountingShow(Arc<ShowCalls>);

impl RowFilter for CountingShow {
    fn apply(&self, row: Row) -> Row {
        self.0.single.fetch_add(1, Ordering::SeqCst);
        bump_views(row)
    }

    fn apply_all(&self, rows: Vec<Row>) -> Vec<Row> {
        self.0.sequence.fetch_add(1, Ordering::SeqCst);
        rows.into_iter().map(bump_views).collect()
    }
}

// ============================================================================
// PROJECTION AND HOOKS
// ============================================================================

#[test]
fn projection_on_cached_row_skips_source() {
    let (mut db, source, _cache) = users();
    db.fetch_by_primary_cache(1).expect("warm under *");
    source.reset_counts();

    let row = db
        .query()
        .column("id, city")
        .fetch_by_primary_cache(1)
        .expect("fetch")
        .expect("row");
    assert_eq!(row, Row::new().with("id", 1).with("city", "A"));
    assert_eq!(source.selects(), 0);

    let row = db
        .query()
        .columns(Projection::columns(["city", "nickname"]))
        .fetch_by_primary_cache(1)
        .expect("fetch")
        .expect("row");
    assert_eq!(row, Row::new().with("city", "A"));
}

#[test]
fn show_hook_runs_once_per_row_on_every_path() {
    let (mut db, _source, _cache) = users();
    db.register_filter_show(bump_views);

    let miss = db.fetch_by_primary_cache(3).expect("miss").expect("row");
    let hit = db.fetch_by_primary_cache(3).expect("hit").expect("row");
    let direct = db.fetch_by_primary(3).expect("direct").expect("row");
    assert_eq!(miss.get("views"), Some(&json!(1)));
    assert_eq!(hit, miss);
    assert_eq!(direct, miss);

    let rows = db.query().where_eq("city", "C").fetch_all_by_cache().expect("all");
    assert!(rows.iter().all(|row| row.get("views") == Some(&json!(1))));
    let rows = db.query().where_eq("city", "C").fetch_all().expect("all");
    assert!(rows.iter().all(|row| row.get("views") == Some(&json!(1))));
}

#[test]
fn show_hook_entry_point_follows_result_shape() {
    let (mut db, _source, _cache) = users();
    let calls = Arc::new(ShowCalls::default());
    db.register_filter_show(CountingShow(calls.clone()));

    db.fetch_by_primary_cache(1).expect("single");
    db.query().fetch_one().expect("single");
    db.fetch_by_primary_arr_cache(&fixtures::keys(&[1, 2]))
        .expect("sequence");
    db.query().fetch_all().expect("sequence");

    assert_eq!(calls.single.load(Ordering::SeqCst), 2);
    assert_eq!(calls.sequence.load(Ordering::SeqCst), 2);
}

/// Sequence entry point drops the first row; single rows pass through.
struct SkipFirst;

impl RowFilter for SkipFirst {
    fn apply(&self, row: Row) -> Row {
        row
    }

    fn apply_all(&self, rows: Vec<Row>) -> Vec<Row> {
        rows.into_iter().skip(1).collect()
    }
}

#[test]
fn keyed_results_keep_each_key_with_its_row() {
    let (mut db, _source, _cache) = users();
    db.register_filter_show(SkipFirst);

    let assoc = db
        .query()
        .fetch_assoc_by_primary_arr_cache(&fixtures::keys(&[1, 2, 3]))
        .expect("assoc");
    assert_eq!(assoc.len(), 3);
    for (pk, row) in &assoc {
        assert_eq!(row.primary_key(USER_KEY).as_ref(), Some(pk));
    }

    let assoc = db.query().where_eq("city", "A").fetch_assoc_by_cache().expect("assoc");
    assert!(assoc
        .iter()
        .all(|(pk, row)| row.primary_key(USER_KEY).as_ref() == Some(pk)));

    let pairs = db
        .query()
        .fetch_pairs_by_primary_arr_cache(&fixtures::keys(&[2, 5]), "age")
        .expect("pairs");
    assert_eq!(
        pairs,
        vec![(PrimaryKey::from(2i64), json!(22)), (PrimaryKey::from(5i64), json!(25))]
    );

    db.disable_cache().expect("disable");
    let pairs = db
        .query()
        .where_eq("city", "B")
        .order_by_primary(false)
        .fetch_pairs_by_cache("age")
        .expect("pairs");
    assert_eq!(
        pairs,
        vec![
            (PrimaryKey::from(2i64), json!(22)),
            (PrimaryKey::from(5i64), json!(25)),
            (PrimaryKey::from(8i64), json!(28)),
        ]
    );
}

#[test]
fn distinct_applies_to_direct_path_only() {
    let (mut db, _source, _cache) = users();
    let direct = db.query().column("city").distinct().fetch_all().expect("direct");
    assert_eq!(direct.len(), 3);

    let cached = db
        .query()
        .column("city")
        .distinct()
        .fetch_all_by_cache()
        .expect("cached");
    assert_eq!(cached.len(), 10);
    assert!(cached.iter().all(|row| row.len() == 1));
}

#[test]
fn write_hooks_apply_only_to_payloads() {
    let (mut db, _source, _cache) = users();
    db.register_filter_insert(|row: Row| row.with("source", "insert-hook"));

    let pk = db.insert_data(fixtures::user("B", 50)).expect("insert");
    let row = db.fetch_by_primary(pk.clone()).expect("fetch").expect("row");
    assert_eq!(row.get("source"), Some(&json!("insert-hook")));

    // No update hook registered: updates fall back to the insert hook.
    db.update_by_primary_cache(1, Row::new().with("city", "Z"))
        .expect("update");
    let row = db.fetch_by_primary_cache(1).expect("fetch").expect("row");
    assert_eq!(row.get("source"), Some(&json!("insert-hook")));

    db.register_filter_update(|row: Row| row.with("source", "update-hook"));
    db.update_by_primary_cache(pk.clone(), Row::new().with("age", 51))
        .expect("update");
    let row = db.fetch_by_primary_cache(pk).expect("fetch").expect("row");
    assert_eq!(row.get("source"), Some(&json!("update-hook")));
}

#[test]
fn insert_data_returning_carries_hooked_payload_and_key() {
    let (mut db, _source, _cache) = users();
    db.register_filter_insert(|row: Row| row.with("source", "insert-hook"));
    let row = db
        .insert_data_returning(fixtures::user("C", 60))
        .expect("insert");
    assert_eq!(row.get("id"), Some(&json!(11)));
    assert_eq!(row.get("source"), Some(&json!("insert-hook")));
}

// ============================================================================
// PAGINATION
// ============================================================================

#[test]
fn offset_pagination_on_both_paths() {
    let (mut db, _source, _cache) = users();
    let direct = db
        .query()
        .order_by_primary(false)
        .paginate_by_limit(2, 3)
        .fetch_all()
        .expect("page");
    assert_ids(&direct, &[4, 5, 6]);

    let cached = db
        .query()
        .order_by_primary(false)
        .paginate_by_limit(2, 3)
        .fetch_all_by_cache()
        .expect("page");
    assert_eq!(cached, direct);

    let empty = db.query().paginate_by_limit(1, 0).fetch_all().expect("page");
    assert!(empty.is_empty());
}

#[test]
fn keyset_pagination_walks_by_primary_key() {
    let (mut db, _source, _cache) = users();
    let page = db
        .query()
        .paginate_by_primary(8, 3, true)
        .fetch_all_by_cache()
        .expect("page");
    assert_ids(&page, &[7, 6, 5]);

    let first = db
        .query()
        .paginate_by_primary(0, 4, false)
        .fetch_all()
        .expect("page");
    assert_ids(&first, &[1, 2, 3, 4]);

    let unbounded = db
        .query()
        .paginate(Pagination::by_primary(7, 0, false))
        .fetch_all()
        .expect("page");
    assert_ids(&unbounded, &[8, 9, 10]);
}

#[test]
fn keyset_page_is_stable_under_tail_inserts() {
    let (mut db, _source, _cache) = users();
    let before = db
        .query()
        .paginate_by_primary(5, 2, true)
        .fetch_all_by_cache()
        .expect("page");
    db.insert_data(fixtures::user("A", 99)).expect("insert");
    let after = db
        .query()
        .paginate_by_primary(5, 2, true)
        .fetch_all_by_cache()
        .expect("page");
    assert_ids(&after, &[4, 3]);
    assert_eq!(before, after);
}

// ============================================================================
// SINGLE ROWS, PAIRS, COUNTS
// ============================================================================

#[test]
fn fetch_one_returns_first_match() {
    let (mut db, _source, _cache) = users();
    let direct = db
        .query()
        .where_eq("city", "B")
        .order_by_primary(true)
        .fetch_one()
        .expect("fetch")
        .expect("row");
    assert_eq!(direct.get("id"), Some(&json!(8)));

    let cached = db
        .query()
        .where_eq("city", "B")
        .order_by_primary(true)
        .fetch_one_by_cache()
        .expect("fetch")
        .expect("row");
    assert_eq!(cached, direct);

    let none = db
        .query()
        .where_eq("city", "nowhere")
        .fetch_one_by_cache()
        .expect("fetch");
    assert!(none.is_none());
}

#[test]
fn fetch_by_primary_arr_uses_source_order() {
    let (mut db, _source, _cache) = users();
    let rows = db
        .query()
        .fetch_by_primary_arr(&fixtures::keys(&[3, 1, 42]))
        .expect("fetch");
    assert_ids(&rows, &[1, 3]);
    assert!(db.query().fetch_by_primary_arr(&[]).expect("fetch").is_empty());
}

#[test]
fn pairs_and_assoc_keep_scan_and_request_order() {
    let (mut db, _source, _cache) = users();
    let pairs = db
        .query()
        .where_eq("city", "B")
        .fetch_pairs_by_cache("age")
        .expect("pairs");
    assert_eq!(
        pairs,
        vec![
            (PrimaryKey::Int(2), json!(22)),
            (PrimaryKey::Int(5), json!(25)),
            (PrimaryKey::Int(8), json!(28)),
        ]
    );

    let assoc = db
        .query()
        .column("city")
        .fetch_assoc_by_primary_arr_cache(&fixtures::keys(&[9, 1, 77]))
        .expect("assoc");
    assert_eq!(
        assoc,
        vec![
            (PrimaryKey::Int(9), Row::new().with("city", "C")),
            (PrimaryKey::Int(1), Row::new().with("city", "A")),
        ]
    );

    let pairs = db
        .query()
        .fetch_pairs_by_primary_arr_cache(&fixtures::keys(&[4, 2]), "city")
        .expect("pairs");
    assert_eq!(
        pairs,
        vec![(PrimaryKey::Int(4), json!("A")), (PrimaryKey::Int(2), json!("B"))]
    );

    let keyed = db
        .query()
        .where_eq("city", "A")
        .fetch_assoc_by_cache()
        .expect("assoc");
    let keys: Vec<PrimaryKey> = keyed.into_iter().map(|(pk, _)| pk).collect();
    assert_eq!(keys, fixtures::keys(&[1, 4, 7, 10]));
}

#[test]
fn counts_follow_shape() {
    let (mut db, source, _cache) = users();
    assert_eq!(db.query().count().expect("count"), 10);
    assert_eq!(db.query().where_eq("city", "A").count().expect("count"), 4);
    assert_eq!(
        db.query().count_distinct_column("city").expect("count"),
        3
    );
    assert_eq!(db.query().column("city").count_distinct().expect("count"), 3);
    assert_eq!(source.aggregates(), 4);
}

// ============================================================================
// BULK WRITES
// ============================================================================

#[test]
fn bulk_update_invalidates_each_matching_key() {
    let (mut db, _source, cache) = users();
    db.fetch_by_primary_arr_cache(&fixtures::keys(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]))
        .expect("warm");
    cache.reset();

    let affected = db
        .query()
        .where_eq("city", "A")
        .update_by_cache(Row::new().with("tag", 7))
        .expect("update");
    assert_eq!(affected, 4);
    assert_eq!(cache.deleted_keys().len(), 4);

    let tagged = db
        .query()
        .fetch_pairs_by_primary_arr_cache(&fixtures::keys(&[1, 2, 4]), "tag")
        .expect("pairs");
    assert_eq!(
        tagged,
        vec![
            (PrimaryKey::Int(1), json!(7)),
            (PrimaryKey::Int(2), json!(0)),
            (PrimaryKey::Int(4), json!(7)),
        ]
    );
}

#[test]
fn bulk_delete_invalidates_and_counts() {
    let (mut db, source, _cache) = users();
    db.fetch_by_primary_cache(3).expect("warm");

    let affected = db
        .query()
        .where_eq("city", "C")
        .delete_by_cache()
        .expect("delete");
    assert_eq!(affected, 3);
    assert!(db.fetch_by_primary_cache(3).expect("fetch").is_none());
    assert_eq!(source.inner().row_count(USER_TABLE).expect("count"), 7);
}

#[test]
fn bulk_writes_with_cache_disabled_run_one_statement() {
    let (mut db, source, cache) = users();
    db.disable_cache().expect("disable");
    cache.reset();
    source.reset_counts();

    let affected = db
        .query()
        .where_eq("city", "A")
        .delete_by_cache()
        .expect("delete");
    assert_eq!(affected, 4);
    assert_eq!(source.writes(), 1);
    assert_eq!(cache.ops().total(), 0);
}

#[test]
fn shaped_point_write_respects_predicates() {
    let (mut db, _source, _cache) = users();
    let affected = db
        .query()
        .where_eq("city", "B")
        .update_by_primary_cache(1, Row::new().with("tag", 1))
        .expect("update");
    assert_eq!(affected, 0);

    let affected = db
        .query()
        .where_eq("city", "A")
        .delete_by_primary_cache(1)
        .expect("delete");
    assert_eq!(affected, 1);
}
