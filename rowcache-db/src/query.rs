//! Query shaping.
//!
//! A [`Query`] borrows its [`CacheDb`] mutably, collects projection, filters,
//! ordering and pagination into a [`QueryShape`], and hands the shape to
//! exactly one terminal call. The shape cannot outlive that call.

use rowcache_core::{
    Aggregate, Direction, OrderBy, Predicate, PrimaryKey, Projection, Row, RowcacheResult,
    SelectQuery,
};
use serde_json::Value;

use crate::db::CacheDb;
use crate::pagination::{self, Pagination};
use crate::router::SourceRouter;

/// Transient description of what a terminal call reads or writes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryShape {
    pub projection: Projection,
    pub predicates: Vec<Predicate>,
    pub order_by: Vec<OrderBy>,
    pub pagination: Option<Pagination>,
    pub distinct: bool,
}

impl QueryShape {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full statement for direct source reads and scoped bulk writes.
    pub fn select(&self, primary_key: &str) -> SelectQuery {
        let query = SelectQuery::new()
            .projection(self.projection.clone())
            .filters(self.predicates.iter().cloned())
            .distinct(self.distinct);
        let query = self
            .order_by
            .iter()
            .cloned()
            .fold(query, SelectQuery::order);
        match &self.pagination {
            Some(pagination) => pagination.apply(query, primary_key),
            None => query,
        }
    }

    /// Same rows as [`QueryShape::select`], primary key column only.
    pub fn key_scan(&self, primary_key: &str) -> SelectQuery {
        let mut query = self.select(primary_key);
        query.projection = Projection::columns([primary_key]);
        query.distinct = false;
        query
    }

    /// Predicates only, for aggregates and point statements.
    pub fn predicates_only(&self) -> SelectQuery {
        SelectQuery::new().filters(self.predicates.iter().cloned())
    }

    /// Whether `row` satisfies every predicate.
    pub fn matches(&self, row: &Row) -> bool {
        self.predicates
            .iter()
            .all(|predicate| predicate.matches(row.get(&predicate.column)))
    }
}

/// Query builder bound to one cache-db instance.
pub struct Query<'db, R: SourceRouter> {
    db: &'db mut CacheDb<R>,
    shape: QueryShape,
}

impl<'db, R: SourceRouter> Query<'db, R> {
    pub(crate) fn new(db: &'db mut CacheDb<R>) -> Self {
        Self {
            db,
            shape: QueryShape::new(),
        }
    }

    pub fn shape(&self) -> &QueryShape {
        &self.shape
    }

    /// Comma-separated column list; `*` selects every column.
    pub fn column(self, columns: &str) -> Self {
        self.columns(Projection::parse(columns))
    }

    pub fn columns(mut self, projection: Projection) -> Self {
        self.shape.projection = projection;
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.shape.predicates.push(predicate);
        self
    }

    pub fn where_eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Predicate::eq(column, value))
    }

    pub fn order_by(mut self, column: impl Into<String>, desc: bool) -> Self {
        self.shape
            .order_by
            .push(OrderBy::new(column, Direction::from_desc(desc)));
        self
    }

    pub fn order_by_primary(mut self, desc: bool) -> Self {
        let order = pagination::order_by_primary(self.db.primary_key_or_blank(), desc);
        self.shape.order_by.push(order);
        self
    }

    /// De-duplicate rows on the direct path. Cache paths resolve one row per
    /// primary key and ignore it.
    pub fn distinct(mut self) -> Self {
        self.shape.distinct = true;
        self
    }

    pub fn paginate(mut self, pagination: Pagination) -> Self {
        self.shape.pagination = Some(pagination);
        self
    }

    /// Offset pagination; see [`Pagination::by_limit`].
    pub fn paginate_by_limit(self, page: i64, per_page: i64) -> Self {
        self.paginate(Pagination::by_limit(page, per_page))
    }

    /// Keyset pagination; see [`Pagination::by_primary`].
    pub fn paginate_by_primary(self, last: i64, per_page: i64, desc: bool) -> Self {
        self.paginate(Pagination::by_primary(last, per_page, desc))
    }

    /// Cap the number of rows without an offset.
    pub fn limit(self, limit: u64) -> Self {
        self.paginate(Pagination::Offset { offset: 0, limit })
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn fetch_one(self) -> RowcacheResult<Option<Row>> {
        self.db.fetch_one_shaped(self.shape)
    }

    pub fn fetch_one_by_cache(self) -> RowcacheResult<Option<Row>> {
        self.db.fetch_one_by_cache_shaped(self.shape)
    }

    pub fn fetch_all(self) -> RowcacheResult<Vec<Row>> {
        self.db.fetch_all_shaped(self.shape)
    }

    /// One key scan, then every row through the cache in scan order.
    pub fn fetch_all_by_cache(self) -> RowcacheResult<Vec<Row>> {
        self.db.fetch_all_by_cache_shaped(self.shape)
    }

    pub fn fetch_by_primary(self, pk: impl Into<PrimaryKey>) -> RowcacheResult<Option<Row>> {
        self.db.fetch_by_primary_shaped(self.shape, &pk.into())
    }

    pub fn fetch_by_primary_cache(self, pk: impl Into<PrimaryKey>) -> RowcacheResult<Option<Row>> {
        self.db.fetch_by_primary_cache_shaped(self.shape, &pk.into())
    }

    /// Rows whose key is in `pks`, in source order.
    pub fn fetch_by_primary_arr(self, pks: &[PrimaryKey]) -> RowcacheResult<Vec<Row>> {
        self.db.fetch_by_primary_arr_shaped(self.shape, pks)
    }

    /// Rows for `pks` in input order, missing keys omitted.
    pub fn fetch_by_primary_arr_cache(self, pks: &[PrimaryKey]) -> RowcacheResult<Vec<Row>> {
        self.db.fetch_by_primary_arr_cache_shaped(self.shape, pks)
    }

    /// `(primary key, value_column)` for every matching row.
    pub fn fetch_pairs_by_cache(self, value_column: &str) -> RowcacheResult<Vec<(PrimaryKey, Value)>> {
        let keyed = self.db.fetch_keyed_by_cache_shaped(self.shape)?;
        Ok(pairs(keyed, value_column))
    }

    /// `(primary key, row)` for every matching row.
    pub fn fetch_assoc_by_cache(self) -> RowcacheResult<Vec<(PrimaryKey, Row)>> {
        self.db.fetch_keyed_by_cache_shaped(self.shape)
    }

    pub fn fetch_pairs_by_primary_arr_cache(
        self,
        pks: &[PrimaryKey],
        value_column: &str,
    ) -> RowcacheResult<Vec<(PrimaryKey, Value)>> {
        let keyed = self.db.fetch_keyed_by_primary_arr_cache_shaped(self.shape, pks)?;
        Ok(pairs(keyed, value_column))
    }

    pub fn fetch_assoc_by_primary_arr_cache(
        self,
        pks: &[PrimaryKey],
    ) -> RowcacheResult<Vec<(PrimaryKey, Row)>> {
        self.db.fetch_keyed_by_primary_arr_cache_shaped(self.shape, pks)
    }

    pub fn count(self) -> RowcacheResult<i64> {
        self.db.count_shaped(self.shape, Aggregate::Count)
    }

    /// Distinct rows under the current projection.
    pub fn count_distinct(self) -> RowcacheResult<i64> {
        self.db.count_shaped(self.shape, Aggregate::CountDistinctRows)
    }

    pub fn count_distinct_column(self, column: &str) -> RowcacheResult<i64> {
        self.db
            .count_shaped(self.shape, Aggregate::CountDistinct(column.to_string()))
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    pub fn update_by_primary_cache(
        self,
        pk: impl Into<PrimaryKey>,
        changes: Row,
    ) -> RowcacheResult<u64> {
        self.db.update_by_primary_cache_shaped(self.shape, pk.into(), changes)
    }

    /// Update every matching row, returning the affected-row count.
    pub fn update_by_cache(self, changes: Row) -> RowcacheResult<u64> {
        self.db.update_by_cache_shaped(self.shape, changes)
    }

    pub fn delete_by_primary_cache(self, pk: impl Into<PrimaryKey>) -> RowcacheResult<u64> {
        self.db.delete_by_primary_cache_shaped(self.shape, pk.into())
    }

    /// Delete every matching row, returning the affected-row count.
    pub fn delete_by_cache(self) -> RowcacheResult<u64> {
        self.db.delete_by_cache_shaped(self.shape)
    }
}

fn pairs(keyed: Vec<(PrimaryKey, Row)>, value_column: &str) -> Vec<(PrimaryKey, Value)> {
    keyed
        .into_iter()
        .filter_map(|(pk, mut row)| row.remove(value_column).map(|value| (pk, value)))
        .collect()
}
