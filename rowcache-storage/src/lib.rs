//! rowcache Storage - Collaborator Traits and In-Memory Implementations
//!
//! Defines the two capabilities the cache layer is built on:
//! - [`RelationalSource`]: the primary store for one or more tables
//! - [`KvCache`]: the key-value cache holding serialized rows
//!
//! Real deployments plug in their own relational driver; [`MemorySource`]
//! is a complete in-memory implementation used by tests and examples.

pub mod cache;

pub use cache::{connect, CacheStats, Expiration, InMemoryKvCache, KvCache};
#[cfg(feature = "redis")]
pub use cache::RedisKvCache;

use rowcache_core::filter::compare_values;
use rowcache_core::{
    Aggregate, Changes, ConnectionIdentity, Direction, PrimaryKey, Row, RowcacheResult,
    SelectQuery, SourceError,
};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

// ============================================================================
// RELATIONAL SOURCE TRAIT
// ============================================================================

/// Relational store capability.
///
/// Implementations own statement building, execution and connection
/// management. Every method is blocking. Errors are returned as-is to the
/// caller of the cache layer; a write that returns `Err` is treated as not
/// having taken effect.
pub trait RelationalSource: Send + Sync {
    /// Host, port and schema of the underlying connection.
    fn identity(&self) -> ConnectionIdentity;

    /// First row matching the query, if any.
    fn select_one(&self, table: &str, query: &SelectQuery) -> RowcacheResult<Option<Row>>;

    /// All rows matching the query, honoring order and window.
    fn select(&self, table: &str, query: &SelectQuery) -> RowcacheResult<Vec<Row>>;

    /// Evaluate a scalar aggregate over the rows matching the query.
    fn aggregate(&self, table: &str, aggregate: &Aggregate, query: &SelectQuery)
        -> RowcacheResult<i64>;

    /// Insert one row, returning its primary key.
    fn insert(&self, table: &str, row: &Row) -> RowcacheResult<PrimaryKey>;

    /// Insert several rows as one statement, returning their primary keys.
    fn insert_multi(&self, table: &str, rows: &[Row]) -> RowcacheResult<Vec<PrimaryKey>>;

    /// Insert or overwrite by primary key, returning the key.
    fn replace(&self, table: &str, row: &Row) -> RowcacheResult<PrimaryKey>;

    /// Apply `changes` to rows selected by the query's predicates and window.
    /// Returns the affected-row count.
    fn update(&self, table: &str, query: &SelectQuery, changes: &Changes) -> RowcacheResult<u64>;

    /// Delete rows selected by the query's predicates and window.
    /// Returns the affected-row count.
    fn delete(&self, table: &str, query: &SelectQuery) -> RowcacheResult<u64>;

    fn begin(&self) -> RowcacheResult<()>;

    fn commit(&self) -> RowcacheResult<()>;

    fn rollback(&self) -> RowcacheResult<()>;
}

impl<T: RelationalSource + ?Sized> RelationalSource for Arc<T> {
    fn identity(&self) -> ConnectionIdentity {
        (**self).identity()
    }

    fn select_one(&self, table: &str, query: &SelectQuery) -> RowcacheResult<Option<Row>> {
        (**self).select_one(table, query)
    }

    fn select(&self, table: &str, query: &SelectQuery) -> RowcacheResult<Vec<Row>> {
        (**self).select(table, query)
    }

    fn aggregate(
        &self,
        table: &str,
        aggregate: &Aggregate,
        query: &SelectQuery,
    ) -> RowcacheResult<i64> {
        (**self).aggregate(table, aggregate, query)
    }

    fn insert(&self, table: &str, row: &Row) -> RowcacheResult<PrimaryKey> {
        (**self).insert(table, row)
    }

    fn insert_multi(&self, table: &str, rows: &[Row]) -> RowcacheResult<Vec<PrimaryKey>> {
        (**self).insert_multi(table, rows)
    }

    fn replace(&self, table: &str, row: &Row) -> RowcacheResult<PrimaryKey> {
        (**self).replace(table, row)
    }

    fn update(&self, table: &str, query: &SelectQuery, changes: &Changes) -> RowcacheResult<u64> {
        (**self).update(table, query, changes)
    }

    fn delete(&self, table: &str, query: &SelectQuery) -> RowcacheResult<u64> {
        (**self).delete(table, query)
    }

    fn begin(&self) -> RowcacheResult<()> {
        (**self).begin()
    }

    fn commit(&self) -> RowcacheResult<()> {
        (**self).commit()
    }

    fn rollback(&self) -> RowcacheResult<()> {
        (**self).rollback()
    }
}

// ============================================================================
// MEMORY SOURCE
// ============================================================================

/// In-memory relational source.
///
/// Clones share the same tables, so a clone with a different identity
/// (see [`MemorySource::replica`]) behaves like a replica that never lags.
/// Transactions snapshot every table on `begin` and restore the snapshot on
/// `rollback`.
#[derive(Debug, Clone)]
pub struct MemorySource {
    identity: ConnectionIdentity,
    state: Arc<RwLock<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<String, MemoryTable>,
    snapshot: Option<HashMap<String, MemoryTable>>,
}

#[derive(Debug, Clone)]
struct MemoryTable {
    primary_key: String,
    rows: BTreeMap<PrimaryKey, Row>,
    next_id: i64,
}

impl MemoryTable {
    fn new(primary_key: String) -> Self {
        Self {
            primary_key,
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Primary keys of rows selected by the query, ordered and windowed.
    fn select_keys(&self, query: &SelectQuery) -> Vec<PrimaryKey> {
        let mut matching: Vec<(&PrimaryKey, &Row)> = self
            .rows
            .iter()
            .filter(|(_, row)| query.predicates.iter().all(|p| p.matches(row.get(&p.column))))
            .collect();

        if !query.order_by.is_empty() {
            matching.sort_by(|(_, a), (_, b)| {
                for order in &query.order_by {
                    let ordering = compare_values(
                        a.get(&order.column).unwrap_or(&Value::Null),
                        b.get(&order.column).unwrap_or(&Value::Null),
                    )
                    .unwrap_or(Ordering::Equal);
                    let ordering = match order.direction {
                        Direction::Asc => ordering,
                        Direction::Desc => ordering.reverse(),
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        let (skip, take) = query.window.bounds();
        matching
            .into_iter()
            .skip(skip)
            .take(take.unwrap_or(usize::MAX))
            .map(|(pk, _)| pk.clone())
            .collect()
    }

    fn select_rows(&self, query: &SelectQuery) -> Vec<Row> {
        let rows = self
            .select_keys(query)
            .into_iter()
            .filter_map(|pk| self.rows.get(&pk).cloned())
            .map(|row| row.project(&query.projection));
        if query.distinct {
            let mut distinct: Vec<Row> = Vec::new();
            for row in rows {
                if !distinct.contains(&row) {
                    distinct.push(row);
                }
            }
            distinct
        } else {
            rows.collect()
        }
    }

    /// Resolve the key for a new row, assigning the next id when absent.
    fn assign_key(&mut self, table: &str, row: &Row) -> RowcacheResult<(PrimaryKey, Row)> {
        let mut row = row.clone();
        let pk = match row.get(&self.primary_key).cloned() {
            Some(value) => PrimaryKey::from_value(&value).ok_or_else(|| SourceError::InsertFailed {
                table: table.to_string(),
                reason: format!("invalid primary key value {}", value),
            })?,
            None => {
                let pk = PrimaryKey::Int(self.next_id);
                row.insert(self.primary_key.clone(), pk.to_value());
                pk
            }
        };
        if let PrimaryKey::Int(n) = pk {
            self.next_id = self.next_id.max(n + 1);
        }
        Ok((pk, row))
    }

    fn insert(&mut self, table: &str, row: &Row) -> RowcacheResult<PrimaryKey> {
        let (pk, row) = self.assign_key(table, row)?;
        if self.rows.contains_key(&pk) {
            return Err(SourceError::InsertFailed {
                table: table.to_string(),
                reason: format!("duplicate primary key {}", pk),
            }
            .into());
        }
        self.rows.insert(pk.clone(), row);
        Ok(pk)
    }
}

impl MemorySource {
    pub fn new(identity: ConnectionIdentity) -> Self {
        Self {
            identity,
            state: Arc::new(RwLock::new(MemoryState::default())),
        }
    }

    /// A handle on the same tables under another connection identity.
    pub fn replica(&self, identity: ConnectionIdentity) -> Self {
        Self {
            identity,
            state: Arc::clone(&self.state),
        }
    }

    /// Create (or reset) a table keyed by `primary_key`.
    pub fn create_table(&self, name: &str, primary_key: &str) -> RowcacheResult<()> {
        let mut state = self.write()?;
        state
            .tables
            .insert(name.to_string(), MemoryTable::new(primary_key.to_string()));
        Ok(())
    }

    pub fn row_count(&self, table: &str) -> RowcacheResult<usize> {
        let state = self.read()?;
        Ok(table_ref(&state.tables, table)?.rows.len())
    }

    pub fn in_transaction(&self) -> bool {
        self.read().map(|s| s.snapshot.is_some()).unwrap_or(false)
    }

    fn read(&self) -> RowcacheResult<RwLockReadGuard<'_, MemoryState>> {
        self.state.read().map_err(|_| SourceError::LockPoisoned.into())
    }

    fn write(&self) -> RowcacheResult<RwLockWriteGuard<'_, MemoryState>> {
        self.state.write().map_err(|_| SourceError::LockPoisoned.into())
    }
}

fn table_ref<'a>(
    tables: &'a HashMap<String, MemoryTable>,
    table: &str,
) -> RowcacheResult<&'a MemoryTable> {
    tables.get(table).ok_or_else(|| {
        SourceError::TableNotFound {
            table: table.to_string(),
        }
        .into()
    })
}

fn table_mut<'a>(
    tables: &'a mut HashMap<String, MemoryTable>,
    table: &str,
) -> RowcacheResult<&'a mut MemoryTable> {
    tables.get_mut(table).ok_or_else(|| {
        SourceError::TableNotFound {
            table: table.to_string(),
        }
        .into()
    })
}

impl RelationalSource for MemorySource {
    fn identity(&self) -> ConnectionIdentity {
        self.identity.clone()
    }

    fn select_one(&self, table: &str, query: &SelectQuery) -> RowcacheResult<Option<Row>> {
        let state = self.read()?;
        let t = table_ref(&state.tables, table)?;
        Ok(t.select_rows(query).into_iter().next())
    }

    fn select(&self, table: &str, query: &SelectQuery) -> RowcacheResult<Vec<Row>> {
        let state = self.read()?;
        Ok(table_ref(&state.tables, table)?.select_rows(query))
    }

    fn aggregate(
        &self,
        table: &str,
        aggregate: &Aggregate,
        query: &SelectQuery,
    ) -> RowcacheResult<i64> {
        let state = self.read()?;
        let t = table_ref(&state.tables, table)?;
        let count = match aggregate {
            Aggregate::Count => t.select_keys(query).len(),
            Aggregate::CountDistinctRows => t.select_rows(&query.clone().distinct(true)).len(),
            Aggregate::CountDistinct(column) => t
                .select_keys(query)
                .iter()
                .filter_map(|pk| t.rows.get(pk).and_then(|row| row.get(column)))
                .filter(|value| !value.is_null())
                .map(|value| value.to_string())
                .collect::<HashSet<_>>()
                .len(),
        };
        Ok(count as i64)
    }

    fn insert(&self, table: &str, row: &Row) -> RowcacheResult<PrimaryKey> {
        let mut state = self.write()?;
        table_mut(&mut state.tables, table)?.insert(table, row)
    }

    fn insert_multi(&self, table: &str, rows: &[Row]) -> RowcacheResult<Vec<PrimaryKey>> {
        let mut state = self.write()?;
        let t = table_mut(&mut state.tables, table)?;
        // All rows or none.
        let mut staged = t.clone();
        let keys = rows
            .iter()
            .map(|row| staged.insert(table, row))
            .collect::<RowcacheResult<Vec<_>>>()?;
        *t = staged;
        Ok(keys)
    }

    fn replace(&self, table: &str, row: &Row) -> RowcacheResult<PrimaryKey> {
        let mut state = self.write()?;
        let t = table_mut(&mut state.tables, table)?;
        let (pk, row) = t.assign_key(table, row)?;
        t.rows.insert(pk.clone(), row);
        Ok(pk)
    }

    fn update(&self, table: &str, query: &SelectQuery, changes: &Changes) -> RowcacheResult<u64> {
        let mut state = self.write()?;
        let t = table_mut(&mut state.tables, table)?;
        let keys = t.select_keys(query);

        let mut updated = Vec::with_capacity(keys.len());
        for pk in keys {
            let Some(current) = t.rows.get(&pk) else {
                continue;
            };
            let mut row = current.clone();
            for (column, value) in changes.set.iter() {
                if *column == t.primary_key && PrimaryKey::from_value(value).as_ref() != Some(&pk) {
                    return Err(SourceError::UpdateFailed {
                        table: table.to_string(),
                        reason: "primary key is immutable".to_string(),
                    }
                    .into());
                }
                row.insert(column.clone(), value.clone());
            }
            for (column, by) in &changes.increments {
                let base = match row.get(column) {
                    None | Some(Value::Null) => 0,
                    Some(value) => value.as_i64().ok_or_else(|| SourceError::UpdateFailed {
                        table: table.to_string(),
                        reason: format!("column {} is not an integer", column),
                    })?,
                };
                let value = base.checked_add(*by).ok_or_else(|| SourceError::UpdateFailed {
                    table: table.to_string(),
                    reason: format!("column {} overflows", column),
                })?;
                row.insert(column.clone(), value);
            }
            updated.push((pk, row));
        }

        let affected = updated.len() as u64;
        t.rows.extend(updated);
        Ok(affected)
    }

    fn delete(&self, table: &str, query: &SelectQuery) -> RowcacheResult<u64> {
        let mut state = self.write()?;
        let t = table_mut(&mut state.tables, table)?;
        let keys = t.select_keys(query);
        for pk in &keys {
            t.rows.remove(pk);
        }
        Ok(keys.len() as u64)
    }

    fn begin(&self) -> RowcacheResult<()> {
        let mut state = self.write()?;
        if state.snapshot.is_some() {
            return Err(SourceError::TransactionFailed {
                reason: "transaction already active".to_string(),
            }
            .into());
        }
        state.snapshot = Some(state.tables.clone());
        Ok(())
    }

    fn commit(&self) -> RowcacheResult<()> {
        let mut state = self.write()?;
        state
            .snapshot
            .take()
            .map(|_| ())
            .ok_or_else(|| {
                SourceError::TransactionFailed {
                    reason: "no active transaction".to_string(),
                }
                .into()
            })
    }

    fn rollback(&self) -> RowcacheResult<()> {
        let mut state = self.write()?;
        let snapshot = state.snapshot.take().ok_or(SourceError::TransactionFailed {
            reason: "no active transaction".to_string(),
        })?;
        state.tables = snapshot;
        Ok(())
    }
}
