//! Projection and data-filter hooks.
//!
//! Reads pass through projection first, then the show hook, exactly once per
//! row whether the row came from the cache or the source. Writes pass through
//! the insert hook (or the update hook for updates) before reaching the
//! source. Hooks never run on the other path.

use std::fmt;
use std::sync::Arc;

use rowcache_core::{Projection, Row};

/// A row transform with single-row and row-sequence entry points.
///
/// Closures `Fn(Row) -> Row` implement this directly. Implement the trait by
/// hand to treat a sequence differently from its rows one by one.
pub trait RowFilter: Send + Sync {
    fn apply(&self, row: Row) -> Row;

    fn apply_all(&self, rows: Vec<Row>) -> Vec<Row> {
        rows.into_iter().map(|row| self.apply(row)).collect()
    }
}

impl<F> RowFilter for F
where
    F: Fn(Row) -> Row + Send + Sync,
{
    fn apply(&self, row: Row) -> Row {
        self(row)
    }
}

/// Optional hooks held for the lifetime of a cache-db instance.
#[derive(Clone, Default)]
pub struct FilterHooks {
    insert: Option<Arc<dyn RowFilter>>,
    update: Option<Arc<dyn RowFilter>>,
    show: Option<Arc<dyn RowFilter>>,
}

impl fmt::Debug for FilterHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterHooks")
            .field("insert", &self.insert.is_some())
            .field("update", &self.update.is_some())
            .field("show", &self.show.is_some())
            .finish()
    }
}

impl FilterHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_insert(&mut self, hook: Arc<dyn RowFilter>) {
        self.insert = Some(hook);
    }

    pub fn set_update(&mut self, hook: Arc<dyn RowFilter>) {
        self.update = Some(hook);
    }

    pub fn set_show(&mut self, hook: Arc<dyn RowFilter>) {
        self.show = Some(hook);
    }

    /// Insert or replace payload.
    pub fn on_insert(&self, row: Row) -> Row {
        match &self.insert {
            Some(hook) => hook.apply(row),
            None => row,
        }
    }

    pub fn on_insert_all(&self, rows: Vec<Row>) -> Vec<Row> {
        match &self.insert {
            Some(hook) => hook.apply_all(rows),
            None => rows,
        }
    }

    /// Update payload. Falls back to the insert hook when no update hook is
    /// registered.
    pub fn on_update(&self, row: Row) -> Row {
        match self.update.as_ref().or(self.insert.as_ref()) {
            Some(hook) => hook.apply(row),
            None => row,
        }
    }

    /// Project then show one row.
    pub fn show_one(&self, row: Row, projection: &Projection) -> Row {
        let row = row.project(projection);
        match &self.show {
            Some(hook) => hook.apply(row),
            None => row,
        }
    }

    /// Project then show a row sequence through the sequence entry point.
    pub fn show_all(&self, rows: Vec<Row>, projection: &Projection) -> Vec<Row> {
        let rows: Vec<Row> = if projection.is_all() {
            rows
        } else {
            rows.into_iter().map(|row| row.project(projection)).collect()
        };
        match &self.show {
            Some(hook) => hook.apply_all(rows),
            None => rows,
        }
    }
}
