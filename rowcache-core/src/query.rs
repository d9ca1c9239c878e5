//! Query vocabulary spoken to relational sources.
//!
//! These types describe *what* to read or write; building and executing
//! statements is the relational source's job.

use crate::filter::Predicate;
use crate::Row;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Column selection for a read.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Projection {
    /// Every column (`*`).
    #[default]
    All,
    /// Only the listed columns, in request order.
    Columns(Vec<String>),
}

impl Projection {
    pub fn columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Columns(columns.into_iter().map(Into::into).collect())
    }

    /// Parse a comma-separated column list; `*` or an empty list selects all.
    pub fn parse(spec: &str) -> Self {
        let columns: Vec<String> = spec
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        if columns.is_empty() || columns.iter().any(|c| c == "*") {
            Self::All
        } else {
            Self::Columns(columns)
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    Asc,
    #[default]
    Desc,
}

impl Direction {
    pub fn from_desc(desc: bool) -> Self {
        if desc {
            Self::Desc
        } else {
            Self::Asc
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn new(column: impl Into<String>, direction: Direction) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }

    pub fn asc(column: impl Into<String>) -> Self {
        Self::new(column, Direction::Asc)
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self::new(column, Direction::Desc)
    }
}

/// Row window applied after filtering and ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Window {
    /// No limit.
    #[default]
    All,
    /// Skip `offset` rows, then return at most `limit`.
    Offset { offset: u64, limit: u64 },
    /// Return at most this many rows.
    Limit(u64),
}

impl Window {
    /// `(skip, take)` for an in-memory iterator.
    pub fn bounds(&self) -> (usize, Option<usize>) {
        match *self {
            Self::All => (0, None),
            Self::Offset { offset, limit } => (offset as usize, Some(limit as usize)),
            Self::Limit(limit) => (0, Some(limit as usize)),
        }
    }
}

/// A read against one table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SelectQuery {
    pub projection: Projection,
    /// Combined with logical AND.
    pub predicates: Vec<Predicate>,
    pub order_by: Vec<OrderBy>,
    pub window: Window,
    pub distinct: bool,
}

impl SelectQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn filters(mut self, predicates: impl IntoIterator<Item = Predicate>) -> Self {
        self.predicates.extend(predicates);
        self
    }

    pub fn order(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn window(mut self, window: Window) -> Self {
        self.window = window;
        self
    }

    pub fn distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }
}

/// Scalar aggregate over the rows a query selects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregate {
    /// `COUNT(1)`
    Count,
    /// Number of distinct rows under the query's projection.
    CountDistinctRows,
    /// `COUNT(DISTINCT column)`
    CountDistinct(String),
}

/// Column changes for an update statement.
///
/// Literal values in `set` pass through the write hooks; increments are
/// applied by the source relative to the stored value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Changes {
    pub set: Row,
    pub increments: BTreeMap<String, i64>,
}

impl Changes {
    pub fn set(row: Row) -> Self {
        Self {
            set: row,
            increments: BTreeMap::new(),
        }
    }

    /// Add `by` (negative to subtract) to `column`.
    pub fn increment(column: impl Into<String>, by: i64) -> Self {
        let mut increments = BTreeMap::new();
        increments.insert(column.into(), by);
        Self {
            set: Row::new(),
            increments,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.increments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_parse() {
        assert_eq!(Projection::parse("*"), Projection::All);
        assert_eq!(Projection::parse(""), Projection::All);
        assert_eq!(
            Projection::parse("id, city"),
            Projection::columns(["id", "city"])
        );
    }

    #[test]
    fn test_window_bounds() {
        assert_eq!(Window::All.bounds(), (0, None));
        assert_eq!(Window::Offset { offset: 20, limit: 10 }.bounds(), (20, Some(10)));
        assert_eq!(Window::Limit(5).bounds(), (0, Some(5)));
    }

    #[test]
    fn test_changes_constructors() {
        assert!(Changes::default().is_empty());
        let inc = Changes::increment("tag", -2);
        assert_eq!(inc.increments.get("tag"), Some(&-2));
        assert!(inc.set.is_empty());
    }
}
