//! Offset and keyset pagination.

use rowcache_core::{Direction, OrderBy, Predicate, SelectQuery, Window};
use serde_json::Value;

/// Page selection for a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// Classic page/per-page window.
    Offset { offset: u64, limit: u64 },
    /// Rows strictly past `last` on the primary key, in `direction`.
    ///
    /// Stable while rows are inserted or deleted at the tail, which offset
    /// windows over a mutating table are not.
    Keyset {
        last: i64,
        limit: Option<u64>,
        direction: Direction,
    },
}

impl Pagination {
    /// `page` floors to 1 and `per_page` to 0. A zero `per_page` selects no
    /// rows.
    pub fn by_limit(page: i64, per_page: i64) -> Self {
        let page = page.max(1) as u64;
        let per_page = per_page.max(0) as u64;
        Self::Offset {
            offset: (page - 1).saturating_mul(per_page),
            limit: per_page,
        }
    }

    /// `last <= 0` starts from the first page. `per_page <= 0` means no
    /// limit.
    pub fn by_primary(last: i64, per_page: i64, desc: bool) -> Self {
        Self::Keyset {
            last,
            limit: (per_page > 0).then_some(per_page as u64),
            direction: Direction::from_desc(desc),
        }
    }

    pub fn window(&self) -> Window {
        match *self {
            Self::Offset { offset, limit } => Window::Offset { offset, limit },
            Self::Keyset { limit: Some(limit), .. } => Window::Limit(limit),
            Self::Keyset { limit: None, .. } => Window::All,
        }
    }

    /// Apply to `query`, keyed on `primary_key` for keyset mode.
    pub fn apply(&self, query: SelectQuery, primary_key: &str) -> SelectQuery {
        let query = query.window(self.window());
        match *self {
            Self::Offset { .. } => query,
            Self::Keyset {
                last, direction, ..
            } => {
                let query = if last > 0 {
                    let bound = Value::from(last);
                    query.filter(match direction {
                        Direction::Desc => Predicate::lt(primary_key, bound),
                        Direction::Asc => Predicate::gt(primary_key, bound),
                    })
                } else {
                    query
                };
                query.order(OrderBy::new(primary_key, direction))
            }
        }
    }
}

/// Order-by on the primary key.
pub fn order_by_primary(primary_key: &str, desc: bool) -> OrderBy {
    OrderBy::new(primary_key, Direction::from_desc(desc))
}
