//! rowcache Core - Data Types
//!
//! Pure data structures shared by every rowcache crate: rows, primary keys,
//! table bindings, the query vocabulary spoken to relational sources, errors
//! and configuration. No caching logic lives here.

pub mod config;
pub mod error;
pub mod filter;
pub mod query;

pub use config::{CacheEndpoint, CacheSettings, RowcacheConfig, TableSettings};
pub use error::{CacheError, ConfigError, RowcacheError, RowcacheResult, SourceError};
pub use filter::{Comparison, Predicate};
pub use query::{Aggregate, Changes, Direction, OrderBy, Projection, SelectQuery, Window};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// PRIMARY KEYS
// ============================================================================

/// Value of a single-column primary key.
///
/// Integer and text keys are supported. Both render through [`fmt::Display`]
/// into the string that is mixed into cache keys, so `Int(7)` and
/// `Text("7")` address the same cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    Int(i64),
    Text(String),
}

impl PrimaryKey {
    /// Extract a primary key from a column value.
    ///
    /// Returns `None` for values that cannot identify a row (null, floats,
    /// booleans, arrays, objects).
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::Int),
            Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    /// Convert back into a column value.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(n) => Value::from(*n),
            Self::Text(s) => Value::from(s.as_str()),
        }
    }

    /// Integer form of the key, parsing text keys when they hold a number.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for PrimaryKey {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for PrimaryKey {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<u32> for PrimaryKey {
    fn from(value: u32) -> Self {
        Self::Int(value.into())
    }
}

impl From<&str> for PrimaryKey {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PrimaryKey {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

// ============================================================================
// ROWS
// ============================================================================

/// A single table row: column name to value.
///
/// Columns with no value are simply absent from the map. Serialization is
/// transparent, so a row encodes as a plain JSON object and decodes back to
/// exactly the same set of columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(BTreeMap<String, Value>);

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column setter.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(column.into(), value.into());
        self
    }

    /// Build a row from a JSON object. Returns `None` for any other JSON value.
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(map.into_iter().collect()),
            _ => None,
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(column.into(), value.into())
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.0.remove(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Primary key value held in `column`, if it is a usable key.
    pub fn primary_key(&self, column: &str) -> Option<PrimaryKey> {
        self.0.get(column).and_then(PrimaryKey::from_value)
    }

    /// Keep only the columns selected by `projection`.
    ///
    /// Requested columns that the row does not have are silently absent.
    pub fn project(self, projection: &Projection) -> Row {
        match projection {
            Projection::All => self,
            Projection::Columns(columns) => Row(self
                .0
                .into_iter()
                .filter(|(column, _)| columns.iter().any(|c| c == column))
                .collect()),
        }
    }

    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.0
    }
}

impl From<BTreeMap<String, Value>> for Row {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

// ============================================================================
// TABLE BINDING & CONNECTION IDENTITY
// ============================================================================

/// The logical table a cache-db instance operates on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableBinding {
    pub name: String,
    pub primary_key: String,
}

impl TableBinding {
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: primary_key.into(),
        }
    }

    /// Reject blank table or primary-key names.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::TableNotConfigured);
        }
        if self.primary_key.trim().is_empty() {
            return Err(ConfigError::PrimaryKeyNotConfigured);
        }
        Ok(())
    }
}

/// Identity of the relational connection, mixed into the keyspace prefix key
/// so that two databases with same-named tables never share cache entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionIdentity {
    pub host: String,
    pub port: u16,
    pub schema: String,
}

impl ConnectionIdentity {
    pub fn new(host: impl Into<String>, port: u16, schema: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            schema: schema.into(),
        }
    }
}

impl fmt::Display for ConnectionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host, self.port, self.schema)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_primary_key_from_value() {
        assert_eq!(PrimaryKey::from_value(&json!(42)), Some(PrimaryKey::Int(42)));
        assert_eq!(
            PrimaryKey::from_value(&json!("abc")),
            Some(PrimaryKey::Text("abc".to_string()))
        );
        assert_eq!(PrimaryKey::from_value(&json!(null)), None);
        assert_eq!(PrimaryKey::from_value(&json!(1.5)), None);
    }

    #[test]
    fn test_primary_key_display_matches_for_int_and_text() {
        assert_eq!(PrimaryKey::Int(7).to_string(), PrimaryKey::from("7").to_string());
        assert_eq!(PrimaryKey::from("7").as_int(), Some(7));
        assert_eq!(PrimaryKey::from("x").as_int(), None);
    }

    #[test]
    fn test_row_projection_drops_unknown_columns() {
        let row = Row::new().with("id", 1).with("city", "A").with("age", 30);
        let projected = row.project(&Projection::columns(["id", "city", "missing"]));
        assert_eq!(projected, Row::new().with("id", 1).with("city", "A"));
    }

    #[test]
    fn test_row_from_json_rejects_non_objects() {
        assert!(Row::from_json(json!([1, 2])).is_none());
        let row = Row::from_json(json!({"id": 1})).unwrap();
        assert_eq!(row.primary_key("id"), Some(PrimaryKey::Int(1)));
    }

    #[test]
    fn test_table_binding_validate() {
        assert!(TableBinding::new("user", "id").validate().is_ok());
        assert_eq!(
            TableBinding::new(" ", "id").validate(),
            Err(ConfigError::TableNotConfigured)
        );
        assert_eq!(
            TableBinding::new("user", "").validate(),
            Err(ConfigError::PrimaryKeyNotConfigured)
        );
    }

    proptest! {
        #[test]
        fn prop_row_json_keeps_absent_columns_absent(
            columns in proptest::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..8)
        ) {
            let row: Row = columns
                .into_iter()
                .map(|(k, v)| (k, Value::from(v)))
                .collect();
            let encoded = serde_json::to_string(&row).unwrap();
            let decoded: Row = serde_json::from_str(&encoded).unwrap();
            prop_assert_eq!(decoded.len(), row.len());
            prop_assert!(!encoded.contains("null"));
            prop_assert_eq!(decoded, row);
        }
    }
}
