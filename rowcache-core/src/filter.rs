//! Row predicates
//!
//! A `Predicate` is a single column comparison. Query shapes carry a list of
//! predicates that relational sources combine with logical AND.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Comparison operator for a column predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    /// Equal to
    Eq,
    /// Not equal to
    Ne,
    /// Greater than
    Gt,
    /// Less than
    Lt,
    /// Greater than or equal
    Gte,
    /// Less than or equal
    Lte,
    /// Contains substring (for strings)
    Contains,
    /// In list of values
    In,
}

/// Column comparison applied to rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    /// Column to compare
    pub column: String,
    /// Operator to apply
    pub comparison: Comparison,
    /// Value to compare against; an array for `In`
    pub value: Value,
}

impl Predicate {
    pub fn new(column: impl Into<String>, comparison: Comparison, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            comparison,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, Comparison::Eq, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, Comparison::Lt, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, Comparison::Gt, value)
    }

    pub fn contains(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, Comparison::Contains, value)
    }

    pub fn is_in<I, V>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        Self::new(column, Comparison::In, Value::Array(values))
    }

    /// Evaluate against a column value. A missing column never matches.
    pub fn matches(&self, actual: Option<&Value>) -> bool {
        let Some(actual) = actual else {
            return false;
        };
        match self.comparison {
            Comparison::Eq => compare_values(actual, &self.value) == Some(Ordering::Equal),
            Comparison::Ne => compare_values(actual, &self.value) != Some(Ordering::Equal),
            Comparison::Gt => compare_values(actual, &self.value) == Some(Ordering::Greater),
            Comparison::Lt => compare_values(actual, &self.value) == Some(Ordering::Less),
            Comparison::Gte => matches!(
                compare_values(actual, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Comparison::Lte => matches!(
                compare_values(actual, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Comparison::Contains => match (actual, &self.value) {
                (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
                _ => false,
            },
            Comparison::In => match &self.value {
                Value::Array(candidates) => candidates
                    .iter()
                    .any(|candidate| compare_values(actual, candidate) == Some(Ordering::Equal)),
                _ => false,
            },
        }
    }
}

/// Order two column values the way a relational engine would for the types
/// it can compare: numbers numerically, strings lexically, booleans false
/// before true. Numeric strings compare equal to the matching number.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Number(x), Value::String(y)) => x.as_f64()?.partial_cmp(&y.trim().parse::<f64>().ok()?),
        (Value::String(x), Value::Number(y)) => x.trim().parse::<f64>().ok()?.partial_cmp(&y.as_f64()?),
        _ => None,
    }
}
