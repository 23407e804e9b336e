//! Store-level query expressions
//!
//! Filters, ordering and paging that every `DocumentStore` understands.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;

use super::{Doc, ID_FIELD};

/// Filter operators
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    /// Equality
    Eq(Value),
    /// Not equal
    Ne(Value),
    /// Greater than
    Gt(Value),
    /// Greater than or equal
    Gte(Value),
    /// Less than
    Lt(Value),
    /// Less than or equal
    Lte(Value),
    /// String contains
    Contains(String),
    /// String starts with
    StartsWith(String),
    /// In array of values
    In(Vec<Value>),
    /// Field exists
    Exists(bool),
}

/// A single filter condition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self { field: field.to_string(), op: FilterOp::Eq(value.into()) }
    }

    pub fn ne(field: &str, value: impl Into<Value>) -> Self {
        Self { field: field.to_string(), op: FilterOp::Ne(value.into()) }
    }

    pub fn gt(field: &str, value: impl Into<Value>) -> Self {
        Self { field: field.to_string(), op: FilterOp::Gt(value.into()) }
    }

    pub fn gte(field: &str, value: impl Into<Value>) -> Self {
        Self { field: field.to_string(), op: FilterOp::Gte(value.into()) }
    }

    pub fn lt(field: &str, value: impl Into<Value>) -> Self {
        Self { field: field.to_string(), op: FilterOp::Lt(value.into()) }
    }

    pub fn lte(field: &str, value: impl Into<Value>) -> Self {
        Self { field: field.to_string(), op: FilterOp::Lte(value.into()) }
    }

    pub fn contains(field: &str, value: &str) -> Self {
        Self { field: field.to_string(), op: FilterOp::Contains(value.to_string()) }
    }

    pub fn is_in(field: &str, values: Vec<Value>) -> Self {
        Self { field: field.to_string(), op: FilterOp::In(values) }
    }

    pub fn exists(field: &str, should_exist: bool) -> Self {
        Self { field: field.to_string(), op: FilterOp::Exists(should_exist) }
    }

    /// Check if a document matches this filter
    pub fn matches(&self, doc: &Doc) -> bool {
        let value = doc.get(&self.field).filter(|v| !v.is_null());

        match (&self.op, value) {
            (FilterOp::Exists(should_exist), val) => val.is_some() == *should_exist,
            (FilterOp::Eq(Value::Null), None) => true,
            (FilterOp::Ne(Value::Null), val) => val.is_some(),
            (FilterOp::Ne(_), None) => true,
            (_, None) => false,
            (FilterOp::Eq(expected), Some(actual)) => values_equal(actual, expected),
            (FilterOp::Ne(expected), Some(actual)) => !values_equal(actual, expected),
            (FilterOp::Gt(expected), Some(actual)) => {
                compare_values(actual, expected) == Some(Ordering::Greater)
            }
            (FilterOp::Gte(expected), Some(actual)) => {
                matches!(compare_values(actual, expected), Some(Ordering::Greater | Ordering::Equal))
            }
            (FilterOp::Lt(expected), Some(actual)) => {
                compare_values(actual, expected) == Some(Ordering::Less)
            }
            (FilterOp::Lte(expected), Some(actual)) => {
                matches!(compare_values(actual, expected), Some(Ordering::Less | Ordering::Equal))
            }
            (FilterOp::Contains(substr), Some(Value::String(s))) => s.contains(substr.as_str()),
            (FilterOp::StartsWith(prefix), Some(Value::String(s))) => s.starts_with(prefix.as_str()),
            (FilterOp::In(values), Some(actual)) => values.iter().any(|v| values_equal(actual, v)),
            _ => false,
        }
    }
}

/// Compare two JSON values of the same scalar type
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64()?;
            let b = b.as_f64()?;
            a.partial_cmp(&b)
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Equality where `3` and `3.0` are the same number
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

/// Total order used for sorting: values of different types are ranked
/// null < bool < number < string < array < object
pub fn sort_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    rank(a)
        .cmp(&rank(b))
        .then_with(|| compare_values(a, b).unwrap_or(Ordering::Equal))
}

/// What a caller filters by: a plain equality map or a store expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Every `field: value` pair must be equal
    Fields(Map<String, Value>),
    /// Opaque store-level expression, all filters must match
    Expr(Vec<Filter>),
}

impl Predicate {
    /// Lower the predicate to the filter list the store evaluates
    pub fn into_filters(self) -> Vec<Filter> {
        match self {
            Predicate::Fields(map) => map
                .into_iter()
                .map(|(field, value)| Filter { field, op: FilterOp::Eq(value) })
                .collect(),
            Predicate::Expr(filters) => filters,
        }
    }
}

impl From<Map<String, Value>> for Predicate {
    fn from(map: Map<String, Value>) -> Self {
        Predicate::Fields(map)
    }
}

/// A JSON object becomes an equality map; any other value is matched against `id`.
impl From<Value> for Predicate {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Predicate::Fields(map),
            other => Predicate::Expr(vec![Filter::eq(ID_FIELD, other)]),
        }
    }
}

impl From<Filter> for Predicate {
    fn from(filter: Filter) -> Self {
        Predicate::Expr(vec![filter])
    }
}

impl From<Vec<Filter>> for Predicate {
    fn from(filters: Vec<Filter>) -> Self {
        Predicate::Expr(filters)
    }
}

/// Sort key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub field: String,
    #[serde(default)]
    pub desc: bool,
}

impl Order {
    pub fn asc(field: &str) -> Self {
        Self { field: field.to_string(), desc: false }
    }

    pub fn desc(field: &str) -> Self {
        Self { field: field.to_string(), desc: true }
    }
}

/// `"-field"` sorts descending, anything else ascending.
impl From<&str> for Order {
    fn from(field: &str) -> Self {
        match field.strip_prefix('-') {
            Some(rest) => Order::desc(rest),
            None => Order::asc(field),
        }
    }
}

impl From<String> for Order {
    fn from(field: String) -> Self {
        Order::from(field.as_str())
    }
}

/// Filters, ordering and paging for one table scan
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StoreQuery {
    /// All filters must match (AND)
    #[serde(default)]
    pub filters: Vec<Filter>,

    /// Sort keys, first key wins
    #[serde(default)]
    pub order_by: Vec<Order>,

    /// Skip results (for pagination)
    #[serde(default)]
    pub skip: usize,

    /// Limit results
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl StoreQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn skip(mut self, n: usize) -> Self {
        self.skip = n;
        self
    }

    pub fn matches(&self, doc: &Doc) -> bool {
        self.filters.iter().all(|f| f.matches(doc))
    }

    /// Apply the query to an in-memory list of documents
    pub fn apply(&self, docs: impl IntoIterator<Item = Doc>) -> Vec<Doc> {
        let mut results: Vec<Doc> = docs.into_iter().filter(|doc| self.matches(doc)).collect();

        if !self.order_by.is_empty() {
            results.sort_by(|a, b| {
                for order in &self.order_by {
                    let ordering = match (a.get(&order.field), b.get(&order.field)) {
                        (Some(a), Some(b)) => sort_values(a, b),
                        (Some(_), None) => Ordering::Less,
                        (None, Some(_)) => Ordering::Greater,
                        (None, None) => Ordering::Equal,
                    };
                    let ordering = if order.desc { ordering.reverse() } else { ordering };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        let results = results.into_iter().skip(self.skip);
        match self.limit {
            Some(n) => results.take(n).collect(),
            None => results.collect(),
        }
    }
}
