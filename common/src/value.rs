//! The tagged value variant flowing through attribute maps, predicates, and
//! result columns, with the comparison semantics the query engine needs:
//! three-valued equality, numeric coercion, and a total sort order.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::id::EdgeSlot;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
    List(Vec<Value>),
    /// Attribute dictionary, as produced when a node variable is returned
    /// whole.
    Map(BTreeMap<String, Value>),
    /// Per-parallel-edge mapping produced for edge variables: one entry per
    /// qualifying host edge between the bound endpoints.
    EdgeMap(BTreeMap<EdgeSlot, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view used for coercing comparisons and arithmetic.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

/// Three-valued equality: any null operand makes the answer unknown.
///
/// Integers and floats compare by numeric value; other variants compare
/// strictly. Lists compare elementwise and inherit unknownness from their
/// elements.
pub fn values_equal(a: &Value, b: &Value) -> Option<bool> {
    if a.is_null() || b.is_null() {
        return None;
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x == y),
        (Value::Boolean(x), Value::Boolean(y)) => Some(x == y),
        (Value::Integer(x), Value::Integer(y)) => Some(x == y),
        (Value::Float(x), Value::Float(y)) => Some(x == y),
        (Value::Integer(x), Value::Float(y)) | (Value::Float(y), Value::Integer(x)) => {
            Some((*x as f64) == *y)
        }
        (Value::List(xs), Value::List(ys)) => {
            if xs.len() != ys.len() {
                return Some(false);
            }
            let mut unknown = false;
            for (x, y) in xs.iter().zip(ys) {
                match values_equal(x, y) {
                    Some(false) => return Some(false),
                    Some(true) => {}
                    None => unknown = true,
                }
            }
            if unknown {
                None
            } else {
                Some(true)
            }
        }
        (Value::Map(xs), Value::Map(ys)) => {
            if xs.len() != ys.len() || xs.keys().ne(ys.keys()) {
                return Some(false);
            }
            let mut unknown = false;
            for (x, y) in xs.values().zip(ys.values()) {
                match values_equal(x, y) {
                    Some(false) => return Some(false),
                    Some(true) => {}
                    None => unknown = true,
                }
            }
            if unknown {
                None
            } else {
                Some(true)
            }
        }
        _ => Some(false),
    }
}

/// Ordering comparison for `WHERE` operators: `None` when either side is
/// null or the operands are not comparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Some(x.cmp(y)),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
        (Value::Integer(x), Value::Float(y)) => (*x as f64).partial_cmp(y),
        (Value::Float(x), Value::Integer(y)) => x.partial_cmp(&(*y as f64)),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Boolean(x), Value::Boolean(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Total order for `ORDER BY`: nulls sort last, numerics naturally, strings
/// lexicographically, mixed types tie. An edge mapping sorts by its smallest
/// non-null entry value so rows over parallel edges order sensibly.
pub fn sort_cmp(a: &Value, b: &Value) -> Ordering {
    match (sort_key(a), sort_key(b)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
    }
}

fn sort_key(value: &Value) -> Option<&Value> {
    match value {
        Value::Null => None,
        Value::EdgeMap(entries) => entries
            .values()
            .filter(|v| !v.is_null())
            .min_by(|a, b| compare_values(a, b).unwrap_or(Ordering::Equal)),
        Value::Map(entries) => entries
            .values()
            .filter(|v| !v.is_null())
            .min_by(|a, b| compare_values(a, b).unwrap_or(Ordering::Equal)),
        other => Some(other),
    }
}

/// Whether a value sorts with the nulls (last, regardless of direction).
pub fn is_order_null(value: &Value) -> bool {
    sort_key(value).is_none()
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::String(s) => serializer.serialize_str(s),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::Null => serializer.serialize_unit(),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Value::EdgeMap(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (slot, value) in entries {
                    map.serialize_entry(&slot.to_string(), value)?;
                }
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_equality_is_unknown() {
        assert_eq!(values_equal(&Value::Null, &Value::Null), None);
        assert_eq!(values_equal(&Value::Integer(1), &Value::Null), None);
    }

    #[test]
    fn numeric_coercion() {
        assert_eq!(
            values_equal(&Value::Integer(3), &Value::Float(3.0)),
            Some(true)
        );
        assert_eq!(
            compare_values(&Value::Integer(2), &Value::Float(2.5)),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn nulls_sort_last() {
        let mut values = vec![Value::Null, Value::Integer(2), Value::Integer(1)];
        values.sort_by(sort_cmp);
        assert_eq!(
            values,
            vec![Value::Integer(1), Value::Integer(2), Value::Null]
        );
    }

    #[test]
    fn edge_map_sorts_by_smallest_entry() {
        let mut small = BTreeMap::new();
        small.insert(EdgeSlot::new(0, Some("paid".into())), Value::Integer(4));
        let mut large = BTreeMap::new();
        large.insert(EdgeSlot::new(0, Some("paid".into())), Value::Integer(9));
        large.insert(EdgeSlot::new(1, Some("paid".into())), Value::Null);
        assert_eq!(
            sort_cmp(&Value::EdgeMap(small), &Value::EdgeMap(large)),
            Ordering::Less
        );
    }

    #[test]
    fn mixed_types_tie() {
        assert_eq!(
            sort_cmp(&Value::Integer(1), &Value::String("a".into())),
            Ordering::Equal
        );
    }

    #[test]
    fn serializes_edge_map_with_slot_keys() {
        let mut entries = BTreeMap::new();
        entries.insert(EdgeSlot::new(0, Some("paid".into())), Value::Integer(12));
        let json = serde_json::to_string(&Value::EdgeMap(entries)).unwrap();
        assert_eq!(json, r#"{"0:paid":12}"#);
    }
}
