//! Shared attribute types and helpers for graph elements.

use std::collections::{BTreeSet, HashMap};

use crate::value::Value;

/// Mapping from attribute name to value, as stored on a host node or edge.
pub type AttrMap = HashMap<String, Value>;

/// Reserved attribute holding an element's label set.
pub const LABELS_ATTR: &str = "__labels__";

/// Extracts the label set from an attribute map.
///
/// Labels live under [`LABELS_ATTR`] as a list of strings; an absent or
/// malformed entry means the empty set.
pub fn labels_of(attrs: &AttrMap) -> BTreeSet<String> {
    match attrs.get(LABELS_ATTR) {
        Some(Value::List(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                _ => None,
            })
            .collect(),
        Some(Value::String(single)) => BTreeSet::from([single.clone()]),
        _ => BTreeSet::new(),
    }
}

/// The primary label of an element: the smallest member of its label set.
pub fn primary_label(attrs: &AttrMap) -> Option<String> {
    labels_of(attrs).into_iter().next()
}
