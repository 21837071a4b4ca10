use std::fmt;

use serde::{Serialize, Serializer};

/// Opaque identifier of a host-graph node.
///
/// Hosts hand the engine whatever ids they already use; integers and strings
/// cover the graph libraries this engine fronts. Integers order before
/// strings so mixed-id hosts still enumerate deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeId {
    Int(i64),
    Str(String),
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Int(i) => write!(f, "{i}"),
            NodeId::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for NodeId {
    fn from(value: i64) -> Self {
        NodeId::Int(value)
    }
}

impl From<i32> for NodeId {
    fn from(value: i32) -> Self {
        NodeId::Int(i64::from(value))
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        NodeId::Str(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        NodeId::Str(value)
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            NodeId::Int(i) => serializer.serialize_i64(*i),
            NodeId::Str(s) => serializer.serialize_str(s),
        }
    }
}

/// Disambiguates parallel edges between one ordered pair of host nodes.
///
/// Simple graphs use the constant 0; multigraph keys are caller-assigned and
/// preserved verbatim.
pub type EdgeKey = i64;

/// Coordinate of one parallel edge inside a per-edge mapping: the edge key
/// plus the edge's primary label (smallest member of its label set), if any.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeSlot {
    pub key: EdgeKey,
    pub label: Option<String>,
}

impl EdgeSlot {
    pub fn new(key: EdgeKey, label: Option<String>) -> Self {
        Self { key, label }
    }
}

impl fmt::Display for EdgeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{}:{}", self.key, label),
            None => write!(f, "{}", self.key),
        }
    }
}
