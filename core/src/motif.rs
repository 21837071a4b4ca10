//! Compiled form of a MATCH clause: pattern nodes and edges indexed by
//! small integers so partial embeddings are plain arrays on the search's
//! hot path.

use std::collections::{BTreeSet, HashMap};

use common::{labels_of, values_equal, AttrMap, Value};

use crate::query::ast::{Direction, HopRange, LabelExpr, MatchClause};

#[derive(Debug, Clone)]
pub struct MotifNode {
    pub name: String,
    pub anonymous: bool,
    pub labels: Option<LabelExpr>,
    pub properties: HashMap<String, Value>,
}

#[derive(Debug, Clone)]
pub struct MotifEdge {
    pub source: usize,
    pub target: usize,
    pub alias: Option<String>,
    pub labels: Option<LabelExpr>,
    pub properties: HashMap<String, Value>,
    pub direction: Direction,
    /// `None` for a plain one-hop edge.
    pub hops: Option<HopRange>,
}

impl MotifEdge {
    /// Whether this edge may be realized by the empty path, unifying its
    /// endpoints onto one host node.
    pub fn admits_zero_hops(&self) -> bool {
        self.hops.map_or(false, |range| range.min == 0)
    }

    /// Hop bounds for path realizations of length >= 1.
    pub fn path_bounds(&self) -> (u32, Option<u32>) {
        match self.hops {
            Some(range) => (range.min.max(1), range.max),
            None => (1, Some(1)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Motif {
    pub nodes: Vec<MotifNode>,
    pub edges: Vec<MotifEdge>,
    names: HashMap<String, usize>,
}

impl Motif {
    /// Compiles one MATCH clause. A variable repeated along the chain folds
    /// back onto its existing pattern node with its constraints merged;
    /// anonymous nodes draw fresh names from `anon`.
    pub fn compile(clause: &MatchClause, anon: &mut usize) -> Self {
        let mut motif = Motif {
            nodes: Vec::new(),
            edges: Vec::new(),
            names: HashMap::new(),
        };

        let mut chain = Vec::with_capacity(clause.nodes.len());
        for pattern in &clause.nodes {
            let index = match &pattern.alias {
                Some(alias) => match motif.names.get(alias).copied() {
                    Some(existing) => {
                        motif.merge_constraints(existing, pattern.labels.clone(), &pattern.properties);
                        existing
                    }
                    None => motif.push_node(
                        alias.clone(),
                        false,
                        pattern.labels.clone(),
                        pattern.properties.clone(),
                    ),
                },
                None => {
                    let name = format!("__anon_{anon}");
                    *anon += 1;
                    motif.push_node(name, true, pattern.labels.clone(), pattern.properties.clone())
                }
            };
            chain.push(index);
        }

        for (i, edge) in clause.edges.iter().enumerate() {
            motif.edges.push(MotifEdge {
                source: chain[i],
                target: chain[i + 1],
                alias: edge.alias.clone(),
                labels: edge.labels.clone(),
                properties: edge.properties.clone(),
                direction: edge.direction,
                hops: edge.hops,
            });
        }

        motif
    }

    fn push_node(
        &mut self,
        name: String,
        anonymous: bool,
        labels: Option<LabelExpr>,
        properties: HashMap<String, Value>,
    ) -> usize {
        let index = self.nodes.len();
        self.names.insert(name.clone(), index);
        self.nodes.push(MotifNode {
            name,
            anonymous,
            labels,
            properties,
        });
        index
    }

    fn merge_constraints(
        &mut self,
        index: usize,
        labels: Option<LabelExpr>,
        properties: &HashMap<String, Value>,
    ) {
        let node = &mut self.nodes[index];
        for (key, value) in properties {
            node.properties.insert(key.clone(), value.clone());
        }
        node.labels = match (node.labels.take(), labels) {
            (None, incoming) => incoming,
            (existing @ Some(_), None) => existing,
            (Some(a), Some(b)) => {
                // Conjunction of two disjunctions: cross the alternatives.
                let alternatives = a
                    .alternatives
                    .iter()
                    .flat_map(|left| {
                        b.alternatives.iter().map(move |right| {
                            let mut atoms = left.clone();
                            atoms.extend(right.iter().cloned());
                            atoms
                        })
                    })
                    .collect();
                Some(LabelExpr { alternatives })
            }
        };
    }

    pub fn node_index(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.nodes
            .iter()
            .filter(|n| !n.anonymous)
            .map(|n| n.name.as_str())
            .chain(self.edges.iter().filter_map(|e| e.alias.as_deref()))
    }

    /// Edges incident to `node` whose far endpoint is in `bound`.
    pub fn edges_to_bound<'a>(
        &'a self,
        node: usize,
        bound: &'a [bool],
    ) -> impl Iterator<Item = (usize, &'a MotifEdge)> {
        self.edges.iter().enumerate().filter(move |(_, edge)| {
            (edge.source == node && bound[edge.target])
                || (edge.target == node && bound[edge.source])
                || (edge.source == node && edge.target == node)
        })
    }
}

/// True when `labels` accepts the given host label set: some alternative's
/// atoms are all present. No expression means no constraint.
pub fn labels_match(labels: &Option<LabelExpr>, host_labels: &BTreeSet<String>) -> bool {
    match labels {
        None => true,
        Some(expr) => expr
            .alternatives
            .iter()
            .any(|atoms| atoms.iter().all(|atom| host_labels.contains(atom))),
    }
}

/// True when every pattern property is satisfied by the host attributes.
///
/// A pattern value of null matches a missing or explicitly-null attribute;
/// everything else requires definite equality.
pub fn properties_match(pattern: &HashMap<String, Value>, attrs: &AttrMap) -> bool {
    pattern.iter().all(|(key, expected)| {
        let actual = attrs.get(key).unwrap_or(&Value::Null);
        if expected.is_null() {
            return actual.is_null();
        }
        values_equal(expected, actual) == Some(true)
    })
}

/// Combined node admission test: labels and inline properties.
pub fn node_matches(node: &MotifNode, attrs: &AttrMap) -> bool {
    labels_match(&node.labels, &labels_of(attrs)) && properties_match(&node.properties, attrs)
}
