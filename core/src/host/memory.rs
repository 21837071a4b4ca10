use std::collections::HashMap;

use common::{AttrMap, EdgeKey, NodeId};

use super::{EdgeRef, HostGraph};

/// Insertion-ordered in-memory host graph.
///
/// Covers all four shape combinations the engine understands: directed or
/// undirected, simple or multi. Adding an edge creates missing endpoints
/// with empty attributes, so small fixtures build from edges alone.
pub struct MemoryGraph {
    directed: bool,
    multi: bool,
    order: Vec<NodeId>,
    attrs: HashMap<NodeId, AttrMap>,
    adjacency: HashMap<NodeId, Adjacency>,
    edges: HashMap<(NodeId, NodeId), Vec<AttrMap>>,
}

#[derive(Default)]
struct Adjacency {
    out: Vec<(NodeId, EdgeKey)>,
    inc: Vec<(NodeId, EdgeKey)>,
}

impl MemoryGraph {
    pub fn new(directed: bool, multi: bool) -> Self {
        Self {
            directed,
            multi,
            order: Vec::new(),
            attrs: HashMap::new(),
            adjacency: HashMap::new(),
            edges: HashMap::new(),
        }
    }

    pub fn directed() -> Self {
        Self::new(true, false)
    }

    pub fn undirected() -> Self {
        Self::new(false, false)
    }

    pub fn multi_directed() -> Self {
        Self::new(true, true)
    }

    pub fn multi_undirected() -> Self {
        Self::new(false, true)
    }

    /// Inserts a node, merging attributes into any existing entry.
    pub fn add_node(&mut self, id: impl Into<NodeId>, attrs: AttrMap) {
        let id = id.into();
        match self.attrs.get_mut(&id) {
            Some(existing) => existing.extend(attrs),
            None => {
                self.order.push(id.clone());
                self.attrs.insert(id.clone(), attrs);
                self.adjacency.insert(id, Adjacency::default());
            }
        }
    }

    /// Inserts an edge and returns its key.
    ///
    /// On a multigraph every call appends a new parallel edge; on a simple
    /// graph a repeated pair merges attributes into the existing edge (key
    /// stays 0). Undirected pairs are stored under their canonical order.
    pub fn add_edge(
        &mut self,
        a: impl Into<NodeId>,
        b: impl Into<NodeId>,
        attrs: AttrMap,
    ) -> EdgeKey {
        let a = a.into();
        let b = b.into();
        self.ensure_node(&a);
        self.ensure_node(&b);
        let (src, dst) = self.canonical_pair(a, b);

        let slots = self.edges.entry((src.clone(), dst.clone())).or_default();
        if !self.multi && !slots.is_empty() {
            slots[0].extend(attrs);
            return 0;
        }
        let key = slots.len() as EdgeKey;
        slots.push(attrs);

        let fwd = self.adjacency.entry(src.clone()).or_default();
        fwd.out.push((dst.clone(), key));
        let rev = self.adjacency.entry(dst.clone()).or_default();
        rev.inc.push((src, key));
        key
    }

    fn ensure_node(&mut self, id: &NodeId) {
        if !self.attrs.contains_key(id) {
            self.order.push(id.clone());
            self.attrs.insert(id.clone(), AttrMap::new());
            self.adjacency.insert(id.clone(), Adjacency::default());
        }
    }

    fn canonical_pair(&self, a: NodeId, b: NodeId) -> (NodeId, NodeId) {
        if self.directed || a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    fn edge_attrs(&self, src: &NodeId, dst: &NodeId, key: EdgeKey) -> &AttrMap {
        &self.edges[&(src.clone(), dst.clone())][key as usize]
    }

    fn incident<'a>(
        &'a self,
        id: &NodeId,
        incoming: bool,
    ) -> Box<dyn Iterator<Item = EdgeRef<'a>> + 'a> {
        let Some((id, adj)) = self.adjacency.get_key_value(id) else {
            return Box::new(std::iter::empty());
        };
        let out = adj.out.iter().map(move |(other, key)| EdgeRef {
            endpoint: other,
            key: *key,
            attrs: self.edge_attrs(id, other, *key),
        });
        let inc = adj.inc.iter().map(move |(other, key)| EdgeRef {
            endpoint: other,
            key: *key,
            attrs: self.edge_attrs(other, id, *key),
        });
        if self.directed {
            if incoming {
                Box::new(inc)
            } else {
                Box::new(out)
            }
        } else {
            // Undirected: both stored orientations are incident.
            Box::new(out.chain(inc))
        }
    }
}

impl HostGraph for MemoryGraph {
    fn node_ids(&self) -> Box<dyn Iterator<Item = &NodeId> + '_> {
        Box::new(self.order.iter())
    }

    fn node_attrs(&self, id: &NodeId) -> Option<&AttrMap> {
        self.attrs.get(id)
    }

    fn out_edges<'a>(&'a self, id: &NodeId) -> Box<dyn Iterator<Item = EdgeRef<'a>> + 'a> {
        self.incident(id, false)
    }

    fn in_edges<'a>(&'a self, id: &NodeId) -> Box<dyn Iterator<Item = EdgeRef<'a>> + 'a> {
        self.incident(id, true)
    }

    fn edges_between<'a>(&'a self, a: &NodeId, b: &NodeId) -> Vec<(EdgeKey, &'a AttrMap)> {
        let key = if self.directed || a <= b {
            (a.clone(), b.clone())
        } else {
            (b.clone(), a.clone())
        };
        match self.edges.get(&key) {
            Some(slots) => slots
                .iter()
                .enumerate()
                .map(|(i, attrs)| (i as EdgeKey, attrs))
                .collect(),
            None => Vec::new(),
        }
    }

    fn is_directed(&self) -> bool {
        self.directed
    }

    fn is_multigraph(&self) -> bool {
        self.multi
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Value;

    fn attrs(pairs: &[(&str, Value)]) -> AttrMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn add_edge_creates_endpoints() {
        let mut g = MemoryGraph::directed();
        g.add_edge("y", "z", AttrMap::new());
        assert!(g.contains_node(&"y".into()));
        assert!(g.contains_node(&"z".into()));
        assert_eq!(g.node_count(), 2);
    }

    #[test]
    fn parallel_edges_get_fresh_keys() {
        let mut g = MemoryGraph::multi_directed();
        assert_eq!(g.add_edge("a", "b", attrs(&[("amount", Value::Integer(12))])), 0);
        assert_eq!(g.add_edge("a", "b", attrs(&[("amount", Value::Integer(40))])), 1);
        let between = g.edges_between(&"a".into(), &"b".into());
        assert_eq!(between.len(), 2);
    }

    #[test]
    fn simple_graph_merges_repeated_pairs() {
        let mut g = MemoryGraph::directed();
        g.add_edge("a", "b", attrs(&[("w", Value::Integer(1))]));
        assert_eq!(g.add_edge("a", "b", attrs(&[("v", Value::Integer(2))])), 0);
        let between = g.edges_between(&"a".into(), &"b".into());
        assert_eq!(between.len(), 1);
        assert_eq!(between[0].1.len(), 2);
    }

    #[test]
    fn undirected_edges_are_symmetric() {
        let mut g = MemoryGraph::undirected();
        g.add_edge("x", "y", attrs(&[("foo", Value::from("bar"))]));
        assert_eq!(g.edges_between(&"y".into(), &"x".into()).len(), 1);
        assert_eq!(g.out_edges(&"y".into()).count(), 1);
        assert_eq!(g.in_edges(&"y".into()).count(), 1);
    }

    #[test]
    fn directed_adjacency_separates_in_and_out() {
        let mut g = MemoryGraph::directed();
        g.add_edge("x", "y", AttrMap::new());
        assert_eq!(g.out_edges(&"x".into()).count(), 1);
        assert_eq!(g.in_edges(&"x".into()).count(), 0);
        assert_eq!(g.in_edges(&"y".into()).count(), 1);
    }
}
