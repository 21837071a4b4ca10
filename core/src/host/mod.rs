use common::{AttrMap, EdgeKey, NodeId};

pub mod memory;

pub use memory::MemoryGraph;

/// One host edge as seen from a node: the far endpoint, the key
/// disambiguating parallel edges, and the edge's attributes.
#[derive(Debug, Clone, Copy)]
pub struct EdgeRef<'a> {
    pub endpoint: &'a NodeId,
    pub key: EdgeKey,
    pub attrs: &'a AttrMap,
}

/// Capability surface the engine requires from a host graph.
///
/// Implementations are read-only snapshots for the duration of a query. The
/// engine never mutates through this trait and assumes enumeration order is
/// stable between calls within one query.
pub trait HostGraph {
    /// All node ids, in a deterministic order.
    fn node_ids(&self) -> Box<dyn Iterator<Item = &NodeId> + '_>;

    /// Attribute map of a node, `None` for unknown ids.
    fn node_attrs(&self, id: &NodeId) -> Option<&AttrMap>;

    /// Edges leaving `id`. On an undirected host this is every incident
    /// edge, identical to [`HostGraph::in_edges`].
    fn out_edges<'a>(&'a self, id: &NodeId) -> Box<dyn Iterator<Item = EdgeRef<'a>> + 'a>;

    /// Edges arriving at `id`.
    fn in_edges<'a>(&'a self, id: &NodeId) -> Box<dyn Iterator<Item = EdgeRef<'a>> + 'a>;

    /// All parallel edges for the ordered pair `(a, b)`; symmetric on an
    /// undirected host. Keys are `0` unless the host is a multigraph.
    fn edges_between<'a>(&'a self, a: &NodeId, b: &NodeId) -> Vec<(EdgeKey, &'a AttrMap)>;

    fn is_directed(&self) -> bool;

    fn is_multigraph(&self) -> bool;

    fn contains_node(&self, id: &NodeId) -> bool {
        self.node_attrs(id).is_some()
    }

    fn node_count(&self) -> usize {
        self.node_ids().count()
    }
}
