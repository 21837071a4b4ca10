use crate::error::EngineError;
use crate::host::HostGraph;
use crate::matcher::Hint;
use crate::pipeline::{self, ColumnarTable};
use crate::query::parse_query;

/// The query façade: owns a host graph and evaluates Cypher queries
/// against it.
///
/// ```
/// use common::{AttrMap, Value};
/// use grandcypher_core::{GrandCypher, MemoryGraph};
///
/// let mut host = MemoryGraph::directed();
/// host.add_node("a", AttrMap::from([("name".to_string(), Value::from("Alice"))]));
/// host.add_node("b", AttrMap::from([("name".to_string(), Value::from("Bob"))]));
/// host.add_edge("a", "b", AttrMap::new());
///
/// let engine = GrandCypher::new(host);
/// let table = engine.run("MATCH (x)-[]->(y) RETURN x.name").unwrap();
/// assert_eq!(table.get("x.name"), Some([Value::from("Alice")].as_slice()));
/// ```
pub struct GrandCypher<G: HostGraph> {
    host: G,
}

impl<G: HostGraph> GrandCypher<G> {
    pub fn new(host: G) -> Self {
        Self { host }
    }

    pub fn host(&self) -> &G {
        &self.host
    }

    /// Runs one query and returns its columnar result.
    pub fn run(&self, query: &str) -> Result<ColumnarTable, EngineError> {
        self.run_with_hints(query, &[])
    }

    /// Runs one query restricted by hints: each map pins pattern variables
    /// to host nodes, and the maps OR together.
    pub fn run_with_hints(
        &self,
        query: &str,
        hints: &[Hint],
    ) -> Result<ColumnarTable, EngineError> {
        let parsed = parse_query(query)?;
        pipeline::execute(&self.host, &parsed, hints)
    }
}
