//! Embedding enumeration: a lazy backtracking search over one motif, and a
//! lazy depth-first composition across the motifs of a multi-MATCH query.

use std::collections::HashMap;

use common::{labels_of, AttrMap, EdgeKey, NodeId};

use crate::host::HostGraph;
use crate::motif::{labels_match, node_matches, properties_match, Motif, MotifEdge};
use crate::query::ast::Direction;

/// One concrete host edge used to realize a pattern edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeInstance {
    pub source: NodeId,
    pub target: NodeId,
    pub key: EdgeKey,
}

impl EdgeInstance {
    pub fn attrs<'g, G: HostGraph>(&self, host: &'g G) -> Option<&'g AttrMap> {
        host.edges_between(&self.source, &self.target)
            .into_iter()
            .find(|(key, _)| *key == self.key)
            .map(|(_, attrs)| attrs)
    }
}

/// How a pattern edge was realized inside one embedding.
#[derive(Debug, Clone)]
pub enum EdgeBinding {
    /// Plain one-hop edge: all qualifying parallel host edges between the
    /// bound endpoints at once.
    Single(Vec<EdgeInstance>),
    /// Ranged edge: the realized path, one qualifying parallel set per hop.
    Path(Vec<Vec<EdgeInstance>>),
    /// Zero-hop realization; the endpoints share one host node.
    Empty,
}

/// A total assignment of pattern variables to host elements.
#[derive(Debug, Clone, Default)]
pub struct Embedding {
    pub nodes: HashMap<String, NodeId>,
    pub edges: HashMap<String, EdgeBinding>,
}

/// Caller-supplied pinning of pattern variables to host nodes.
pub type Hint = HashMap<String, NodeId>;

/// Lazily enumerates the embeddings of one motif.
///
/// Pattern nodes are visited smallest-candidate-set first (ties broken by
/// connectivity to already-placed nodes); an explicit cursor stack drives
/// the backtracking so the iterator yields one embedding per pull.
pub struct MotifMatcher<'g, G: HostGraph> {
    host: &'g G,
    motif: &'g Motif,
    order: Vec<usize>,
    candidates: Vec<Vec<NodeId>>,
    cursor: Vec<usize>,
    binding: Vec<Option<NodeId>>,
    bound: Vec<bool>,
    edge_sets: Vec<Option<EdgeBinding>>,
    edge_owner: Vec<Option<usize>>,
    depth: usize,
    started: bool,
    exhausted: bool,
    pending: Vec<Embedding>,
}

impl<'g, G: HostGraph> MotifMatcher<'g, G> {
    pub fn new(host: &'g G, motif: &'g Motif, pins: &Hint) -> Self {
        let mut per_node: Vec<Vec<NodeId>> = Vec::with_capacity(motif.nodes.len());
        for node in &motif.nodes {
            let pinned = pins.get(&node.name);
            let mut list = Vec::new();
            match pinned {
                Some(id) => {
                    if let Some(attrs) = host.node_attrs(id) {
                        if node_matches(node, attrs) {
                            list.push(id.clone());
                        }
                    }
                }
                None => {
                    for id in host.node_ids() {
                        if let Some(attrs) = host.node_attrs(id) {
                            if node_matches(node, attrs) {
                                list.push(id.clone());
                            }
                        }
                    }
                }
            }
            per_node.push(list);
        }

        let order = search_order(motif, &per_node);
        let candidates = order.iter().map(|&n| per_node[n].clone()).collect();

        Self {
            host,
            motif,
            cursor: vec![0; order.len()],
            binding: vec![None; motif.nodes.len()],
            bound: vec![false; motif.nodes.len()],
            edge_sets: vec![None; motif.edges.len()],
            edge_owner: vec![None; motif.edges.len()],
            order,
            candidates,
            depth: 0,
            started: false,
            exhausted: false,
            pending: Vec::new(),
        }
    }

    /// Advances the backtracking search to the next complete node binding.
    fn advance(&mut self) -> bool {
        if self.exhausted {
            return false;
        }
        if self.started {
            // Resume: drop the deepest binding and try its next candidate.
            self.depth -= 1;
            self.unbind(self.depth);
        }
        self.started = true;

        loop {
            let pos = self.depth;
            let mut index = self.cursor[pos];
            let mut placed = false;
            while index < self.candidates[pos].len() {
                let candidate = self.candidates[pos][index].clone();
                index += 1;
                if self.try_bind(pos, candidate) {
                    placed = true;
                    break;
                }
            }
            self.cursor[pos] = index;

            if placed {
                self.depth += 1;
                if self.depth == self.order.len() {
                    return true;
                }
                self.cursor[self.depth] = 0;
            } else {
                self.cursor[pos] = 0;
                if pos == 0 {
                    self.exhausted = true;
                    return false;
                }
                self.depth -= 1;
                self.unbind(self.depth);
            }
        }
    }

    /// Attempts to bind the pattern node at search position `pos` to a host
    /// node, checking distinctness and every motif edge into the already
    /// bound region.
    fn try_bind(&mut self, pos: usize, candidate: NodeId) -> bool {
        let motif = self.motif;
        let node = self.order[pos];

        for other in 0..motif.nodes.len() {
            if other == node || !self.bound[other] {
                continue;
            }
            if self.binding[other].as_ref() == Some(&candidate)
                && !self.zero_hop_unifiable(node, other)
            {
                return false;
            }
        }

        self.binding[node] = Some(candidate.clone());
        self.bound[node] = true;

        let edge_indices: Vec<usize> = motif
            .edges_to_bound(node, &self.bound)
            .map(|(i, _)| i)
            .collect();
        for index in edge_indices {
            if self.edge_sets[index].is_some() {
                continue;
            }
            let edge = &motif.edges[index];
            let src = self.binding[edge.source].clone().expect("bound source");
            let dst = self.binding[edge.target].clone().expect("bound target");

            let set = if edge.source == edge.target {
                // Self-loop pattern edge: needs a qualifying host self-loop,
                // or a zero-hop range.
                if edge.hops.is_none() {
                    let found = qualifying_edges(self.host, &src, &dst, edge);
                    if found.is_empty() {
                        None
                    } else {
                        Some(EdgeBinding::Single(found))
                    }
                } else if edge.admits_zero_hops() {
                    Some(EdgeBinding::Empty)
                } else {
                    None
                }
            } else if src == dst {
                if edge.admits_zero_hops() {
                    Some(EdgeBinding::Empty)
                } else {
                    None
                }
            } else if edge.hops.is_none() {
                let found = qualifying_edges(self.host, &src, &dst, edge);
                if found.is_empty() {
                    None
                } else {
                    Some(EdgeBinding::Single(found))
                }
            } else {
                // Ranged edge between distinct endpoints: just check that
                // some path exists; realizations are expanded per embedding.
                let (lo, hi) = edge.path_bounds();
                if path_search(self.host, &src, &dst, edge, lo, hi, Some(1)).is_empty() {
                    None
                } else {
                    continue;
                }
            };

            match set {
                Some(binding) => {
                    self.edge_sets[index] = Some(binding);
                    self.edge_owner[index] = Some(pos);
                }
                None => {
                    self.release_edges(pos);
                    self.binding[node] = None;
                    self.bound[node] = false;
                    return false;
                }
            }
        }
        true
    }

    fn unbind(&mut self, pos: usize) {
        let node = self.order[pos];
        self.binding[node] = None;
        self.bound[node] = false;
        self.release_edges(pos);
    }

    fn release_edges(&mut self, pos: usize) {
        for index in 0..self.edge_sets.len() {
            if self.edge_owner[index] == Some(pos) {
                self.edge_sets[index] = None;
                self.edge_owner[index] = None;
            }
        }
    }

    /// Two pattern nodes may share a host node only when every motif edge
    /// between them can be realized by the empty path.
    fn zero_hop_unifiable(&self, a: usize, b: usize) -> bool {
        let mut connected = false;
        for edge in &self.motif.edges {
            let touches = (edge.source == a && edge.target == b)
                || (edge.source == b && edge.target == a);
            if touches {
                connected = true;
                if !edge.admits_zero_hops() {
                    return false;
                }
            }
        }
        connected
    }

    /// Expands the current complete node binding into embeddings: the
    /// cartesian product of path realizations over ranged edges, filtered so
    /// no host edge instance serves two pattern edges.
    fn expand_binding(&mut self) {
        let motif = self.motif;
        let mut base = Embedding::default();
        for (index, node) in motif.nodes.iter().enumerate() {
            base.nodes.insert(
                node.name.clone(),
                self.binding[index].clone().expect("complete binding"),
            );
        }

        let mut ranged: Vec<(&MotifEdge, Vec<Vec<Vec<EdgeInstance>>>)> = Vec::new();
        for (index, edge) in motif.edges.iter().enumerate() {
            match &self.edge_sets[index] {
                Some(binding) => {
                    if let Some(alias) = &edge.alias {
                        base.edges.insert(alias.clone(), binding.clone());
                    }
                }
                None => {
                    let src = self.binding[edge.source].clone().expect("bound");
                    let dst = self.binding[edge.target].clone().expect("bound");
                    let (lo, hi) = edge.path_bounds();
                    let paths = path_search(self.host, &src, &dst, edge, lo, hi, None);
                    ranged.push((edge, paths));
                }
            }
        }

        if ranged.is_empty() {
            self.pending.push(base);
            return;
        }

        let mut used: Vec<EdgeInstance> = Vec::new();
        let mut out = Vec::new();
        product_paths(&base, &ranged, 0, &mut used, &mut out);
        // Reverse so `pending.pop()` hands realizations back in order.
        out.reverse();
        self.pending = out;
    }
}

fn product_paths(
    partial: &Embedding,
    ranged: &[(&MotifEdge, Vec<Vec<Vec<EdgeInstance>>>)],
    level: usize,
    used: &mut Vec<EdgeInstance>,
    out: &mut Vec<Embedding>,
) {
    if level == ranged.len() {
        out.push(partial.clone());
        return;
    }
    let (edge, paths) = &ranged[level];
    for path in paths {
        let instances: Vec<&EdgeInstance> = path.iter().flatten().collect();
        if instances.iter().any(|i| used.contains(i)) {
            continue;
        }
        let mut next = partial.clone();
        if let Some(alias) = &edge.alias {
            next.edges
                .insert(alias.clone(), EdgeBinding::Path(path.clone()));
        }
        let added = instances.len();
        used.extend(instances.into_iter().cloned());
        product_paths(&next, ranged, level + 1, used, out);
        used.truncate(used.len() - added);
    }
}

impl<'g, G: HostGraph> Iterator for MotifMatcher<'g, G> {
    type Item = Embedding;

    fn next(&mut self) -> Option<Embedding> {
        loop {
            if let Some(embedding) = self.pending.pop() {
                return Some(embedding);
            }
            if !self.advance() {
                return None;
            }
            self.expand_binding();
        }
    }
}

/// Picks the node visit order: fewest candidates first, preferring nodes
/// with more motif edges into the already-placed prefix.
fn search_order(motif: &Motif, candidates: &[Vec<NodeId>]) -> Vec<usize> {
    let total = motif.nodes.len();
    let mut placed = vec![false; total];
    let mut order = Vec::with_capacity(total);
    while order.len() < total {
        let mut best: Option<(usize, usize, usize)> = None;
        for node in 0..total {
            if placed[node] {
                continue;
            }
            let connectivity = motif
                .edges
                .iter()
                .filter(|e| {
                    (e.source == node && placed[e.target])
                        || (e.target == node && placed[e.source])
                })
                .count();
            let rank = (candidates[node].len(), total - connectivity, node);
            if best.map_or(true, |b| rank < b) {
                best = Some(rank);
            }
        }
        let (_, _, node) = best.expect("unplaced node exists");
        placed[node] = true;
        order.push(node);
    }
    order
}

fn edge_admits(edge: &MotifEdge, attrs: &AttrMap) -> bool {
    labels_match(&edge.labels, &labels_of(attrs)) && properties_match(&edge.properties, attrs)
}

/// Direction as enforced on this host: undirected hosts accept any arrow.
fn effective_direction<G: HostGraph>(host: &G, edge: &MotifEdge) -> Direction {
    if host.is_directed() {
        edge.direction
    } else {
        Direction::Either
    }
}

/// All qualifying parallel host edges between two bound endpoints, honoring
/// the pattern edge's direction, labels, and properties.
fn qualifying_edges<G: HostGraph>(
    host: &G,
    src: &NodeId,
    dst: &NodeId,
    edge: &MotifEdge,
) -> Vec<EdgeInstance> {
    let direction = effective_direction(host, edge);
    let mut out = Vec::new();
    if !host.is_directed() {
        // Symmetric storage: one probe covers both orientations.
        for (key, attrs) in host.edges_between(src, dst) {
            if edge_admits(edge, attrs) {
                out.push(EdgeInstance {
                    source: src.clone(),
                    target: dst.clone(),
                    key,
                });
            }
        }
        return out;
    }
    if direction != Direction::Reverse {
        for (key, attrs) in host.edges_between(src, dst) {
            if edge_admits(edge, attrs) {
                out.push(EdgeInstance {
                    source: src.clone(),
                    target: dst.clone(),
                    key,
                });
            }
        }
    }
    if direction != Direction::Forward {
        for (key, attrs) in host.edges_between(dst, src) {
            if edge_admits(edge, attrs) {
                out.push(EdgeInstance {
                    source: dst.clone(),
                    target: src.clone(),
                    key,
                });
            }
        }
    }
    out
}

/// Qualifying hops leaving `current` for a ranged edge: the reachable next
/// node plus every qualifying parallel edge to it.
fn hop_neighbors<G: HostGraph>(
    host: &G,
    current: &NodeId,
    edge: &MotifEdge,
) -> Vec<(NodeId, Vec<EdgeInstance>)> {
    let direction = effective_direction(host, edge);
    let mut grouped: Vec<(NodeId, Vec<EdgeInstance>)> = Vec::new();
    let mut push = |endpoint: &NodeId, instance: EdgeInstance| {
        match grouped.iter_mut().find(|(n, _)| n == endpoint) {
            Some((_, list)) => list.push(instance),
            None => grouped.push((endpoint.clone(), vec![instance])),
        }
    };

    if direction != Direction::Reverse {
        for edge_ref in host.out_edges(current) {
            if edge_admits(edge, edge_ref.attrs) {
                push(
                    edge_ref.endpoint,
                    EdgeInstance {
                        source: current.clone(),
                        target: edge_ref.endpoint.clone(),
                        key: edge_ref.key,
                    },
                );
            }
        }
    }
    if direction != Direction::Forward && host.is_directed() {
        for edge_ref in host.in_edges(current) {
            if edge_admits(edge, edge_ref.attrs) {
                push(
                    edge_ref.endpoint,
                    EdgeInstance {
                        source: edge_ref.endpoint.clone(),
                        target: current.clone(),
                        key: edge_ref.key,
                    },
                );
            }
        }
    }
    grouped
}

/// Depth-limited search for simple paths from `src` to `dst` of length
/// within `[lo, hi]`. Each returned path is a per-hop list of qualifying
/// parallel edges. `cap` bounds how many paths are collected.
fn path_search<G: HostGraph>(
    host: &G,
    src: &NodeId,
    dst: &NodeId,
    edge: &MotifEdge,
    lo: u32,
    hi: Option<u32>,
    cap: Option<usize>,
) -> Vec<Vec<Vec<EdgeInstance>>> {
    let mut results = Vec::new();
    let mut visited = vec![src.clone()];
    let mut path = Vec::new();
    path_search_step(
        host,
        src,
        dst,
        edge,
        lo,
        hi,
        cap,
        &mut visited,
        &mut path,
        &mut results,
    );
    results
}

#[allow(clippy::too_many_arguments)]
fn path_search_step<G: HostGraph>(
    host: &G,
    current: &NodeId,
    dst: &NodeId,
    edge: &MotifEdge,
    lo: u32,
    hi: Option<u32>,
    cap: Option<usize>,
    visited: &mut Vec<NodeId>,
    path: &mut Vec<Vec<EdgeInstance>>,
    results: &mut Vec<Vec<Vec<EdgeInstance>>>,
) {
    if cap.map_or(false, |c| results.len() >= c) {
        return;
    }
    let depth = path.len() as u32;
    if hi.map_or(false, |h| depth >= h) {
        return;
    }
    for (next, instances) in hop_neighbors(host, current, edge) {
        if visited.contains(&next) {
            continue;
        }
        path.push(instances);
        if next == *dst {
            if depth + 1 >= lo {
                results.push(path.clone());
            }
            // A longer path back to dst would revisit it; stop here.
        } else {
            visited.push(next.clone());
            path_search_step(host, &next, dst, edge, lo, hi, cap, visited, path, results);
            visited.pop();
        }
        path.pop();
        if cap.map_or(false, |c| results.len() >= c) {
            return;
        }
    }
}

/// Lazy composition of all MATCH clauses under an optional hint list.
///
/// Motifs are matched depth-first; variables shared with earlier motifs are
/// pinned to their already-bound host nodes, which makes the shared-variable
/// join implicit. Hints OR across the list: each map runs the search pinned
/// to it, and embeddings already covered by an earlier map are skipped.
pub struct MatchStream<'g, G: HostGraph> {
    host: &'g G,
    motifs: &'g [Motif],
    hints: Vec<Hint>,
    hint_index: usize,
    levels: Vec<MotifMatcher<'g, G>>,
    prefixes: Vec<Embedding>,
}

impl<'g, G: HostGraph> MatchStream<'g, G> {
    pub fn new(host: &'g G, motifs: &'g [Motif], hints: &[Hint]) -> Self {
        let hints = if hints.is_empty() {
            vec![Hint::new()]
        } else {
            eliminate_supersets(hints)
        };
        Self {
            host,
            motifs,
            hints,
            hint_index: 0,
            levels: Vec::new(),
            prefixes: vec![Embedding::default()],
        }
    }

    fn push_level(&mut self) {
        let motifs = self.motifs;
        let level = self.levels.len();
        let prefix = &self.prefixes[level];
        let mut pins = self.hints[self.hint_index].clone();
        for node in &motifs[level].nodes {
            if let Some(id) = prefix.nodes.get(&node.name) {
                pins.insert(node.name.clone(), id.clone());
            }
        }
        self.levels
            .push(MotifMatcher::new(self.host, &motifs[level], &pins));
    }

    /// Whether an earlier hint map already covers this embedding.
    fn seen_under_earlier_hint(&self, embedding: &Embedding) -> bool {
        self.hints[..self.hint_index].iter().any(|hint| {
            hint.iter()
                .all(|(name, id)| embedding.nodes.get(name) == Some(id))
        })
    }
}

impl<'g, G: HostGraph> Iterator for MatchStream<'g, G> {
    type Item = Embedding;

    fn next(&mut self) -> Option<Embedding> {
        loop {
            if self.hint_index >= self.hints.len() {
                return None;
            }
            if self.levels.is_empty() {
                self.push_level();
            }
            let level = self.levels.len() - 1;
            match self.levels[level].next() {
                Some(found) => {
                    let mut merged = self.prefixes[level].clone();
                    merged.nodes.extend(found.nodes);
                    merged.edges.extend(found.edges);
                    if level + 1 == self.motifs.len() {
                        if !self.seen_under_earlier_hint(&merged) {
                            return Some(merged);
                        }
                    } else {
                        self.prefixes.truncate(level + 1);
                        self.prefixes.push(merged);
                        self.push_level();
                    }
                }
                None => {
                    self.levels.pop();
                    self.prefixes.truncate(self.levels.len().max(1));
                    if self.levels.is_empty() {
                        self.hint_index += 1;
                    }
                }
            }
        }
    }
}

/// Keeps only the most general hint maps: a map subsumed by a smaller one
/// would re-produce a subset of its embeddings.
fn eliminate_supersets(hints: &[Hint]) -> Vec<Hint> {
    let mut sorted: Vec<&Hint> = hints.iter().collect();
    sorted.sort_by_key(|h| h.len());
    let mut kept: Vec<Hint> = Vec::new();
    for hint in sorted {
        let subsumed = kept
            .iter()
            .any(|general| general.iter().all(|(k, v)| hint.get(k) == Some(v)));
        if !subsumed {
            kept.push(hint.clone());
        }
    }
    kept
}
