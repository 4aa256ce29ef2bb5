//! Dense index over a [`Graph`] snapshot.
//!
//! Algorithms work on positions (`0..n`, the node's position in
//! `Graph::nodes`) instead of string ids. The index keeps a petgraph
//! [`DiGraph`] whose `NodeIndex` equals the node position, plus
//! deduplicated adjacency lists for the directed graph and its undirected
//! projection. Edges with a missing endpoint are skipped.

use std::collections::{BTreeMap, HashMap};

use petgraph::graph::{DiGraph, NodeIndex};

use super::Graph;

/// Read-only positional view of one graph snapshot.
#[derive(Debug, Clone)]
pub struct GraphIndex {
    graph: DiGraph<usize, usize>,
    positions: HashMap<String, usize>,
    /// `Graph::edges[i]` endpoints, `None` when an endpoint is missing.
    edge_endpoints: Vec<Option<(usize, usize)>>,
    successors: Vec<Vec<usize>>,
    predecessors: Vec<Vec<usize>>,
    neighbors: Vec<Vec<usize>>,
    undirected: Vec<(usize, usize, f64)>,
}

impl GraphIndex {
    pub fn build(source: &Graph) -> Self {
        let n = source.nodes.len();
        let mut graph = DiGraph::with_capacity(n, source.edges.len());
        let mut positions = HashMap::with_capacity(n);
        for (pos, node) in source.nodes.iter().enumerate() {
            graph.add_node(pos);
            positions.entry(node.id.clone()).or_insert(pos);
        }

        let mut successors = vec![Vec::new(); n];
        let mut predecessors = vec![Vec::new(); n];
        let mut neighbors = vec![Vec::new(); n];
        let mut pair_weights: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        let mut edge_endpoints = Vec::with_capacity(source.edges.len());

        for (edge_pos, edge) in source.edges.iter().enumerate() {
            let endpoints = match (positions.get(&edge.source), positions.get(&edge.target)) {
                (Some(&s), Some(&t)) => Some((s, t)),
                _ => None,
            };
            edge_endpoints.push(endpoints);
            let Some((s, t)) = endpoints else { continue };
            if s == t {
                continue;
            }
            graph.add_edge(NodeIndex::new(s), NodeIndex::new(t), edge_pos);
            successors[s].push(t);
            predecessors[t].push(s);
            neighbors[s].push(t);
            neighbors[t].push(s);
            *pair_weights.entry((s.min(t), s.max(t))).or_insert(0.0) += 1.0;
        }

        for list in successors
            .iter_mut()
            .chain(predecessors.iter_mut())
            .chain(neighbors.iter_mut())
        {
            list.sort_unstable();
            list.dedup();
        }

        let undirected = pair_weights
            .into_iter()
            .map(|((a, b), w)| (a, b, w))
            .collect();

        Self {
            graph,
            positions,
            edge_endpoints,
            successors,
            predecessors,
            neighbors,
            undirected,
        }
    }

    pub fn node_count(&self) -> usize {
        self.successors.len()
    }

    /// Number of distinct ordered pairs `(u, v)` with an edge `u -> v`.
    pub fn arc_count(&self) -> usize {
        self.successors.iter().map(Vec::len).sum()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn edge_endpoints(&self, edge_pos: usize) -> Option<(usize, usize)> {
        self.edge_endpoints.get(edge_pos).copied().flatten()
    }

    /// Distinct out-neighbours, sorted.
    pub fn successors(&self, node: usize) -> &[usize] {
        &self.successors[node]
    }

    /// Distinct in-neighbours, sorted.
    pub fn predecessors(&self, node: usize) -> &[usize] {
        &self.predecessors[node]
    }

    /// Distinct neighbours in the undirected projection, sorted.
    pub fn neighbors(&self, node: usize) -> &[usize] {
        &self.neighbors[node]
    }

    /// Whether `a` and `b` are joined by an edge in either direction.
    pub fn adjacent(&self, a: usize, b: usize) -> bool {
        self.neighbors[a].binary_search(&b).is_ok()
    }

    /// Undirected simple projection `(a, b, weight)` with `a < b`. Each
    /// directed edge between the pair contributes 1 to the weight.
    pub fn undirected_edges(&self) -> &[(usize, usize, f64)] {
        &self.undirected
    }

    /// The petgraph view. Node weights are positions, edge weights are
    /// positions in `Graph::edges`.
    pub fn digraph(&self) -> &DiGraph<usize, usize> {
        &self.graph
    }
}
