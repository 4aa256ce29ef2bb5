//! Louvain community detection.
//!
//! Greedy modularity optimisation on a weighted undirected graph:
//!
//! 1. **Local moving**: visit nodes in index order, move each to the
//!    neighbouring community with the largest modularity gain
//! 2. **Aggregation**: collapse communities into super-nodes, keeping their
//!    internal weight as a self-loop
//! 3. **Repeat** until a local-moving phase makes no move
//!
//! Q = (1/2m) * Σij[Aij - γ(ki*kj)/(2m)] * δ(ci, cj)
//!
//! The run is deterministic. A node moves only when the gain strictly exceeds
//! that of staying put; among equally good foreign communities the lowest
//! community id wins. Final ids are numbered by first appearance in node order.

/// Upper bound on sweeps over the nodes within one local-moving phase.
const MAX_SWEEPS: usize = 100;
/// Gains closer than this are treated as equal.
const GAIN_EPSILON: f64 = 1e-12;

/// Partition found by [`louvain`].
#[derive(Debug, Clone, PartialEq)]
pub struct LouvainResult {
    /// Community id per node position.
    pub communities: Vec<usize>,
    pub modularity: f64,
    pub count: usize,
    pub largest: usize,
}

/// Weighted graph at one aggregation level.
struct Level {
    adjacency: Vec<Vec<(usize, f64)>>,
    /// Weight of edges folded inside each super-node.
    internal: Vec<f64>,
    degree: Vec<f64>,
}

impl Level {
    fn from_edges(n: usize, edges: &[(usize, usize, f64)]) -> Self {
        let mut adjacency = vec![Vec::new(); n];
        let mut degree = vec![0.0; n];
        for &(a, b, w) in edges {
            if a == b || a >= n || b >= n || w <= 0.0 {
                continue;
            }
            adjacency[a].push((b, w));
            adjacency[b].push((a, w));
            degree[a] += w;
            degree[b] += w;
        }
        Self {
            adjacency,
            internal: vec![0.0; n],
            degree,
        }
    }

    fn len(&self) -> usize {
        self.degree.len()
    }

    /// One local-moving phase. Returns the renumbered assignment and whether
    /// any node moved.
    fn local_moving(&self, resolution: f64, two_m: f64) -> (Vec<usize>, bool) {
        let n = self.len();
        let mut community: Vec<usize> = (0..n).collect();
        let mut totals = self.degree.clone();
        let mut weight_to = vec![0.0; n];
        let mut touched: Vec<usize> = Vec::new();
        let mut moved_any = false;

        for _ in 0..MAX_SWEEPS {
            let mut moved = false;
            for node in 0..n {
                let current = community[node];
                let k = self.degree[node];

                for &(nbr, w) in &self.adjacency[node] {
                    let c = community[nbr];
                    if weight_to[c] == 0.0 {
                        touched.push(c);
                    }
                    weight_to[c] += w;
                }

                totals[current] -= k;
                let gain = |c: usize, w: f64| w - resolution * totals[c] * k / two_m;

                let mut best = current;
                let mut best_gain = gain(current, weight_to[current]);
                touched.sort_unstable();
                for &c in &touched {
                    if c == current {
                        continue;
                    }
                    let g = gain(c, weight_to[c]);
                    if g > best_gain + GAIN_EPSILON {
                        best = c;
                        best_gain = g;
                    }
                }

                totals[best] += k;
                community[node] = best;
                if best != current {
                    moved = true;
                }

                for &c in &touched {
                    weight_to[c] = 0.0;
                }
                touched.clear();
            }
            if !moved {
                break;
            }
            moved_any = true;
        }

        (renumber(&community), moved_any)
    }

    fn aggregate(&self, assignment: &[usize], count: usize) -> Self {
        let mut internal = vec![0.0; count];
        let mut degree = vec![0.0; count];
        let mut between: Vec<std::collections::BTreeMap<usize, f64>> =
            vec![std::collections::BTreeMap::new(); count];

        for node in 0..self.len() {
            let c = assignment[node];
            internal[c] += self.internal[node];
            degree[c] += self.degree[node];
            for &(nbr, w) in &self.adjacency[node] {
                let d = assignment[nbr];
                if c == d {
                    // Each undirected edge is seen from both ends.
                    internal[c] += w / 2.0;
                } else {
                    *between[c].entry(d).or_insert(0.0) += w;
                }
            }
        }

        Self {
            adjacency: between.into_iter().map(|m| m.into_iter().collect()).collect(),
            internal,
            degree,
        }
    }
}

/// Renumber labels by first appearance.
fn renumber(labels: &[usize]) -> Vec<usize> {
    let mut mapping = std::collections::HashMap::new();
    labels
        .iter()
        .map(|&l| {
            let next = mapping.len();
            *mapping.entry(l).or_insert(next)
        })
        .collect()
}

/// Modularity of `assignment` over the undirected weighted edge list.
pub fn modularity(
    n: usize,
    edges: &[(usize, usize, f64)],
    assignment: &[usize],
    resolution: f64,
) -> f64 {
    let count = assignment.iter().copied().max().map_or(0, |m| m + 1);
    let mut internal = vec![0.0; count];
    let mut degree = vec![0.0; count];
    let mut m = 0.0;
    for &(a, b, w) in edges {
        if a == b || a >= n || b >= n || w <= 0.0 {
            continue;
        }
        m += w;
        degree[assignment[a]] += w;
        degree[assignment[b]] += w;
        if assignment[a] == assignment[b] {
            internal[assignment[a]] += w;
        }
    }
    if m == 0.0 {
        return 0.0;
    }
    (0..count)
        .map(|c| internal[c] / m - resolution * (degree[c] / (2.0 * m)).powi(2))
        .sum()
}

/// Run Louvain over `n` nodes and undirected weighted `edges`.
///
/// With no edges every node is its own community and modularity is 0.
pub fn louvain(n: usize, edges: &[(usize, usize, f64)], resolution: f64) -> LouvainResult {
    let mut level = Level::from_edges(n, edges);
    let two_m: f64 = level.degree.iter().sum();

    let mut assignment: Vec<usize> = (0..n).collect();
    if two_m > 0.0 {
        loop {
            let (partition, moved) = level.local_moving(resolution, two_m);
            if !moved {
                break;
            }
            for c in assignment.iter_mut() {
                *c = partition[*c];
            }
            let count = partition.iter().copied().max().map_or(0, |m| m + 1);
            level = level.aggregate(&partition, count);
        }
    }

    let communities = renumber(&assignment);
    let count = communities.iter().copied().max().map_or(0, |m| m + 1);
    let mut sizes = vec![0usize; count];
    for &c in &communities {
        sizes[c] += 1;
    }

    LouvainResult {
        modularity: modularity(n, edges, &communities, resolution),
        largest: sizes.iter().copied().max().unwrap_or(0),
        count,
        communities,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two triangles joined by a single bridge 2-3.
    fn barbell() -> Vec<(usize, usize, f64)> {
        vec![
            (0, 1, 1.0),
            (0, 2, 1.0),
            (1, 2, 1.0),
            (3, 4, 1.0),
            (3, 5, 1.0),
            (4, 5, 1.0),
            (2, 3, 1.0),
        ]
    }

    #[test]
    fn barbell_splits_into_two_triangles() {
        let result = louvain(6, &barbell(), 1.0);
        assert_eq!(result.count, 2);
        assert_eq!(result.largest, 3);
        assert_eq!(result.communities, vec![0, 0, 0, 1, 1, 1]);
        // 2 * (3/7 - (7/14)^2)
        assert!((result.modularity - 0.357_142_857).abs() < 1e-6);
    }

    #[test]
    fn no_edges_means_singletons() {
        let result = louvain(4, &[], 1.0);
        assert_eq!(result.communities, vec![0, 1, 2, 3]);
        assert_eq!(result.count, 4);
        assert_eq!(result.largest, 1);
        assert_eq!(result.modularity, 0.0);
    }

    #[test]
    fn empty_graph() {
        let result = louvain(0, &[], 1.0);
        assert!(result.communities.is_empty());
        assert_eq!(result.count, 0);
        assert_eq!(result.largest, 0);
    }

    #[test]
    fn isolated_node_keeps_own_community() {
        let result = louvain(7, &barbell(), 1.0);
        assert_eq!(result.communities[6], 2);
        assert_eq!(result.count, 3);
    }

    #[test]
    fn deterministic_across_runs() {
        let a = louvain(6, &barbell(), 1.0);
        let b = louvain(6, &barbell(), 1.0);
        assert_eq!(a, b);
    }

    #[test]
    fn modularity_of_single_community_is_zero() {
        let q = modularity(6, &barbell(), &[0; 6], 1.0);
        assert!(q.abs() < 1e-12);
    }
}
