//! Metrics engine: centrality, PageRank, clustering, k-core, communities,
//! and structural balance over an immutable [`Graph`] snapshot.
//!
//! Every metric is computed independently. A metric that fails (returns an
//! error, produces a non-finite value, or panics) falls back to a neutral
//! default and is listed in [`Enrichment::failed_metrics`]; its siblings are
//! unaffected. Cancellation is the only condition that aborts the run.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use petgraph::algo::{connected_components, dijkstra};
use petgraph::graph::NodeIndex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::MetricsError;

use super::balance::{self, BalanceReport, DEFAULT_NEGATIVE_KEYWORDS};
use super::community::{self, LouvainResult};
use super::index::GraphIndex;
use super::{
    CommunityStructure, GlobalMetrics, Graph, InfluenceMetric, KeyInfluencer, NetworkHealth,
    NodeMetrics,
};

/// Result type for metric computations.
pub type MetricsResult<T> = std::result::Result<T, MetricsError>;

/// Betweenness above which a node is flagged as an information broker.
const BROKER_THRESHOLD: f64 = 0.1;
/// Incident cross-region edges above which a node is flagged as exposed.
const CROSS_REGION_THRESHOLD: usize = 3;

// ---------------------------------------------------------------------------
// Configuration & cancellation
// ---------------------------------------------------------------------------

/// Tunables for [`enrich`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// PageRank damping factor, in (0, 1).
    pub damping: f64,
    /// PageRank L1 convergence tolerance.
    pub tolerance: f64,
    /// PageRank iteration cap.
    pub max_iterations: usize,
    /// Largest node count for which betweenness is exact.
    pub exact_betweenness_limit: usize,
    /// Pivot sources sampled above the exact limit.
    pub betweenness_samples: usize,
    /// Nodes considered by the triad balance estimate.
    pub triad_sample_cap: usize,
    /// Louvain resolution (γ).
    pub resolution: f64,
    /// Nodes reported per influence metric.
    pub key_influencers: usize,
    /// Seed for pivot sampling.
    pub seed: u64,
    /// Case-insensitive substrings that mark an unsigned edge as negative.
    pub negative_keywords: Vec<String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            damping: 0.85,
            tolerance: 1e-6,
            max_iterations: 100,
            exact_betweenness_limit: 1500,
            betweenness_samples: 256,
            triad_sample_cap: 100,
            resolution: 1.0,
            key_influencers: 5,
            seed: 0x5eed,
            negative_keywords: DEFAULT_NEGATIVE_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

/// Cooperative cancellation flag shared with a running enrichment.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once [`cancel`](Self::cancel) has been called.
    pub fn check(&self) -> MetricsResult<()> {
        if self.is_cancelled() {
            Err(MetricsError::Cancelled)
        } else {
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Degree centrality
// ---------------------------------------------------------------------------

/// Distinct in- plus out-neighbours, normalised by `2(n - 1)`.
pub fn degree_centrality(index: &GraphIndex) -> Vec<f64> {
    let n = index.node_count();
    if n < 2 {
        return vec![0.0; n];
    }
    let scale = 2.0 * (n - 1) as f64;
    (0..n)
        .map(|v| (index.successors(v).len() + index.predecessors(v).len()) as f64 / scale)
        .collect()
}

// ---------------------------------------------------------------------------
// Closeness centrality
// ---------------------------------------------------------------------------

/// Closeness over outgoing edges, Wasserman–Faust form:
/// `(r / (n - 1)) * (r / Σd)` where `r` nodes are reachable at total distance `Σd`.
/// Nodes reaching nobody score 0.
pub fn closeness_centrality(index: &GraphIndex, cancel: &CancelToken) -> MetricsResult<Vec<f64>> {
    let n = index.node_count();
    if n < 2 {
        return Ok(vec![0.0; n]);
    }
    let scores: Vec<f64> = (0..n)
        .into_par_iter()
        .map(|source| {
            if cancel.is_cancelled() {
                return 0.0;
            }
            let dist = dijkstra(index.digraph(), NodeIndex::new(source), None, |_| 1usize);
            let (reached, total) = dist
                .iter()
                .filter(|&(v, _)| v.index() != source)
                .fold((0usize, 0usize), |(r, t), (_, d)| (r + 1, t + d));
            if total == 0 {
                0.0
            } else {
                let r = reached as f64;
                (r / (n - 1) as f64) * (r / total as f64)
            }
        })
        .collect();
    cancel.check()?;
    Ok(scores)
}

// ---------------------------------------------------------------------------
// Betweenness centrality
// ---------------------------------------------------------------------------

/// Directed betweenness (Brandes), normalised by `(n - 1)(n - 2)`.
///
/// Exact for graphs up to `exact_betweenness_limit` nodes. Larger graphs use
/// `betweenness_samples` seeded pivot sources and scale by `n / k`. The
/// returned flag reports whether the result is exact.
pub fn betweenness_centrality(
    index: &GraphIndex,
    config: &MetricsConfig,
    cancel: &CancelToken,
) -> MetricsResult<(Vec<f64>, bool)> {
    let n = index.node_count();
    if n < 3 {
        return Ok((vec![0.0; n], true));
    }

    let exact = n <= config.exact_betweenness_limit || config.betweenness_samples >= n;
    let sources: Vec<usize> = if exact {
        (0..n).collect()
    } else {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut picked = rand::seq::index::sample(&mut rng, n, config.betweenness_samples.max(1))
            .into_vec();
        picked.sort_unstable();
        picked
    };

    let totals = sources
        .par_iter()
        .map(|&s| {
            if cancel.is_cancelled() {
                vec![0.0; n]
            } else {
                brandes_dependencies(index, s)
            }
        })
        .reduce(
            || vec![0.0; n],
            |mut acc, delta| {
                for (a, d) in acc.iter_mut().zip(delta) {
                    *a += d;
                }
                acc
            },
        );
    cancel.check()?;

    let scale = (n as f64 / sources.len() as f64) / ((n - 1) * (n - 2)) as f64;
    Ok((totals.into_iter().map(|b| b * scale).collect(), exact))
}

/// Single-source dependency accumulation.
fn brandes_dependencies(index: &GraphIndex, source: usize) -> Vec<f64> {
    let n = index.node_count();
    let mut stack = Vec::with_capacity(n);
    let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut sigma = vec![0.0f64; n];
    let mut dist = vec![usize::MAX; n];
    let mut queue = VecDeque::new();

    sigma[source] = 1.0;
    dist[source] = 0;
    queue.push_back(source);

    while let Some(v) = queue.pop_front() {
        stack.push(v);
        for &w in index.successors(v) {
            if dist[w] == usize::MAX {
                dist[w] = dist[v] + 1;
                queue.push_back(w);
            }
            if dist[w] == dist[v] + 1 {
                sigma[w] += sigma[v];
                preds[w].push(v);
            }
        }
    }

    let mut delta = vec![0.0f64; n];
    while let Some(w) = stack.pop() {
        for &v in &preds[w] {
            delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
        }
    }
    delta[source] = 0.0;
    delta
}

// ---------------------------------------------------------------------------
// PageRank
// ---------------------------------------------------------------------------

/// Power-iteration PageRank. Dangling mass is spread uniformly so scores
/// always sum to 1.
pub fn pagerank(index: &GraphIndex, config: &MetricsConfig) -> Vec<f64> {
    let n = index.node_count();
    if n == 0 {
        return Vec::new();
    }
    let nf = n as f64;
    let d = config.damping;
    let out_degree: Vec<f64> = (0..n).map(|v| index.successors(v).len() as f64).collect();
    let mut rank = vec![1.0 / nf; n];

    for iteration in 0..config.max_iterations {
        let dangling: f64 = (0..n)
            .filter(|&v| out_degree[v] == 0.0)
            .map(|v| rank[v])
            .sum();
        let base = (1.0 - d) / nf + d * dangling / nf;
        let next: Vec<f64> = (0..n)
            .map(|v| {
                base + d
                    * index
                        .predecessors(v)
                        .iter()
                        .map(|&u| rank[u] / out_degree[u])
                        .sum::<f64>()
            })
            .collect();
        let delta: f64 = next.iter().zip(&rank).map(|(a, b)| (a - b).abs()).sum();
        rank = next;
        if delta < config.tolerance {
            tracing::trace!(iteration, delta, "pagerank converged");
            break;
        }
    }

    let total: f64 = rank.iter().sum();
    if total > 0.0 {
        rank.iter_mut().for_each(|r| *r /= total);
    }
    rank
}

// ---------------------------------------------------------------------------
// Clustering & k-core
// ---------------------------------------------------------------------------

/// Local clustering coefficient on the undirected projection; 0 below degree 2.
pub fn clustering_coefficients(index: &GraphIndex) -> Vec<f64> {
    (0..index.node_count())
        .map(|v| {
            let neighbors = index.neighbors(v);
            let k = neighbors.len();
            if k < 2 {
                return 0.0;
            }
            let links = closed_pairs(index, neighbors);
            (2 * links) as f64 / (k * (k - 1)) as f64
        })
        .collect()
}

/// Neighbour pairs that are themselves adjacent.
fn closed_pairs(index: &GraphIndex, neighbors: &[usize]) -> usize {
    let mut links = 0;
    for (i, &a) in neighbors.iter().enumerate() {
        for &b in &neighbors[i + 1..] {
            if index.adjacent(a, b) {
                links += 1;
            }
        }
    }
    links
}

/// Core number of each node (Batagelj–Zaversnik peeling).
pub fn k_core(index: &GraphIndex) -> Vec<usize> {
    let n = index.node_count();
    let mut degree: Vec<usize> = (0..n).map(|v| index.neighbors(v).len()).collect();
    let max_degree = degree.iter().copied().max().unwrap_or(0);

    // Bucket sort nodes by degree.
    let mut bin = vec![0usize; max_degree + 1];
    for &d in &degree {
        bin[d] += 1;
    }
    let mut start = 0;
    for slot in bin.iter_mut() {
        let count = *slot;
        *slot = start;
        start += count;
    }
    let mut order = vec![0usize; n];
    let mut position = vec![0usize; n];
    for v in 0..n {
        position[v] = bin[degree[v]];
        order[position[v]] = v;
        bin[degree[v]] += 1;
    }
    for d in (1..=max_degree).rev() {
        bin[d] = bin[d - 1];
    }
    if !bin.is_empty() {
        bin[0] = 0;
    }

    for i in 0..n {
        let v = order[i];
        for &u in index.neighbors(v) {
            if degree[u] > degree[v] {
                let du = degree[u];
                let pu = position[u];
                let pw = bin[du];
                let w = order[pw];
                if u != w {
                    order.swap(pu, pw);
                    position[u] = pw;
                    position[w] = pu;
                }
                bin[du] += 1;
                degree[u] -= 1;
            }
        }
    }
    degree
}

// ---------------------------------------------------------------------------
// Graph-wide metrics
// ---------------------------------------------------------------------------

/// Directed density, transitivity, and weak connectivity.
pub fn global_metrics(index: &GraphIndex) -> GlobalMetrics {
    let n = index.node_count();
    let density = if n > 1 {
        index.arc_count() as f64 / (n * (n - 1)) as f64
    } else {
        0.0
    };

    let (closed, triples) = (0..n).fold((0usize, 0usize), |(c, t), v| {
        let neighbors = index.neighbors(v);
        let k = neighbors.len();
        (c + closed_pairs(index, neighbors), t + k * k.saturating_sub(1) / 2)
    });
    // Each triangle closes three connected triples.
    let transitivity = if triples == 0 {
        0.0
    } else {
        closed as f64 / triples as f64
    };

    let components = if n == 0 {
        0
    } else {
        connected_components(index.digraph())
    };

    GlobalMetrics {
        density,
        transitivity,
        number_connected_components: components,
        is_connected: components == 1,
    }
}

/// Top `k` nodes by PageRank followed by the top `k` by betweenness.
pub fn key_influencers(
    graph: &Graph,
    pagerank: &[f64],
    betweenness: &[f64],
    k: usize,
) -> Vec<KeyInfluencer> {
    let top = |scores: &[f64], metric: InfluenceMetric| {
        let mut ranked: Vec<(usize, f64)> = scores.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked
            .into_iter()
            .take(k)
            .filter_map(|(pos, score)| {
                let node = graph.nodes.get(pos)?;
                Some(KeyInfluencer {
                    id: node.id.clone(),
                    label: node.label.clone(),
                    score,
                    metric,
                })
            })
            .collect::<Vec<_>>()
    };
    let mut influencers = top(pagerank, InfluenceMetric::Pagerank);
    influencers.extend(top(betweenness, InfluenceMetric::Betweenness));
    influencers
}

/// Structural exposure from closeness, betweenness, and cross-region ties.
pub fn network_health(closeness: f64, betweenness: f64, cross_region_edges: usize) -> NetworkHealth {
    let efficiency = closeness;
    let safety = (1.0 - betweenness).clamp(0.0, 1.0);
    let balance = if efficiency + safety > 0.0 {
        2.0 * efficiency * safety / (efficiency + safety)
    } else {
        0.0
    };

    let mut score: f64 = 0.0;
    let mut issues = Vec::new();
    if betweenness > BROKER_THRESHOLD {
        issues.push("critical information broker".to_string());
        score += 0.3;
    }
    if cross_region_edges > CROSS_REGION_THRESHOLD {
        issues.push("high cross-regional exposure".to_string());
        score += 0.2;
    }

    NetworkHealth {
        efficiency,
        safety,
        balance,
        vulnerability_score: score.min(1.0),
        identified_issues: issues,
    }
}

/// Incident edges per node whose two endpoints carry different region ids.
fn cross_region_counts(graph: &Graph, index: &GraphIndex) -> Vec<usize> {
    let mut counts = vec![0usize; index.node_count()];
    let region = |pos: usize| graph.nodes[pos].region.as_ref().map(|r| r.id.as_str());
    for edge_pos in 0..graph.edges.len() {
        let Some((s, t)) = index.edge_endpoints(edge_pos) else {
            continue;
        };
        if let (Some(a), Some(b)) = (region(s), region(t)) {
            if a != b {
                counts[s] += 1;
                counts[t] += 1;
            }
        }
    }
    counts
}

// ---------------------------------------------------------------------------
// Enrichment
// ---------------------------------------------------------------------------

/// Output of [`enrich`].
#[derive(Debug, Clone)]
pub struct Enrichment {
    pub graph: Graph,
    /// Metrics that fell back to defaults.
    pub failed_metrics: Vec<&'static str>,
    pub betweenness_exact: bool,
    pub balance: BalanceReport,
}

fn ensure_finite(metric: &'static str, values: Vec<f64>) -> MetricsResult<Vec<f64>> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(values)
    } else {
        Err(MetricsError::NonFinite { metric })
    }
}

/// Run one metric, substituting `fallback` on error or panic.
fn guarded<T>(
    metric: &'static str,
    failed: &mut Vec<&'static str>,
    fallback: impl FnOnce() -> T,
    compute: impl FnOnce() -> MetricsResult<T>,
) -> MetricsResult<T> {
    let err = match catch_unwind(AssertUnwindSafe(compute)) {
        Ok(Ok(value)) => return Ok(value),
        Ok(Err(MetricsError::Cancelled)) => return Err(MetricsError::Cancelled),
        Ok(Err(err)) => err,
        Err(panic) => MetricsError::Failed {
            metric,
            message: panic_message(&*panic),
        },
    };
    tracing::warn!(metric, error = %err, "metric failed, using default");
    failed.push(metric);
    Ok(fallback())
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic".to_string())
}

/// Compute every metric for `graph` and return an enriched copy.
///
/// Node metrics, edge weights (mean endpoint PageRank), resolved edge signs,
/// and the analytic meta fields are overwritten; content is untouched. The
/// result is stamped with the input's revision.
pub fn enrich(
    graph: &Graph,
    config: &MetricsConfig,
    cancel: &CancelToken,
) -> MetricsResult<Enrichment> {
    let mut out = graph.clone();
    let revision = graph.meta.revision;

    if graph.nodes.is_empty() {
        out.meta.global_metrics = Some(GlobalMetrics::default());
        out.meta.community_structure = Some(CommunityStructure::default());
        out.meta.key_influencers.clear();
        out.meta.global_balance = Some(1.0);
        out.meta.metrics_revision = Some(revision);
        return Ok(Enrichment {
            graph: out,
            failed_metrics: Vec::new(),
            betweenness_exact: true,
            balance: BalanceReport {
                balance: 1.0,
                triangles: 0,
                balanced: 0,
                sampled_nodes: 0,
            },
        });
    }

    cancel.check()?;
    let index = GraphIndex::build(graph);
    let n = index.node_count();
    let mut failed = Vec::new();

    let degree = guarded("degree", &mut failed, || vec![0.0; n], || {
        ensure_finite("degree", degree_centrality(&index))
    })?;
    let ranks = guarded("pagerank", &mut failed, || vec![1.0 / n as f64; n], || {
        ensure_finite("pagerank", pagerank(&index, config))
    })?;
    cancel.check()?;
    let closeness = guarded("closeness", &mut failed, || vec![0.0; n], || {
        ensure_finite("closeness", closeness_centrality(&index, cancel)?)
    })?;
    cancel.check()?;
    let (betweenness, exact) = guarded("betweenness", &mut failed, || (vec![0.0; n], false), || {
        let (values, exact) = betweenness_centrality(&index, config, cancel)?;
        Ok((ensure_finite("betweenness", values)?, exact))
    })?;
    cancel.check()?;
    let clustering = guarded("clustering", &mut failed, || vec![0.0; n], || {
        ensure_finite("clustering", clustering_coefficients(&index))
    })?;
    let cores = guarded("k_core", &mut failed, || vec![0; n], || Ok(k_core(&index)))?;
    cancel.check()?;
    let communities: Option<LouvainResult> = guarded("louvain", &mut failed, || None, || {
        let result = community::louvain(n, index.undirected_edges(), config.resolution);
        if result.modularity.is_finite() {
            Ok(Some(result))
        } else {
            Err(MetricsError::NonFinite { metric: "louvain" })
        }
    })?;
    let global = guarded("global", &mut failed, GlobalMetrics::default, || {
        Ok(global_metrics(&index))
    })?;
    cancel.check()?;

    let signs = balance::resolve_signs(graph, &config.negative_keywords);
    let balance = guarded(
        "balance",
        &mut failed,
        || BalanceReport {
            balance: 1.0,
            triangles: 0,
            balanced: 0,
            sampled_nodes: 0,
        },
        || Ok(balance::triadic_balance(graph, &signs, config.triad_sample_cap)),
    )?;

    let cross_region = cross_region_counts(graph, &index);
    for (pos, node) in out.nodes.iter_mut().enumerate() {
        node.metrics = NodeMetrics {
            degree_centrality: Some(degree[pos]),
            closeness: Some(closeness[pos]),
            betweenness: Some(betweenness[pos]),
            pagerank: Some(ranks[pos]),
            clustering: Some(clustering[pos]),
            community: communities.as_ref().map(|c| c.communities[pos]),
            k_core: Some(cores[pos]),
            network_health: Some(network_health(
                closeness[pos],
                betweenness[pos],
                cross_region[pos],
            )),
        };
    }

    for (pos, (edge, sign)) in out.edges.iter_mut().zip(&signs).enumerate() {
        edge.sign = Some(*sign);
        edge.weight = index
            .edge_endpoints(pos)
            .map(|(s, t)| (ranks[s] + ranks[t]) / 2.0);
    }

    out.meta.global_metrics = Some(global);
    out.meta.community_structure = Some(
        communities
            .as_ref()
            .map(|c| CommunityStructure {
                modularity: c.modularity,
                num_communities: c.count,
                largest_community_size: c.largest,
            })
            .unwrap_or_default(),
    );
    out.meta.key_influencers = key_influencers(graph, &ranks, &betweenness, config.key_influencers);
    out.meta.global_balance = Some(balance.balance);
    out.meta.metrics_revision = Some(revision);

    tracing::debug!(
        nodes = n,
        edges = graph.edges.len(),
        revision,
        failed = failed.len(),
        betweenness_exact = exact,
        "graph enriched"
    );

    Ok(Enrichment {
        graph: out,
        failed_metrics: failed,
        betweenness_exact: exact,
        balance,
    })
}
