//! The Patch Reconciler: merge a normalized patch into a graph snapshot.
//!
//! Reconciliation is a pure function from `(graph, patch, resolutions)` to a
//! new graph plus a [`ReconcileReport`]. It never fails: bad entries, dangling
//! edges, self-loops and duplicate triples are dropped and counted.
//!
//! Order of work:
//! 1. normalize every entry, recording rejections
//! 2. fold new-id nodes onto existing nodes with the same label
//! 3. strip conflicting fields not resolved to the proposed value
//! 4. merge nodes field by field, creating unknown ids
//! 5. add edges whose endpoints exist and whose triple is new

use std::collections::{HashMap, HashSet};

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Serialize;
use tracing::debug;

use crate::graph::{Graph, RelationType, now_millis};
use crate::similarity::{SimilarityIndex, auto_max_distance};

use super::conflict::{detect_conflicts, strip_unaccepted};
use super::normalize::{normalize_edge, normalize_node};
use super::{Conflict, GraphPatch, NormalizedEdge, NormalizedNode, Resolutions};

/// Length of the random suffix of generated edge ids.
const EDGE_ID_SUFFIX: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Fold a new-id node onto an existing node whose normalized label is
    /// identical (and whose type matches, when the patch states one).
    pub resolve_exact_labels: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            resolve_exact_labels: true,
        }
    }
}

/// A patch node whose label is close to, but not the same as, an existing one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PossibleDuplicate {
    pub patch_id: String,
    pub patch_label: String,
    pub existing_id: String,
    pub existing_label: String,
    pub distance: usize,
}

/// What a reconciliation did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub nodes_created: usize,
    pub nodes_updated: usize,
    /// New-id patch nodes folded onto an existing node by label.
    pub nodes_resolved: usize,
    pub edges_added: usize,
    pub duplicate_edges: usize,
    pub dangling_edges: usize,
    pub self_loops: usize,
    /// Why each dropped entry was rejected.
    pub rejected: Vec<String>,
    pub conflicts_kept_existing: usize,
    pub conflicts_accepted: usize,
    pub possible_duplicates: Vec<PossibleDuplicate>,
    /// Patch id to existing id, for every resolved node.
    pub resolved_ids: HashMap<String, String>,
}

impl ReconcileReport {
    /// Dropped edges of every kind.
    pub fn edges_dropped(&self) -> usize {
        self.duplicate_edges + self.dangling_edges + self.self_loops
    }
}

/// Normalized entries ready to merge, plus what preparing them found.
#[derive(Debug, Clone, Default)]
pub struct PreparedPatch {
    pub nodes: Vec<NormalizedNode>,
    pub edges: Vec<NormalizedEdge>,
    pub report: ReconcileReport,
}

impl PreparedPatch {
    /// Conflicts this patch has with `graph`.
    pub fn conflicts(&self, graph: &Graph) -> Vec<Conflict> {
        detect_conflicts(graph, &self.nodes)
    }
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub graph: Graph,
    pub report: ReconcileReport,
    /// Whether any node or edge differs from the input graph.
    pub changed: bool,
}

// ---------------------------------------------------------------------------
// Preparation
// ---------------------------------------------------------------------------

/// Normalize `patch` against `graph` and apply entity resolution.
pub fn prepare(graph: &Graph, patch: &GraphPatch, options: &ReconcileOptions) -> PreparedPatch {
    let mut prepared = PreparedPatch::default();
    prepared
        .report
        .rejected
        .extend(patch.skipped.iter().map(ToString::to_string));

    for (index, raw) in patch.nodes.iter().enumerate() {
        match normalize_node(index, raw) {
            Ok(node) => prepared.nodes.push(node),
            Err(rejection) => {
                debug!(%rejection, "dropping patch node");
                prepared.report.rejected.push(rejection.to_string());
            }
        }
    }
    for (index, raw) in patch.edges.iter().enumerate() {
        match normalize_edge(index, raw) {
            Ok(edge) => prepared.edges.push(edge),
            Err(rejection) => {
                debug!(%rejection, "dropping patch edge");
                prepared.report.rejected.push(rejection.to_string());
            }
        }
    }

    resolve_entities(graph, &mut prepared, options);
    prepared
}

/// Fold new-id nodes onto existing nodes with an identical label and report
/// near matches.
fn resolve_entities(graph: &Graph, prepared: &mut PreparedPatch, options: &ReconcileOptions) {
    if graph.is_empty() {
        return;
    }
    let index = SimilarityIndex::from_nodes(&graph.nodes);
    let report = &mut prepared.report;

    for entry in &mut prepared.nodes {
        if graph.contains_node(&entry.id) {
            continue;
        }
        let Some(label) = entry.label.clone() else {
            continue;
        };

        let matches = index.find_similar(&label, auto_max_distance(&label));
        let exact = matches.iter().filter(|m| m.distance == 0).find(|m| {
            entry
                .node_type
                .is_none_or(|t| graph.node(&m.id).is_some_and(|n| n.node_type == t))
        });

        match exact {
            Some(found) if options.resolve_exact_labels => {
                debug!(patch_id = %entry.id, existing = %found.id, "resolved patch node by label");
                report
                    .resolved_ids
                    .insert(entry.id.clone(), found.id.clone());
                report.nodes_resolved += 1;
                entry.id = found.id.clone();
                // The existing label is canonical; a case variant is not a conflict.
                entry.label = None;
            }
            _ => {
                if let Some(near) = matches.first() {
                    report.possible_duplicates.push(PossibleDuplicate {
                        patch_id: entry.id.clone(),
                        patch_label: label.clone(),
                        existing_id: near.id.clone(),
                        existing_label: near.label.clone(),
                        distance: near.distance,
                    });
                }
            }
        }
    }

    if report.resolved_ids.is_empty() {
        return;
    }
    for edge in &mut prepared.edges {
        if let Some(id) = report.resolved_ids.get(&edge.source) {
            edge.source = id.clone();
        }
        if let Some(id) = report.resolved_ids.get(&edge.target) {
            edge.target = id.clone();
        }
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Merge `patch` into `graph`.
///
/// Conflicting fields are applied only when `resolutions` maps their key to
/// [`Resolution::Proposed`](super::Resolution::Proposed); everything else
/// keeps the existing value.
pub fn reconcile(
    graph: &Graph,
    patch: &GraphPatch,
    resolutions: &Resolutions,
    options: &ReconcileOptions,
) -> Reconciliation {
    let prepared = prepare(graph, patch, options);
    merge_prepared(graph, prepared, resolutions)
}

/// Merge already prepared entries.
pub fn merge_prepared(
    graph: &Graph,
    prepared: PreparedPatch,
    resolutions: &Resolutions,
) -> Reconciliation {
    let PreparedPatch {
        mut nodes,
        edges,
        mut report,
    } = prepared;

    let conflicts = detect_conflicts(graph, &nodes);
    if !conflicts.is_empty() {
        for entry in &mut nodes {
            let (kept, accepted) = strip_unaccepted(entry, &conflicts, resolutions);
            report.conflicts_kept_existing += kept;
            report.conflicts_accepted += accepted;
        }
    }

    let mut out = graph.clone();
    let mut position: HashMap<String, usize> = out
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.clone(), i))
        .collect();

    for entry in &nodes {
        match position.get(&entry.id) {
            Some(&pos) => {
                let before = out.nodes[pos].clone();
                entry.apply_to(&mut out.nodes[pos]);
                if out.nodes[pos] != before {
                    report.nodes_updated += 1;
                }
            }
            None => {
                position.insert(entry.id.clone(), out.nodes.len());
                out.nodes.push(entry.to_node());
                report.nodes_created += 1;
            }
        }
    }

    let mut triples: HashSet<(String, String, RelationType)> = out
        .edges
        .iter()
        .map(|e| (e.source.clone(), e.target.clone(), e.relation_type))
        .collect();
    let mut edge_ids: HashSet<String> = out.edges.iter().map(|e| e.id.clone()).collect();

    for edge in edges {
        if edge.source == edge.target {
            report.self_loops += 1;
            continue;
        }
        if !position.contains_key(&edge.source) || !position.contains_key(&edge.target) {
            debug!(source = %edge.source, target = %edge.target, "dropping dangling patch edge");
            report.dangling_edges += 1;
            continue;
        }
        if !triples.insert((edge.source.clone(), edge.target.clone(), edge.relation_type)) {
            report.duplicate_edges += 1;
            continue;
        }
        let id = match edge.id.clone() {
            Some(id) if !edge_ids.contains(&id) => id,
            _ => fresh_edge_id(&edge_ids),
        };
        edge_ids.insert(id.clone());
        out.edges.push(edge.into_edge(id));
        report.edges_added += 1;
    }

    let changed = report.nodes_created + report.nodes_updated + report.edges_added > 0;
    Reconciliation {
        graph: out,
        report,
        changed,
    }
}

/// `edge_<millis>_<9 lowercase alphanumerics>`, unused in `taken`.
fn fresh_edge_id(taken: &HashSet<String>) -> String {
    let mut rng = rand::thread_rng();
    loop {
        let suffix: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(EDGE_ID_SUFFIX)
            .map(|b| char::from(b).to_ascii_lowercase())
            .collect();
        let id = format!("edge_{}_{suffix}", now_millis());
        if !taken.contains(&id) {
            return id;
        }
    }
}
