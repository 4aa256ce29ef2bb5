//! Pure graph transforms.
//!
//! Each function takes a snapshot and returns a new [`Graph`]; the input is
//! never modified. Revision bookkeeping is left to the caller.

use std::collections::HashSet;

use serde::{Deserialize, Deserializer};

use crate::error::GraphError;

use super::{
    Certainty, Existence, Graph, GraphResult, NodeType, RegionInfo, RelationType, Role,
    SourceCitation, TemporalFact,
};

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Absorb `drop_id` into `keep_id`.
///
/// Empty content fields on the kept node are filled from the dropped one;
/// sources (by uri), existence records and roles are unioned. Edges of the
/// dropped node are rewired to the kept node, self-loops are removed, and a
/// rewired edge whose triple already exists is discarded.
pub fn merge_nodes(graph: &Graph, keep_id: &str, drop_id: &str) -> GraphResult<Graph> {
    if keep_id == drop_id {
        return Err(GraphError::SelfMerge {
            id: keep_id.to_string(),
        });
    }
    let dropped = graph
        .node(drop_id)
        .cloned()
        .ok_or_else(|| GraphError::NodeNotFound {
            id: drop_id.to_string(),
        })?;
    if !graph.contains_node(keep_id) {
        return Err(GraphError::NodeNotFound {
            id: keep_id.to_string(),
        });
    }

    let mut out = graph.clone();
    out.nodes.retain(|n| n.id != drop_id);
    if let Some(keep) = out.node_mut(keep_id) {
        if keep.description.as_deref().is_none_or(|d| d.trim().is_empty()) {
            keep.description = dropped.description;
        }
        if keep.validity.is_none() {
            keep.validity = dropped.validity;
        }
        if keep.region.is_none() {
            keep.region = dropped.region;
        }
        if keep.importance.is_none() {
            keep.importance = dropped.importance;
        }
        if keep.confidence_score.is_none() {
            keep.confidence_score = dropped.confidence_score;
        }
        union_sources(&mut keep.sources, dropped.sources);
        union_records(&mut keep.existence, dropped.existence);
        union_records(&mut keep.roles, dropped.roles);
    }

    // Roles pointing at the absorbed node now point at the survivor.
    for node in &mut out.nodes {
        for role in &mut node.roles {
            for slot in [&mut role.organization, &mut role.event] {
                if slot.as_deref() == Some(drop_id) {
                    *slot = Some(keep_id.to_string());
                }
            }
        }
    }

    let touches_drop = |s: &str, t: &str| s == drop_id || t == drop_id;
    let mut seen: HashSet<(String, String, RelationType)> = out
        .edges
        .iter()
        .filter(|e| !touches_drop(&e.source, &e.target))
        .map(|e| (e.source.clone(), e.target.clone(), e.relation_type))
        .collect();

    let edges = std::mem::take(&mut out.edges);
    for mut edge in edges {
        if !touches_drop(&edge.source, &edge.target) {
            out.edges.push(edge);
            continue;
        }
        if edge.source == drop_id {
            edge.source = keep_id.to_string();
        }
        if edge.target == drop_id {
            edge.target = keep_id.to_string();
        }
        if edge.source == edge.target {
            continue;
        }
        if seen.insert((edge.source.clone(), edge.target.clone(), edge.relation_type)) {
            out.edges.push(edge);
        }
    }

    Ok(out)
}

pub(crate) fn union_sources(into: &mut Vec<SourceCitation>, from: Vec<SourceCitation>) {
    for source in from {
        if !into.iter().any(|s| s.uri == source.uri) {
            into.push(source);
        }
    }
}

fn union_records<T: PartialEq>(into: &mut Vec<T>, from: Vec<T>) {
    for record in from {
        if !into.contains(&record) {
            into.push(record);
        }
    }
}

// ---------------------------------------------------------------------------
// Direct edit
// ---------------------------------------------------------------------------

/// A typed direct edit of a node's content fields.
///
/// Outer `None` leaves a field alone. For optional fields `Some(None)` (JSON
/// `null`) clears it. Metric fields cannot be named here.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NodeUpdate {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(rename = "type", default)]
    pub node_type: Option<NodeType>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub validity: Option<Option<TemporalFact>>,
    #[serde(default, deserialize_with = "double_option")]
    pub region: Option<Option<RegionInfo>>,
    #[serde(default)]
    pub existence: Option<Vec<Existence>>,
    #[serde(default)]
    pub roles: Option<Vec<Role>>,
    #[serde(default, deserialize_with = "double_option")]
    pub importance: Option<Option<f64>>,
    #[serde(default)]
    pub certainty: Option<Certainty>,
    #[serde(default, deserialize_with = "double_option")]
    pub confidence_score: Option<Option<f64>>,
    #[serde(default)]
    pub sources: Option<Vec<SourceCitation>>,
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl NodeUpdate {
    pub fn is_empty(&self) -> bool {
        *self == NodeUpdate::default()
    }
}

/// Apply a direct edit to node `id`. A blank label, a malformed validity and
/// a non-finite number are ignored; `Some(None)` clears a field.
pub fn update_node(graph: &Graph, id: &str, update: NodeUpdate) -> GraphResult<Graph> {
    let mut out = graph.clone();
    let node = out.node_mut(id).ok_or_else(|| GraphError::NodeNotFound {
        id: id.to_string(),
    })?;

    if let Some(label) = update.label.filter(|l| !l.trim().is_empty()) {
        node.label = label;
    }
    if let Some(node_type) = update.node_type {
        node.node_type = node_type;
    }
    if let Some(description) = update.description {
        node.description = description;
    }
    match update.validity {
        Some(Some(validity)) if !validity.is_well_formed() => {}
        Some(validity) => node.validity = validity,
        None => {}
    }
    if let Some(region) = update.region {
        node.region = region;
    }
    if let Some(existence) = update.existence {
        node.existence = existence;
    }
    if let Some(roles) = update.roles {
        node.roles = roles;
    }
    match update.importance {
        Some(Some(importance)) if !importance.is_finite() => {}
        Some(importance) => node.importance = importance,
        None => {}
    }
    if let Some(certainty) = update.certainty {
        node.certainty = certainty;
    }
    match update.confidence_score {
        Some(Some(confidence)) if !confidence.is_finite() => {}
        Some(confidence) => node.confidence_score = confidence.map(|v| v.clamp(0.0, 1.0)),
        None => {}
    }
    if let Some(sources) = update.sources {
        node.sources = sources;
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Deletion
// ---------------------------------------------------------------------------

/// Remove node `id` and every edge touching it.
pub fn remove_node(graph: &Graph, id: &str) -> GraphResult<Graph> {
    if !graph.contains_node(id) {
        return Err(GraphError::NodeNotFound { id: id.to_string() });
    }
    let (out, _) = bulk_delete(graph, &[id]);
    Ok(out)
}

/// Remove every listed node and its edges. Unknown ids are ignored.
/// Returns the new graph and the number of nodes removed.
pub fn bulk_delete<S: AsRef<str>>(graph: &Graph, ids: &[S]) -> (Graph, usize) {
    let doomed: HashSet<&str> = ids.iter().map(AsRef::as_ref).collect();
    let mut out = graph.clone();
    let before = out.nodes.len();
    out.nodes.retain(|n| !doomed.contains(n.id.as_str()));
    out.edges
        .retain(|e| !doomed.contains(e.source.as_str()) && !doomed.contains(e.target.as_str()));
    let removed = before - out.nodes.len();
    (out, removed)
}

// ---------------------------------------------------------------------------
// Temporal slice
// ---------------------------------------------------------------------------

/// Sub-graph valid in `year`: nodes whose validity covers it (or that have
/// none) and edges whose temporal fact covers it (or that have none) between
/// retained nodes.
pub fn slice_at_year(graph: &Graph, year: i32) -> Graph {
    let mut out = graph.clone();
    out.nodes
        .retain(|n| n.validity.as_ref().is_none_or(|v| v.covers_year(year)));
    let kept: HashSet<String> = out.nodes.iter().map(|n| n.id.clone()).collect();
    out.edges.retain(|e| {
        kept.contains(&e.source)
            && kept.contains(&e.target)
            && e.temporal.as_ref().is_none_or(|t| t.covers_year(year))
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, Node};

    fn graph() -> Graph {
        let mut graph = Graph::new();
        graph.nodes = vec![
            Node::new("a", "Roman Dmowski")
                .with_type(NodeType::Person)
                .with_validity(TemporalFact::interval("1864", "1939")),
            Node::new("b", "R. Dmowski").with_description("Polish statesman"),
            Node::new("c", "Liga Narodowa").with_type(NodeType::Organization),
            Node::new("d", "Endecja"),
        ];
        graph.edges = vec![
            Edge::new("e1", "a", "c", RelationType::Founded),
            Edge::new("e2", "b", "c", RelationType::Founded),
            Edge::new("e3", "a", "b", RelationType::RelatedTo),
            Edge::new("e4", "b", "d", RelationType::Led),
        ];
        graph
    }

    #[test]
    fn merge_dedupes_shared_edges() {
        let merged = merge_nodes(&graph(), "a", "b").unwrap();
        assert!(!merged.contains_node("b"));
        let founded: Vec<&Edge> = merged
            .edges
            .iter()
            .filter(|e| e.target == "c" && e.relation_type == RelationType::Founded)
            .collect();
        assert_eq!(founded.len(), 1);
        assert_eq!(founded[0].id, "e1");
        assert!(merged.edges.iter().all(|e| e.source != e.target));
        assert!(merged.edges.iter().any(|e| e.id == "e4" && e.source == "a"));
        assert_eq!(merged.edge_count(), 2);
    }

    #[test]
    fn merge_fills_empty_fields_only() {
        let mut g = graph();
        g.nodes[1].validity = Some(TemporalFact::instant("1900"));
        g.nodes[1].sources = vec![SourceCitation::new("https://example.org/dmowski")];
        let merged = merge_nodes(&g, "a", "b").unwrap();
        let keep = merged.node("a").unwrap();
        assert_eq!(keep.description.as_deref(), Some("Polish statesman"));
        assert_eq!(keep.validity, Some(TemporalFact::interval("1864", "1939")));
        assert_eq!(keep.sources.len(), 1);
    }

    #[test]
    fn merge_rejects_unknown_and_self() {
        assert!(matches!(
            merge_nodes(&graph(), "a", "zzz"),
            Err(GraphError::NodeNotFound { .. })
        ));
        assert!(matches!(
            merge_nodes(&graph(), "a", "a"),
            Err(GraphError::SelfMerge { .. })
        ));
    }

    #[test]
    fn merge_leaves_input_untouched() {
        let original = graph();
        let _ = merge_nodes(&original, "a", "b").unwrap();
        assert_eq!(original, graph());
    }

    #[test]
    fn update_sets_and_clears_fields() {
        let update: NodeUpdate = serde_json::from_str(
            r#"{"label": "Roman Stanisław Dmowski", "description": null, "confidenceScore": 4}"#,
        )
        .unwrap();
        let g = update_node(&graph(), "b", update).unwrap();
        let b = g.node("b").unwrap();
        assert_eq!(b.label, "Roman Stanisław Dmowski");
        assert_eq!(b.description, None);
        assert_eq!(b.confidence_score, Some(1.0));
    }

    #[test]
    fn update_ignores_malformed_values() {
        let mut g = graph();
        g.nodes[0].importance = Some(0.7);
        g.nodes[0].confidence_score = Some(0.9);
        let update = NodeUpdate {
            label: Some("   ".into()),
            validity: Some(Some(TemporalFact::instant(" "))),
            importance: Some(Some(f64::NAN)),
            confidence_score: Some(Some(f64::INFINITY)),
            ..NodeUpdate::default()
        };
        let updated = update_node(&g, "a", update).unwrap();
        let a = updated.node("a").unwrap();
        assert_eq!(a.label, "Roman Dmowski");
        assert_eq!(a.validity, Some(TemporalFact::interval("1864", "1939")));
        assert_eq!(a.importance, Some(0.7));
        assert_eq!(a.confidence_score, Some(0.9));

        let clear = NodeUpdate {
            validity: Some(None),
            importance: Some(None),
            ..NodeUpdate::default()
        };
        let cleared = update_node(&g, "a", clear).unwrap();
        assert_eq!(cleared.node("a").unwrap().validity, None);
        assert_eq!(cleared.node("a").unwrap().importance, None);
    }

    #[test]
    fn update_cannot_name_metrics() {
        let parsed: Result<NodeUpdate, _> = serde_json::from_str(r#"{"pagerank": 0.5}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn update_missing_node_is_error() {
        assert!(matches!(
            update_node(&graph(), "nope", NodeUpdate::default()),
            Err(GraphError::NodeNotFound { .. })
        ));
    }

    #[test]
    fn remove_node_drops_incident_edges() {
        let g = remove_node(&graph(), "b").unwrap();
        assert_eq!(g.node_count(), 3);
        assert_eq!(g.edge_count(), 1);
        assert!(remove_node(&graph(), "b2").is_err());
    }

    #[test]
    fn bulk_delete_ignores_unknown_ids() {
        let (g, removed) = bulk_delete(&graph(), &["a", "d", "ghost"]);
        assert_eq!(removed, 2);
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn slice_keeps_undated_and_covering_nodes() {
        let g = slice_at_year(&graph(), 1950);
        assert!(!g.contains_node("a"));
        assert!(g.contains_node("b"));
        assert!(g.edges.iter().all(|e| e.source != "a" && e.target != "a"));

        let g = slice_at_year(&graph(), 1900);
        assert!(g.contains_node("a"));
        assert_eq!(g.edge_count(), 4);
    }
}
