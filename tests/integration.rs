//! End-to-end integration tests for the histograph engine.
//!
//! These tests drive the public `Engine` API the way a caller would: apply
//! patches, edit nodes, recompute metrics, undo and export, checking the
//! graph invariants after each step.

use histograph::config::EngineConfig;
use histograph::engine::{EnrichOutcome, Engine, StoreState};
use histograph::export::{self, ExportFormat};
use histograph::graph::ops::NodeUpdate;
use histograph::graph::{Graph, NodeType, RelationType, TemporalFact};
use histograph::patch::{GraphPatch, PatchEdge, PatchNode, Resolution, Resolutions};

fn test_engine() -> Engine {
    Engine::new(EngineConfig::in_memory()).unwrap()
}

fn assert_referential_integrity(graph: &Graph) {
    for edge in &graph.edges {
        assert!(graph.contains_node(&edge.source), "dangling source {}", edge.source);
        assert!(graph.contains_node(&edge.target), "dangling target {}", edge.target);
        assert_ne!(edge.source, edge.target, "self-loop {}", edge.id);
    }
}

fn dmowski_only() -> GraphPatch {
    GraphPatch::new(
        vec![
            PatchNode::new("A")
                .label("Roman Dmowski")
                .node_type("person")
                .validity(TemporalFact::interval("1864", "1939")),
        ],
        vec![],
    )
}

fn founding_of_liga() -> GraphPatch {
    GraphPatch::new(
        vec![PatchNode::new("B").label("Liga Narodowa").node_type("organization")],
        vec![PatchEdge::new("A", "B", RelationType::Founded)],
    )
}

#[tokio::test]
async fn founding_patch_then_metrics() {
    let mut engine = test_engine();
    engine.apply_patch(&dmowski_only()).unwrap();
    let outcome = engine.apply_patch(&founding_of_liga()).unwrap();
    assert_eq!(outcome.report.nodes_created, 1);
    assert_eq!(outcome.report.edges_added, 1);

    let graph = engine.graph();
    assert_eq!(graph.node_count(), 2);
    assert_eq!(graph.edge_count(), 1);
    assert_eq!(graph.node("B").unwrap().node_type, NodeType::Organization);
    assert_referential_integrity(&graph);

    let matches = engine.find_similar_labels("Liga Narodowa", Some(0));
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].id, "B");
    assert_eq!(matches[0].distance, 0);

    let enriched = engine.recalculate_metrics().await.unwrap();
    assert!(matches!(enriched, EnrichOutcome::Enriched { .. }));
    let graph = engine.graph();
    let mut total = 0.0;
    for node in &graph.nodes {
        let pagerank = node.metrics().pagerank.unwrap();
        assert!((0.0..=1.0).contains(&pagerank));
        total += pagerank;
    }
    assert!((total - 1.0).abs() < 1e-6);
    assert_eq!(engine.status().state, StoreState::Idle);
}

#[test]
fn applying_a_patch_twice_is_idempotent() {
    let mut engine = test_engine();
    engine.apply_patch(&dmowski_only()).unwrap();
    engine.apply_patch(&founding_of_liga()).unwrap();
    let before = engine.graph();

    let again = engine.apply_patch(&founding_of_liga()).unwrap();
    assert!(!again.changed);
    assert_eq!(again.report.duplicate_edges, 1);

    let after = engine.graph();
    assert_eq!(after.edge_count(), 1);
    assert_eq!(after.nodes, before.nodes);
    assert_eq!(after.edges, before.edges);
}

#[test]
fn merge_collapses_parallel_edges() {
    let mut engine = test_engine();
    engine
        .apply_patch(&GraphPatch::new(
            vec![
                PatchNode::new("A").label("Roman Dmowski"),
                PatchNode::new("B").label("R. Dmowski"),
                PatchNode::new("C").label("Stronnictwo Narodowe"),
            ],
            vec![
                PatchEdge::new("A", "C", RelationType::MemberOf),
                PatchEdge::new("B", "C", RelationType::MemberOf),
                PatchEdge::new("A", "B", RelationType::RelatedTo),
            ],
        ))
        .unwrap();

    let merged = engine.merge_nodes("A", "B").unwrap();
    assert!(!merged.contains_node("B"));
    assert_eq!(merged.node_count(), 2);
    assert_eq!(merged.edge_count(), 1);
    assert!(merged.has_triple("A", "C", RelationType::MemberOf));
    assert_referential_integrity(&merged);
}

#[test]
fn conflicts_gate_the_merge_until_resolved() {
    let mut engine = test_engine();
    engine
        .apply_patch(&GraphPatch::new(
            vec![PatchNode::new("A").label("Roman Dmowski").description("Polish statesman")],
            vec![],
        ))
        .unwrap();

    let proposal = GraphPatch::new(
        vec![
            PatchNode::new("A")
                .description("Founder of National Democracy")
                .validity(TemporalFact::interval("1864", "1939")),
        ],
        vec![],
    );
    let conflicts = engine.detect_conflicts(&proposal);
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].entity_label, "Roman Dmowski");
    let key = conflicts[0].key();

    // Unresolved: the conflicting field keeps its value, the rest applies.
    let outcome = engine.apply_patch(&proposal).unwrap();
    assert_eq!(outcome.conflicts.len(), 1);
    assert_eq!(outcome.report.conflicts_kept_existing, 1);
    let node = engine.graph().node("A").cloned().unwrap();
    assert_eq!(node.description.as_deref(), Some("Polish statesman"));
    assert_eq!(node.validity, Some(TemporalFact::interval("1864", "1939")));

    // Resolved to the proposal.
    let mut resolutions = Resolutions::new();
    resolutions.insert(key, Resolution::Proposed);
    let outcome = engine.apply_patch_resolved(&proposal, &resolutions).unwrap();
    assert_eq!(outcome.report.conflicts_accepted, 1);
    assert_eq!(
        engine.graph().node("A").unwrap().description.as_deref(),
        Some("Founder of National Democracy")
    );
}

#[test]
fn later_patch_fills_placeholder_label_and_type() {
    let mut engine = test_engine();
    engine
        .apply_patch(&GraphPatch::new(vec![PatchNode::new("A")], vec![]))
        .unwrap();
    assert_eq!(engine.graph().node("A").unwrap().label, "A");

    let patch = GraphPatch::new(
        vec![PatchNode::new("A").label("Roman Dmowski").node_type("person")],
        vec![],
    );
    assert!(engine.detect_conflicts(&patch).is_empty());

    let outcome = engine.apply_patch(&patch).unwrap();
    assert!(outcome.changed);
    assert!(outcome.conflicts.is_empty());
    let node = engine.graph().node("A").cloned().unwrap();
    assert_eq!(node.label, "Roman Dmowski");
    assert_eq!(node.node_type, NodeType::Person);
}

#[test]
fn malformed_entries_are_skipped_individually() {
    let mut engine = test_engine();
    let patch = GraphPatch::from_json_lenient(
        r#"{
            "type": "document_ingestion",
            "nodes": [
                {"id": "a", "label": "Sejm", "dates": "1918-1939"},
                {"label": "no id here"},
                42
            ],
            "edges": [
                {"source": "a", "target": "ghost", "relationType": "founded"},
                {"target": "a", "relationType": "led"}
            ]
        }"#,
    )
    .unwrap();

    let outcome = engine.apply_patch(&patch).unwrap();
    assert_eq!(outcome.report.nodes_created, 1);
    assert_eq!(outcome.report.dangling_edges, 1);
    assert!(!outcome.report.rejected.is_empty());

    let graph = engine.graph();
    assert_eq!(graph.node_count(), 1);
    assert_eq!(graph.edge_count(), 0);
    let sejm = graph.node("a").unwrap();
    assert_eq!(sejm.validity.as_ref().and_then(TemporalFact::year), Some(1918));
}

#[test]
fn undo_redo_round_trip_over_direct_edits() {
    let mut engine = test_engine();
    engine.apply_patch(&dmowski_only()).unwrap();
    engine.apply_patch(&founding_of_liga()).unwrap();
    let before = engine.graph();

    let update = NodeUpdate {
        label: Some("Roman Stanisław Dmowski".into()),
        description: Some(Some("Polish politician".into())),
        ..NodeUpdate::default()
    };
    engine.update_node("A", update).unwrap();
    let after = engine.graph();
    assert_eq!(after.node("A").unwrap().label, "Roman Stanisław Dmowski");

    let undone = engine.undo().unwrap().unwrap();
    assert_eq!(undone.nodes, before.nodes);
    assert_eq!(undone.edges, before.edges);

    let redone = engine.redo().unwrap().unwrap();
    assert_eq!(redone.nodes, after.nodes);
    assert_eq!(redone.edges, after.edges);
}

#[test]
fn bulk_delete_removes_incident_edges() {
    let mut engine = test_engine();
    engine.apply_patch(&dmowski_only()).unwrap();
    engine.apply_patch(&founding_of_liga()).unwrap();

    let removed = engine.bulk_delete(&["B", "nobody"]).unwrap();
    assert_eq!(removed, 1);
    let graph = engine.graph();
    assert_eq!(graph.node_count(), 1);
    assert_eq!(graph.edge_count(), 0);
}

#[test]
fn history_depth_is_bounded() {
    let config = EngineConfig {
        history_depth: 2,
        ..EngineConfig::in_memory()
    };
    let mut engine = Engine::new(config).unwrap();
    for i in 0..5 {
        let patch = GraphPatch::new(vec![PatchNode::new(format!("n{i}")).label(format!("Node {i}"))], vec![]);
        engine.apply_patch(&patch).unwrap();
    }
    assert_eq!(engine.info().undo_depth, 2);
    assert!(engine.undo().unwrap().is_some());
    assert!(engine.undo().unwrap().is_some());
    assert!(engine.undo().unwrap().is_none());
    assert_eq!(engine.graph().node_count(), 3);
}

#[test]
fn timeline_slice_keeps_only_valid_entities() {
    let mut engine = test_engine();
    engine
        .apply_patch(&GraphPatch::new(
            vec![
                PatchNode::new("dmowski")
                    .label("Roman Dmowski")
                    .validity(TemporalFact::interval("1864", "1939")),
                PatchNode::new("liga")
                    .label("Liga Narodowa")
                    .validity(TemporalFact::interval("1893", "1928")),
                PatchNode::new("sn")
                    .label("Stronnictwo Narodowe")
                    .validity(TemporalFact::interval("1928", "1947")),
            ],
            vec![
                PatchEdge::new("dmowski", "liga", RelationType::Founded),
                PatchEdge::new("dmowski", "sn", RelationType::MemberOf),
            ],
        ))
        .unwrap();

    let slice = engine.slice_at_year(1900);
    assert_eq!(slice.node_count(), 2);
    assert!(!slice.contains_node("sn"));
    assert_eq!(slice.edge_count(), 1);
    assert_referential_integrity(&slice);
}

#[tokio::test]
async fn exports_carry_computed_metrics() {
    let mut engine = test_engine();
    engine.apply_patch(&dmowski_only()).unwrap();
    engine.apply_patch(&founding_of_liga()).unwrap();
    engine.recalculate_metrics().await.unwrap();
    let graph = engine.graph();

    let gexf = export::render(&graph, ExportFormat::Gexf).unwrap();
    assert!(gexf.contains("<attvalue for=\"pagerank\""));
    assert!(gexf.contains("label=\"Liga Narodowa\""));

    let csv = export::render(&graph, ExportFormat::Csv).unwrap();
    assert_eq!(csv.lines().count(), 3);

    let json = export::render(&graph, ExportFormat::Json).unwrap();
    let parsed: Graph = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.node_count(), 2);
    assert_eq!(parsed.edges, graph.edges);
    assert_eq!(parsed.meta().revision, graph.revision());
}
