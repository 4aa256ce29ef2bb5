//! Engine facade: the Graph Store orchestrator.
//!
//! The `Engine` owns the canonical graph and sequences every mutation:
//! reconcile or transform, record the previous snapshot for undo, publish the
//! new snapshot, persist. Metrics recomputation runs afterwards on the
//! blocking pool and is committed only if no newer mutation happened in the
//! meantime.
//!
//! ```text
//! Idle ──mutation──▶ PatchApplied ──begin_enrichment──▶ Enriching
//!   ▲                                                      │
//!   └──────────────── commit_enrichment ◀──────────────────┘
//! ```

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::config::EngineConfig;
use crate::error::{GraphError, HistoResult, MetricsError};
use crate::graph::analytics::{Enrichment, MetricsResult};
use crate::graph::ops::{self, NodeUpdate};
use crate::graph::{Graph, now_millis};
use crate::history::History;
use crate::patch::reconcile::{merge_prepared, prepare, reconcile};
use crate::patch::{Conflict, GraphPatch, ReconcileReport, Resolutions};
use crate::similarity::{
    DuplicateCandidate, SimilarityIndex, SimilarityMatch, auto_max_distance,
    find_duplicate_candidates,
};
use crate::store::{GraphArchive, LoadedGraph};
use crate::supervisor::{EnrichmentJob, MetricsAvailability, MetricsSupervisor};

/// Where the engine is in the mutation/enrichment cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreState {
    /// The current graph carries metrics for its revision, or nothing changed yet.
    Idle,
    /// Content changed; metrics are stale.
    PatchApplied,
    Enriching,
}

/// Snapshot of the engine's bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub state: StoreState,
    pub metrics: MetricsAvailability,
    pub last_warning: Option<String>,
    pub can_undo: bool,
    pub can_redo: bool,
    pub revision: u64,
    pub metrics_current: bool,
}

/// Result of applying a patch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchOutcome {
    pub report: ReconcileReport,
    /// Conflicts found before resolutions were applied.
    pub conflicts: Vec<Conflict>,
    /// Whether a new revision was committed.
    pub changed: bool,
    pub revision: u64,
}

/// Result of committing a metrics recomputation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum EnrichOutcome {
    Enriched {
        failed_metrics: Vec<&'static str>,
        betweenness_exact: bool,
        balance: f64,
    },
    /// A newer mutation happened first; the result was discarded.
    Superseded,
    /// The graph stays committed without fresh metrics.
    Failed { warning: String },
}

/// The graph analytics and reconciliation engine.
pub struct Engine {
    config: EngineConfig,
    current: Arc<Graph>,
    history: History,
    supervisor: MetricsSupervisor,
    archive: Option<GraphArchive>,
    state: StoreState,
    /// Bumped by every content change, undo and redo.
    generation: u64,
    last_warning: Option<String>,
    notifier: watch::Sender<Arc<Graph>>,
}

impl Engine {
    /// Create an engine, loading the stored graph when `data_dir` is set.
    ///
    /// A stored document from another schema version is never partially
    /// loaded: the graph is reseeded from `seed_path`, or starts empty.
    pub fn new(config: EngineConfig) -> HistoResult<Self> {
        config.validate()?;
        tracing::info!(
            data_dir = ?config.data_dir,
            history_depth = config.history_depth,
            timeout_secs = config.metrics_timeout_secs,
            "initializing histograph engine"
        );

        let archive = config
            .data_dir
            .as_deref()
            .map(GraphArchive::open)
            .transpose()?;

        let loaded = match &archive {
            Some(archive) => archive.load_graph()?,
            None => LoadedGraph::Missing,
        };
        let (graph, reseeded) = match loaded {
            LoadedGraph::Current(graph) => {
                tracing::info!(
                    nodes = graph.node_count(),
                    edges = graph.edge_count(),
                    revision = graph.revision(),
                    "loaded stored graph"
                );
                (graph, false)
            }
            LoadedGraph::Missing => (Self::seed_graph(&config)?, true),
            LoadedGraph::Stale { found } => {
                tracing::warn!(
                    found = found.as_deref().unwrap_or("none"),
                    "stored graph is from another schema version, reseeding"
                );
                (Self::seed_graph(&config)?, true)
            }
        };

        let mut history = History::new(config.history_depth);
        if let Some(archive) = &archive {
            if reseeded {
                archive.clear_history()?;
            } else if config.persist_history {
                if let Some(doc) = archive.load_history()? {
                    history = History::from_document(doc, config.history_depth);
                }
            }
        }

        let current = Arc::new(graph);
        let (notifier, _) = watch::channel(Arc::clone(&current));
        let state = if current.metrics_current() {
            StoreState::Idle
        } else {
            StoreState::PatchApplied
        };

        let mut engine = Self {
            supervisor: MetricsSupervisor::new(config.metrics_timeout(), config.max_metric_restarts),
            config,
            current,
            history,
            archive,
            state,
            generation: 0,
            last_warning: None,
            notifier,
        };
        if reseeded && engine.archive.is_some() {
            engine.persist()?;
        }
        Ok(engine)
    }

    fn seed_graph(config: &EngineConfig) -> HistoResult<Graph> {
        let Some(patch) = config.load_seed()? else {
            return Ok(Graph::new());
        };
        let seeded = reconcile(
            &Graph::new(),
            &patch,
            &Resolutions::new(),
            &config.reconcile_options(),
        );
        let mut graph = seeded.graph;
        if seeded.changed {
            graph.touch();
        }
        tracing::info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            rejected = seeded.report.rejected.len(),
            "seeded graph"
        );
        Ok(graph)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// The current snapshot.
    pub fn graph(&self) -> Arc<Graph> {
        Arc::clone(&self.current)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Receiver notified with every committed snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Graph>> {
        self.notifier.subscribe()
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            state: self.state,
            metrics: self.supervisor.availability(),
            last_warning: self.last_warning.clone(),
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
            revision: self.current.revision(),
            metrics_current: self.current.metrics_current(),
        }
    }

    /// Conflicts `patch` would raise against the current graph.
    pub fn detect_conflicts(&self, patch: &GraphPatch) -> Vec<Conflict> {
        prepare(&self.current, patch, &self.config.reconcile_options()).conflicts(&self.current)
    }

    /// Nodes whose label is within `max_distance` edits of `query`; `None`
    /// picks the length-based default.
    pub fn find_similar_labels(&self, query: &str, max_distance: Option<usize>) -> Vec<SimilarityMatch> {
        let max = max_distance.unwrap_or_else(|| auto_max_distance(query));
        SimilarityIndex::from_nodes(&self.current.nodes).find_similar(query, max)
    }

    pub fn duplicate_candidates(&self) -> Vec<DuplicateCandidate> {
        find_duplicate_candidates(&self.current)
    }

    /// The sub-graph valid during `year`.
    pub fn slice_at_year(&self, year: i32) -> Graph {
        ops::slice_at_year(&self.current, year)
    }

    pub fn info(&self) -> EngineInfo {
        EngineInfo {
            node_count: self.current.node_count(),
            edge_count: self.current.edge_count(),
            revision: self.current.revision(),
            metrics_current: self.current.metrics_current(),
            undo_depth: self.history.undo_depth(),
            redo_depth: self.history.redo_depth(),
            metrics: self.supervisor.availability(),
            persistent: self.archive.is_some(),
        }
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Apply `patch`. Conflicting fields keep their existing values.
    pub fn apply_patch(&mut self, patch: &GraphPatch) -> HistoResult<PatchOutcome> {
        self.apply_patch_resolved(patch, &Resolutions::new())
    }

    /// Apply `patch`, taking the proposed value for every conflict resolved
    /// to it in `resolutions`.
    pub fn apply_patch_resolved(
        &mut self,
        patch: &GraphPatch,
        resolutions: &Resolutions,
    ) -> HistoResult<PatchOutcome> {
        let prepared = prepare(&self.current, patch, &self.config.reconcile_options());
        let conflicts = prepared.conflicts(&self.current);
        let reconciliation = merge_prepared(&self.current, prepared, resolutions);

        tracing::info!(
            created = reconciliation.report.nodes_created,
            updated = reconciliation.report.nodes_updated,
            edges = reconciliation.report.edges_added,
            dropped = reconciliation.report.edges_dropped(),
            rejected = reconciliation.report.rejected.len(),
            conflicts = conflicts.len(),
            "patch reconciled"
        );

        if reconciliation.changed {
            self.commit(reconciliation.graph)?;
        }
        Ok(PatchOutcome {
            report: reconciliation.report,
            conflicts,
            changed: reconciliation.changed,
            revision: self.current.revision(),
        })
    }

    /// Absorb `drop_id` into `keep_id`.
    pub fn merge_nodes(&mut self, keep_id: &str, drop_id: &str) -> HistoResult<Arc<Graph>> {
        let merged = ops::merge_nodes(&self.current, keep_id, drop_id)?;
        self.commit(merged)
    }

    /// Direct content edit; bypasses reconciliation.
    pub fn update_node(&mut self, id: &str, update: NodeUpdate) -> HistoResult<Arc<Graph>> {
        if update.is_empty() {
            if !self.current.contains_node(id) {
                return Err(GraphError::NodeNotFound { id: id.to_string() }.into());
            }
            return Ok(self.graph());
        }
        let updated = ops::update_node(&self.current, id, update)?;
        if updated.nodes == self.current.nodes {
            return Ok(self.graph());
        }
        self.commit(updated)
    }

    pub fn remove_node(&mut self, id: &str) -> HistoResult<Arc<Graph>> {
        let removed = ops::remove_node(&self.current, id)?;
        self.commit(removed)
    }

    /// Remove every listed node that exists. Returns how many were removed.
    pub fn bulk_delete<S: AsRef<str>>(&mut self, ids: &[S]) -> HistoResult<usize> {
        let (graph, removed) = ops::bulk_delete(&self.current, ids);
        if removed > 0 {
            self.commit(graph)?;
        }
        Ok(removed)
    }

    /// Restore the snapshot before the last mutation. `None` when there is
    /// nothing to undo.
    pub fn undo(&mut self) -> HistoResult<Option<Arc<Graph>>> {
        let Some(previous) = self.history.undo(self.graph()) else {
            return Ok(None);
        };
        self.restore(previous)
    }

    pub fn redo(&mut self) -> HistoResult<Option<Arc<Graph>>> {
        let Some(next) = self.history.redo(self.graph()) else {
            return Ok(None);
        };
        self.restore(next)
    }

    fn restore(&mut self, snapshot: Arc<Graph>) -> HistoResult<Option<Arc<Graph>>> {
        self.supervisor.cancel_inflight();
        self.generation += 1;
        self.state = if snapshot.metrics_current() {
            StoreState::Idle
        } else {
            StoreState::PatchApplied
        };
        self.install(Graph::clone(&snapshot), true)?;
        Ok(Some(self.graph()))
    }

    /// Record a content change: new revision, undo snapshot, publish, persist.
    fn commit(&mut self, mut next: Graph) -> HistoResult<Arc<Graph>> {
        next.touch();
        self.history.push(self.graph());
        self.supervisor.cancel_inflight();
        self.generation += 1;
        self.state = StoreState::PatchApplied;
        self.install(next, true)?;
        Ok(self.graph())
    }

    /// Make `graph` current, notify subscribers and persist. The history
    /// document is rewritten only when `history_changed` is set.
    fn install(&mut self, mut graph: Graph, history_changed: bool) -> HistoResult<()> {
        if self.archive.is_some() {
            graph.mark_saved(now_millis());
        }
        self.current = Arc::new(graph);
        self.notifier.send_replace(Arc::clone(&self.current));
        self.save(history_changed)
    }

    fn save(&self, history_changed: bool) -> HistoResult<()> {
        let Some(archive) = &self.archive else {
            return Ok(());
        };
        archive.save_graph(&self.current)?;
        if history_changed && self.config.persist_history {
            archive.save_history(&self.history.to_document())?;
        }
        Ok(())
    }

    /// Write the current graph (and history) to the durable store.
    pub fn persist(&mut self) -> HistoResult<()> {
        if self.archive.is_none() {
            return Ok(());
        }
        let graph = Graph::clone(&self.current);
        self.install(graph, true)?;
        tracing::info!(revision = self.current.revision(), "persisted graph");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Metrics
    // -----------------------------------------------------------------------

    /// Start recomputing metrics for the current snapshot.
    pub fn begin_enrichment(&mut self) -> MetricsResult<EnrichmentJob> {
        let job = self.supervisor.spawn(
            self.graph(),
            self.config.metrics.clone(),
            self.generation,
        )?;
        self.state = StoreState::Enriching;
        Ok(job)
    }

    /// Commit the result of the job started for `generation`.
    ///
    /// Results for an older generation are discarded. A failure keeps the
    /// committed graph, records a warning, and persists the unenriched graph.
    pub fn commit_enrichment(
        &mut self,
        generation: u64,
        result: MetricsResult<Enrichment>,
    ) -> HistoResult<EnrichOutcome> {
        self.supervisor.record(&result);
        if generation != self.generation {
            tracing::debug!(
                job = generation,
                current = self.generation,
                "discarding superseded metrics"
            );
            return Ok(EnrichOutcome::Superseded);
        }

        match result {
            Ok(enrichment) => {
                let outcome = EnrichOutcome::Enriched {
                    failed_metrics: enrichment.failed_metrics.clone(),
                    betweenness_exact: enrichment.betweenness_exact,
                    balance: enrichment.balance.balance,
                };
                self.last_warning = (!enrichment.failed_metrics.is_empty()).then(|| {
                    format!(
                        "metrics fell back to defaults: {}",
                        enrichment.failed_metrics.join(", ")
                    )
                });
                self.state = StoreState::Idle;
                self.install(enrichment.graph, false)?;
                Ok(outcome)
            }
            Err(MetricsError::Cancelled) => {
                self.state = StoreState::PatchApplied;
                Ok(EnrichOutcome::Superseded)
            }
            Err(err) => {
                let warning = err.to_string();
                tracing::warn!(error = %err, "metrics recomputation failed, keeping unenriched graph");
                self.last_warning = Some(warning.clone());
                self.state = StoreState::PatchApplied;
                self.save(false)?;
                Ok(EnrichOutcome::Failed { warning })
            }
        }
    }

    /// Recompute metrics for the current snapshot and commit them.
    pub async fn recalculate_metrics(&mut self) -> HistoResult<EnrichOutcome> {
        let job = match self.begin_enrichment() {
            Ok(job) => job,
            Err(err) => {
                let warning = err.to_string();
                tracing::warn!(error = %err, "metrics not started");
                self.last_warning = Some(warning.clone());
                return Ok(EnrichOutcome::Failed { warning });
            }
        };
        let generation = job.generation();
        let result = job.wait().await;
        self.commit_enrichment(generation, result)
    }

    /// Make metrics available again after repeated failures.
    pub fn reset_metrics(&mut self) {
        self.supervisor.reset();
        self.last_warning = None;
    }
}

/// Summary information about the engine state.
#[derive(Debug, Clone, Serialize)]
pub struct EngineInfo {
    pub node_count: usize,
    pub edge_count: usize,
    pub revision: u64,
    pub metrics_current: bool,
    pub undo_depth: usize,
    pub redo_depth: usize,
    pub metrics: MetricsAvailability,
    pub persistent: bool,
}

impl std::fmt::Display for EngineInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let metrics = match self.metrics {
            MetricsAvailability::Available => "available".to_string(),
            MetricsAvailability::Degraded {
                consecutive_failures,
            } => format!("degraded ({consecutive_failures} failures)"),
            MetricsAvailability::Unavailable => "unavailable".to_string(),
        };
        writeln!(f, "histograph engine info")?;
        writeln!(f, "  nodes:        {}", self.node_count)?;
        writeln!(f, "  edges:        {}", self.edge_count)?;
        writeln!(f, "  revision:     {}", self.revision)?;
        writeln!(f, "  metrics:      {metrics}")?;
        writeln!(f, "  up to date:   {}", self.metrics_current)?;
        writeln!(f, "  undo / redo:  {} / {}", self.undo_depth, self.redo_depth)?;
        writeln!(f, "  persistent:   {}", self.persistent)?;
        Ok(())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("revision", &self.current.revision())
            .field("generation", &self.generation)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::RelationType;
    use crate::patch::{PatchEdge, PatchNode};

    fn engine() -> Engine {
        Engine::new(EngineConfig::in_memory()).unwrap()
    }

    fn founding() -> GraphPatch {
        GraphPatch::new(
            vec![
                PatchNode::new("dmowski").label("Roman Dmowski").node_type("person"),
                PatchNode::new("liga").label("Liga Narodowa").node_type("organization"),
            ],
            vec![PatchEdge::new("dmowski", "liga", RelationType::Founded)],
        )
    }

    #[test]
    fn create_memory_only_engine() {
        let engine = engine();
        let info = engine.info();
        assert_eq!(info.node_count, 0);
        assert!(!info.persistent);
        assert_eq!(engine.status().state, StoreState::PatchApplied);
    }

    #[test]
    fn mutation_bumps_revision_and_notifies() {
        let mut engine = engine();
        let mut rx = engine.subscribe();
        let outcome = engine.apply_patch(&founding()).unwrap();
        assert!(outcome.changed);
        assert_eq!(outcome.revision, 1);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().node_count(), 2);
    }

    #[test]
    fn unchanged_patch_commits_nothing() {
        let mut engine = engine();
        engine.apply_patch(&founding()).unwrap();
        let again = engine.apply_patch(&founding()).unwrap();
        assert!(!again.changed);
        assert_eq!(again.revision, 1);
        assert_eq!(engine.info().undo_depth, 1);
    }

    #[test]
    fn unknown_ids_are_errors_for_direct_edits() {
        let mut engine = engine();
        assert!(engine.remove_node("ghost").is_err());
        assert!(engine.merge_nodes("a", "b").is_err());
        assert!(engine.update_node("ghost", NodeUpdate::default()).is_err());
        assert_eq!(engine.bulk_delete(&["ghost"]).unwrap(), 0);
        assert_eq!(engine.info().revision, 0);
    }

    #[test]
    fn undo_and_redo_restore_snapshots() {
        let mut engine = engine();
        engine.apply_patch(&founding()).unwrap();
        engine.remove_node("liga").unwrap();
        assert_eq!(engine.graph().node_count(), 1);

        let restored = engine.undo().unwrap().unwrap();
        assert_eq!(restored.node_count(), 2);
        assert_eq!(restored.edge_count(), 1);

        let again = engine.redo().unwrap().unwrap();
        assert_eq!(again.node_count(), 1);
        assert!(engine.redo().unwrap().is_none());
    }

    #[tokio::test]
    async fn recalculate_commits_metrics() {
        let mut engine = engine();
        engine.apply_patch(&founding()).unwrap();
        let outcome = engine.recalculate_metrics().await.unwrap();
        assert!(matches!(outcome, EnrichOutcome::Enriched { .. }));

        let status = engine.status();
        assert_eq!(status.state, StoreState::Idle);
        assert!(status.metrics_current);
        let total: f64 = engine
            .graph()
            .nodes
            .iter()
            .map(|n| n.metrics().pagerank.unwrap())
            .sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn superseded_metrics_are_discarded() {
        let mut engine = engine();
        engine.apply_patch(&founding()).unwrap();

        let job = engine.begin_enrichment().unwrap();
        let generation = job.generation();
        assert_eq!(engine.status().state, StoreState::Enriching);
        engine.remove_node("liga").unwrap();

        let result = job.wait().await;
        let outcome = engine.commit_enrichment(generation, result).unwrap();
        assert_eq!(outcome, EnrichOutcome::Superseded);
        assert!(!engine.status().metrics_current);
        assert_eq!(engine.graph().node_count(), 1);
    }

    #[test]
    fn failed_metrics_keep_content_and_warn() {
        let mut engine = engine();
        engine.apply_patch(&founding()).unwrap();
        let generation = engine.generation;
        let outcome = engine
            .commit_enrichment(generation, Err(MetricsError::Timeout { seconds: 15 }))
            .unwrap();
        assert!(matches!(outcome, EnrichOutcome::Failed { .. }));
        let status = engine.status();
        assert!(status.last_warning.unwrap().contains("timed out"));
        assert_eq!(engine.graph().node_count(), 2);
        assert_eq!(
            status.metrics,
            MetricsAvailability::Degraded {
                consecutive_failures: 1
            }
        );
    }

    #[tokio::test]
    async fn metrics_commit_leaves_history_document_alone() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut engine = Engine::new(EngineConfig::with_data_dir(dir.path())).unwrap();
        engine.apply_patch(&founding()).unwrap();
        let archive = engine.archive.as_ref().unwrap();
        assert_eq!(archive.load_history().unwrap().unwrap().past.len(), 1);

        archive.clear_history().unwrap();
        let outcome = engine.recalculate_metrics().await.unwrap();
        assert!(matches!(outcome, EnrichOutcome::Enriched { .. }));
        let archive = engine.archive.as_ref().unwrap();
        assert_eq!(archive.load_history().unwrap(), None);

        engine.remove_node("liga").unwrap();
        let stored = engine.archive.as_ref().unwrap().load_history().unwrap().unwrap();
        assert_eq!(stored.past.len(), 2);
    }
}
