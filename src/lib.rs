// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # histograph
//!
//! Graph analytics and patch reconciliation for historical knowledge graphs:
//! people, organizations, events and publications linked by typed, signed,
//! time-bounded relations.
//!
//! ## Architecture
//!
//! - **Data model** (`graph`): nodes, edges, temporal facts, and the
//!   versioned `{ nodes, edges, meta }` document
//! - **Metrics Engine** (`graph::analytics`): centrality, PageRank, Louvain
//!   communities, k-core, structural balance, network health
//! - **Reconciliation** (`patch`): lenient patch normalization, entity
//!   resolution, conflict detection and gated merge
//! - **Similarity** (`similarity`): trie-backed edit-distance label search
//! - **Graph Store** (`engine`): immutable snapshots, bounded undo/redo,
//!   supervised background enrichment, durable persistence (`store`)
//! - **Export** (`export`): JSON, GEXF and CSV
//!
//! ## Library usage
//!
//! ```no_run
//! use histograph::config::EngineConfig;
//! use histograph::engine::Engine;
//! use histograph::patch::{GraphPatch, PatchEdge, PatchNode};
//! use histograph::graph::RelationType;
//!
//! # async fn run() -> histograph::error::HistoResult<()> {
//! let mut engine = Engine::new(EngineConfig::in_memory())?;
//! let patch = GraphPatch::new(
//!     vec![
//!         PatchNode::new("dmowski").label("Roman Dmowski").node_type("person"),
//!         PatchNode::new("sn").label("Stronnictwo Narodowe").node_type("organization"),
//!     ],
//!     vec![PatchEdge::new("dmowski", "sn", RelationType::Founded)],
//! );
//! engine.apply_patch(&patch)?;
//! engine.recalculate_metrics().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod graph;
pub mod history;
pub mod patch;
pub mod similarity;
pub mod store;
pub mod supervisor;
