//! Persistence of the canonical graph document and its undo history.
//!
//! - [`DurableStore`]: redb-backed document table
//! - [`GraphArchive`]: typed access to the `graph` and `history` documents,
//!   with schema-version checking on load

pub mod durable;

use std::path::Path;

use serde_json::Value;

use crate::error::StoreError;
use crate::graph::{Graph, SCHEMA_VERSION};
use crate::history::HistoryDocument;

pub use durable::DurableStore;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

const GRAPH_DOCUMENT: &str = "graph";
const HISTORY_DOCUMENT: &str = "history";

/// Outcome of loading the stored graph.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadedGraph {
    /// Nothing stored yet.
    Missing,
    Current(Graph),
    /// A document exists but is from another schema version or unreadable.
    /// `found` is its version, when one could be read.
    Stale { found: Option<String> },
}

/// Typed view over a [`DurableStore`].
#[derive(Debug)]
pub struct GraphArchive {
    store: DurableStore,
}

fn to_json<T: serde::Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| StoreError::Serialization {
        message: e.to_string(),
    })
}

impl GraphArchive {
    pub fn open(data_dir: &Path) -> StoreResult<Self> {
        Ok(Self {
            store: DurableStore::open(data_dir)?,
        })
    }

    pub fn save_graph(&self, graph: &Graph) -> StoreResult<()> {
        self.store.put(GRAPH_DOCUMENT, &to_json(graph)?)
    }

    /// Load the stored graph, checking `meta.version` before decoding.
    ///
    /// A version mismatch or an undecodable document is never partially
    /// loaded; it is reported as [`LoadedGraph::Stale`].
    pub fn load_graph(&self) -> StoreResult<LoadedGraph> {
        let Some(bytes) = self.store.get(GRAPH_DOCUMENT)? else {
            return Ok(LoadedGraph::Missing);
        };
        let Ok(value) = serde_json::from_slice::<Value>(&bytes) else {
            return Ok(LoadedGraph::Stale { found: None });
        };
        let found = value
            .pointer("/meta/version")
            .and_then(Value::as_str)
            .map(str::to_string);
        if found.as_deref() != Some(SCHEMA_VERSION) {
            return Ok(LoadedGraph::Stale { found });
        }
        match serde_json::from_value::<Graph>(value) {
            Ok(graph) => Ok(LoadedGraph::Current(graph)),
            Err(err) => {
                tracing::warn!(error = %err, "stored graph does not decode");
                Ok(LoadedGraph::Stale { found })
            }
        }
    }

    pub fn save_history(&self, history: &HistoryDocument) -> StoreResult<()> {
        self.store.put(HISTORY_DOCUMENT, &to_json(history)?)
    }

    /// Load the stored history. Undecodable history, or history holding a
    /// snapshot of another schema version, is discarded.
    pub fn load_history(&self) -> StoreResult<Option<HistoryDocument>> {
        let Some(bytes) = self.store.get(HISTORY_DOCUMENT)? else {
            return Ok(None);
        };
        match serde_json::from_slice::<HistoryDocument>(&bytes) {
            Ok(doc)
                if doc
                    .past
                    .iter()
                    .chain(&doc.future)
                    .all(|g| g.meta().version == SCHEMA_VERSION) =>
            {
                Ok(Some(doc))
            }
            Ok(_) => {
                tracing::warn!("discarding history from another schema version");
                Ok(None)
            }
            Err(err) => {
                tracing::warn!(error = %err, "discarding undecodable history");
                Ok(None)
            }
        }
    }

    pub fn clear_history(&self) -> StoreResult<()> {
        self.store.remove(HISTORY_DOCUMENT).map(|_| ())
    }

    /// Store raw bytes under the graph document name.
    #[cfg(test)]
    pub(crate) fn put_raw_graph(&self, bytes: &[u8]) -> StoreResult<()> {
        self.store.put(GRAPH_DOCUMENT, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;
    use tempfile::TempDir;

    #[test]
    fn graph_round_trips() {
        let dir = TempDir::new().unwrap();
        let archive = GraphArchive::open(dir.path()).unwrap();
        assert_eq!(archive.load_graph().unwrap(), LoadedGraph::Missing);

        let mut graph = Graph::new();
        graph.nodes.push(Node::new("a", "Alpha"));
        archive.save_graph(&graph).unwrap();
        assert_eq!(archive.load_graph().unwrap(), LoadedGraph::Current(graph));
    }

    #[test]
    fn other_versions_are_stale() {
        let dir = TempDir::new().unwrap();
        let archive = GraphArchive::open(dir.path()).unwrap();

        archive
            .put_raw_graph(br#"{"nodes": [], "edges": [], "meta": {"version": "1.0"}}"#)
            .unwrap();
        assert_eq!(
            archive.load_graph().unwrap(),
            LoadedGraph::Stale {
                found: Some("1.0".into())
            }
        );

        archive.put_raw_graph(br#"{"nodes": []}"#).unwrap();
        assert_eq!(archive.load_graph().unwrap(), LoadedGraph::Stale { found: None });

        archive.put_raw_graph(b"not json").unwrap();
        assert_eq!(archive.load_graph().unwrap(), LoadedGraph::Stale { found: None });
    }

    #[test]
    fn current_version_with_bad_body_is_stale() {
        let dir = TempDir::new().unwrap();
        let archive = GraphArchive::open(dir.path()).unwrap();
        archive
            .put_raw_graph(br#"{"nodes": 5, "meta": {"version": "2.0"}}"#)
            .unwrap();
        assert!(matches!(
            archive.load_graph().unwrap(),
            LoadedGraph::Stale { .. }
        ));
    }

    #[test]
    fn history_round_trips_and_clears() {
        let dir = TempDir::new().unwrap();
        let archive = GraphArchive::open(dir.path()).unwrap();
        assert_eq!(archive.load_history().unwrap(), None);

        let doc = HistoryDocument {
            past: vec![Graph::new()],
            future: vec![],
        };
        archive.save_history(&doc).unwrap();
        assert_eq!(archive.load_history().unwrap(), Some(doc));

        archive.clear_history().unwrap();
        assert_eq!(archive.load_history().unwrap(), None);
    }
}
