//! Bounded undo/redo over immutable graph snapshots.
//!
//! Snapshots are `Arc<Graph>`: a mutation always builds a new `Graph`, so a
//! stored snapshot can never be changed through the live state.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::graph::Graph;

/// Default number of undo steps kept.
pub const DEFAULT_HISTORY_DEPTH: usize = 50;

#[derive(Debug, Clone)]
pub struct History {
    /// Oldest first.
    past: VecDeque<Arc<Graph>>,
    /// Most recently undone last.
    future: Vec<Arc<Graph>>,
    capacity: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_DEPTH)
    }
}

/// Serialized form of a [`History`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryDocument {
    #[serde(default)]
    pub past: Vec<Graph>,
    #[serde(default)]
    pub future: Vec<Graph>,
}

impl History {
    /// A history keeping at most `capacity` undo steps (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            past: VecDeque::new(),
            future: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record `snapshot`, the graph as it was before a mutation.
    ///
    /// Clears the redo stack. Skipped, returning `false`, when the snapshot
    /// is the same allocation as the newest entry or carries the same node
    /// count, edge count and revision.
    pub fn push(&mut self, snapshot: Arc<Graph>) -> bool {
        if let Some(top) = self.past.back() {
            let same = Arc::ptr_eq(top, &snapshot)
                || (top.node_count() == snapshot.node_count()
                    && top.edge_count() == snapshot.edge_count()
                    && top.revision() == snapshot.revision());
            if same {
                return false;
            }
        }
        self.past.push_back(snapshot);
        while self.past.len() > self.capacity {
            self.past.pop_front();
        }
        self.future.clear();
        true
    }

    /// Step back: `current` goes to the redo stack and the newest snapshot
    /// is returned. `None` when there is nothing to undo.
    pub fn undo(&mut self, current: Arc<Graph>) -> Option<Arc<Graph>> {
        let previous = self.past.pop_back()?;
        self.future.push(current);
        Some(previous)
    }

    /// Inverse of [`undo`](Self::undo).
    pub fn redo(&mut self, current: Arc<Graph>) -> Option<Arc<Graph>> {
        let next = self.future.pop()?;
        self.past.push_back(current);
        while self.past.len() > self.capacity {
            self.past.pop_front();
        }
        Some(next)
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    /// Number of undo steps available.
    pub fn undo_depth(&self) -> usize {
        self.past.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.future.len()
    }

    pub fn clear(&mut self) {
        self.past.clear();
        self.future.clear();
    }

    pub fn to_document(&self) -> HistoryDocument {
        HistoryDocument {
            past: self.past.iter().map(|g| Graph::clone(g)).collect(),
            future: self.future.iter().map(|g| Graph::clone(g)).collect(),
        }
    }

    /// Rebuild from a stored document, keeping the newest `capacity` entries.
    pub fn from_document(document: HistoryDocument, capacity: usize) -> Self {
        let mut history = Self::new(capacity);
        let skip = document.past.len().saturating_sub(history.capacity);
        history.past = document.past.into_iter().skip(skip).map(Arc::new).collect();
        history.future = document.future.into_iter().map(Arc::new).collect();
        history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;

    fn graph_with(ids: &[&str], revision: u64) -> Arc<Graph> {
        let mut graph = Graph::new();
        graph.nodes = ids.iter().map(|id| Node::new(*id, *id)).collect();
        graph.meta.revision = revision;
        Arc::new(graph)
    }

    #[test]
    fn undo_then_redo_round_trips() {
        let mut history = History::new(10);
        let before = graph_with(&["a"], 1);
        let after = graph_with(&["a", "b"], 2);

        assert!(history.push(before.clone()));
        let restored = history.undo(after.clone()).unwrap();
        assert_eq!(restored.nodes, before.nodes);
        assert!(history.can_redo());

        let again = history.redo(restored).unwrap();
        assert_eq!(again.nodes, after.nodes);
        assert!(history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn empty_history_has_nothing_to_undo() {
        let mut history = History::default();
        assert!(history.undo(graph_with(&[], 0)).is_none());
        assert!(history.redo(graph_with(&[], 0)).is_none());
    }

    #[test]
    fn no_op_pushes_are_skipped() {
        let mut history = History::new(10);
        let snapshot = graph_with(&["a"], 3);
        assert!(history.push(snapshot.clone()));
        assert!(!history.push(snapshot));
        assert!(!history.push(graph_with(&["x"], 3)));
        assert!(history.push(graph_with(&["a"], 4)));
        assert_eq!(history.undo_depth(), 2);
    }

    #[test]
    fn oldest_entries_are_evicted() {
        let mut history = History::new(3);
        for revision in 0..5 {
            history.push(graph_with(&["a"], revision));
        }
        assert_eq!(history.undo_depth(), 3);
        let newest = history.undo(graph_with(&["a"], 5)).unwrap();
        assert_eq!(newest.revision(), 4);
    }

    #[test]
    fn push_clears_redo() {
        let mut history = History::new(5);
        history.push(graph_with(&["a"], 1));
        history.undo(graph_with(&["a", "b"], 2));
        assert!(history.can_redo());
        history.push(graph_with(&["a"], 1));
        assert!(!history.can_redo());
    }

    #[test]
    fn capacity_is_at_least_one() {
        assert_eq!(History::new(0).capacity(), 1);
    }

    #[test]
    fn document_round_trip_trims_to_capacity() {
        let mut history = History::new(10);
        for revision in 0..4 {
            history.push(graph_with(&["a"], revision));
        }
        let restored = History::from_document(history.to_document(), 2);
        assert_eq!(restored.undo_depth(), 2);
        assert_eq!(restored.past.back().unwrap().revision(), 3);
    }
}
