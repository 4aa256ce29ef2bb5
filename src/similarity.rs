//! Fuzzy entity resolution over node labels.
//!
//! [`SimilarityIndex`] is a character trie. A search walks it once, carrying
//! a single row of the Levenshtein matrix per trie edge, and prunes any
//! branch whose row minimum already exceeds the allowed distance.
//!
//! Keys are normalized with [`normalize_label`] (trim, lowercase, NFC), so
//! `"Liga Narodowa "` and `"liga narodowa"` share a key. The index is a
//! throwaway structure: rebuild it from the current nodes before each
//! resolution pass.

use std::collections::{BTreeMap, HashSet};

use unicode_normalization::UnicodeNormalization;

use crate::graph::{Graph, Node};

/// Canonical key for a label: trimmed, lowercased, NFC-composed.
pub fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase().nfc().collect()
}

/// Edit budget by query length in characters:
/// 0 for 1-3 characters, 1 for 4-6, 2 beyond.
pub fn auto_max_distance(query: &str) -> usize {
    match normalize_label(query).chars().count() {
        0..=3 => 0,
        4..=6 => 1,
        _ => 2,
    }
}

/// An indexed entity within range of the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimilarityMatch {
    pub id: String,
    /// Label as originally inserted.
    pub label: String,
    pub distance: usize,
}

#[derive(Debug, Clone)]
struct Entry {
    id: String,
    label: String,
}

#[derive(Debug, Default, Clone)]
struct TrieNode {
    children: BTreeMap<char, TrieNode>,
    entries: Vec<Entry>,
}

/// Trie of normalized labels.
#[derive(Debug, Default, Clone)]
pub struct SimilarityIndex {
    root: TrieNode,
    len: usize,
}

impl SimilarityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every node label.
    pub fn from_nodes<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> Self {
        let mut index = Self::new();
        for node in nodes {
            index.insert(&node.label, &node.id);
        }
        index
    }

    /// Register `id` under the normalized `label`. Re-inserting an id under
    /// the same key replaces its stored label.
    pub fn insert(&mut self, label: &str, id: &str) {
        let mut node = &mut self.root;
        for ch in normalize_label(label).chars() {
            node = node.children.entry(ch).or_default();
        }
        match node.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => entry.label = label.to_string(),
            None => {
                node.entries.push(Entry {
                    id: id.to_string(),
                    label: label.to_string(),
                });
                self.len += 1;
            }
        }
    }

    /// Number of `(label, id)` registrations.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Entities whose normalized label is within `max_distance` edits of the
    /// normalized query, sorted by distance, then label, then id.
    pub fn find_similar(&self, query: &str, max_distance: usize) -> Vec<SimilarityMatch> {
        let target: Vec<char> = normalize_label(query).chars().collect();
        let first_row: Vec<usize> = (0..=target.len()).collect();
        let mut results = Vec::new();

        if target.len() <= max_distance {
            collect(&self.root, target.len(), &mut results);
        }
        for (&ch, child) in &self.root.children {
            search(child, ch, &target, &first_row, max_distance, &mut results);
        }

        results.sort_by(|a, b| {
            a.distance
                .cmp(&b.distance)
                .then_with(|| a.label.cmp(&b.label))
                .then_with(|| a.id.cmp(&b.id))
        });
        results
    }
}

fn collect(node: &TrieNode, distance: usize, results: &mut Vec<SimilarityMatch>) {
    results.extend(node.entries.iter().map(|e| SimilarityMatch {
        id: e.id.clone(),
        label: e.label.clone(),
        distance,
    }));
}

fn search(
    node: &TrieNode,
    ch: char,
    target: &[char],
    previous: &[usize],
    max_distance: usize,
    results: &mut Vec<SimilarityMatch>,
) {
    let mut row = Vec::with_capacity(previous.len());
    row.push(previous[0] + 1);
    for i in 1..previous.len() {
        let insert = row[i - 1] + 1;
        let delete = previous[i] + 1;
        let replace = previous[i - 1] + usize::from(target[i - 1] != ch);
        row.push(insert.min(delete).min(replace));
    }

    let distance = row[target.len()];
    if distance <= max_distance {
        collect(node, distance, results);
    }

    if row.iter().copied().min().unwrap_or(usize::MAX) <= max_distance {
        for (&next, child) in &node.children {
            search(child, next, target, &row, max_distance, results);
        }
    }
}

// ---------------------------------------------------------------------------
// Duplicate detection
// ---------------------------------------------------------------------------

/// Two nodes whose labels are near-identical.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateCandidate {
    /// The earlier node in graph order.
    pub keep: String,
    pub drop: String,
    pub keep_label: String,
    pub drop_label: String,
    pub distance: usize,
    /// `1 - distance / longer label length`, in [0, 1].
    pub similarity: f64,
}

/// Near-duplicate node pairs, using the length-based edit budget of each label.
pub fn find_duplicate_candidates(graph: &Graph) -> Vec<DuplicateCandidate> {
    let index = SimilarityIndex::from_nodes(&graph.nodes);
    let position: std::collections::HashMap<&str, usize> = graph
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    let mut seen: HashSet<(usize, usize)> = HashSet::new();
    let mut candidates = Vec::new();

    for (pos, node) in graph.nodes.iter().enumerate() {
        for m in index.find_similar(&node.label, auto_max_distance(&node.label)) {
            let Some(&other) = position.get(m.id.as_str()) else {
                continue;
            };
            if other == pos {
                continue;
            }
            let (keep, drop) = (pos.min(other), pos.max(other));
            if !seen.insert((keep, drop)) {
                continue;
            }
            let (keep_node, drop_node) = (&graph.nodes[keep], &graph.nodes[drop]);
            let longest = normalize_label(&keep_node.label)
                .chars()
                .count()
                .max(normalize_label(&drop_node.label).chars().count())
                .max(1);
            candidates.push(DuplicateCandidate {
                keep: keep_node.id.clone(),
                drop: drop_node.id.clone(),
                keep_label: keep_node.label.clone(),
                drop_label: drop_node.label.clone(),
                distance: m.distance,
                similarity: 1.0 - m.distance as f64 / longest as f64,
            });
        }
    }

    candidates.sort_by(|a, b| {
        a.distance
            .cmp(&b.distance)
            .then_with(|| position[a.keep.as_str()].cmp(&position[b.keep.as_str()]))
            .then_with(|| position[a.drop.as_str()].cmp(&position[b.drop.as_str()]))
    });
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> SimilarityIndex {
        let mut index = SimilarityIndex::new();
        index.insert("Roman Dmowski", "dmowski");
        index.insert("Liga Narodowa", "liga");
        index.insert("Liga Polska", "liga_polska");
        index.insert("Endecja", "endecja");
        index
    }

    #[test]
    fn exact_query_matches_at_distance_zero() {
        let results = index().find_similar("Liga Narodowa", 0);
        assert_eq!(
            results,
            vec![SimilarityMatch {
                id: "liga".into(),
                label: "Liga Narodowa".into(),
                distance: 0,
            }]
        );
    }

    #[test]
    fn query_is_normalized() {
        let results = index().find_similar("  ROMAN DMOWSKI ", 0);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "dmowski");
    }

    #[test]
    fn typo_within_budget() {
        let results = index().find_similar("Roman Dmowsky", 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].distance, 1);
        assert!(index().find_similar("Roman Dmowsky", 0).is_empty());
    }

    #[test]
    fn results_sorted_by_distance() {
        let mut index = index();
        index.insert("Endecia", "endecia");
        let results = index.find_similar("Endecja", 2);
        let ids: Vec<&str> = results.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["endecja", "endecia"]);
    }

    #[test]
    fn empty_query_and_empty_index() {
        assert!(SimilarityIndex::new().find_similar("anything", 3).is_empty());
        assert!(index().find_similar("", 2).is_empty());
    }

    #[test]
    fn composed_and_decomposed_forms_share_key() {
        let mut index = SimilarityIndex::new();
        index.insert("Wło\u{0301}cławek", "decomposed");
        let results = index.find_similar("Włócławek", 0);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn same_key_holds_multiple_ids() {
        let mut index = SimilarityIndex::new();
        index.insert("Piłsudski", "a");
        index.insert("piłsudski", "b");
        index.insert("Piłsudski", "a");
        assert_eq!(index.len(), 2);
        assert_eq!(index.find_similar("Piłsudski", 0).len(), 2);
    }

    #[test]
    fn auto_distance_by_char_length() {
        assert_eq!(auto_max_distance("ONR"), 0);
        assert_eq!(auto_max_distance("Łódź"), 1);
        assert_eq!(auto_max_distance("Dmowski"), 2);
    }

    #[test]
    fn duplicate_candidates_pair_near_labels() {
        let mut graph = Graph::new();
        graph.nodes = vec![
            Node::new("a", "Roman Dmowski"),
            Node::new("b", "Liga Narodowa"),
            Node::new("c", "Roman Dmowsky"),
        ];
        let candidates = find_duplicate_candidates(&graph);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].keep, "a");
        assert_eq!(candidates[0].drop, "c");
        assert_eq!(candidates[0].distance, 1);
        assert!(candidates[0].similarity > 0.9);
    }
}
