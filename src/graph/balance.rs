//! Structural balance of the signed graph.
//!
//! Heider balance: a triangle is balanced when the product of its three edge
//! signs is positive. Only explicit or inferred `negative` signs count as -1;
//! neutral edges count as positive.

use std::collections::HashMap;

use super::{Edge, EdgeSign, Graph};

/// Keywords that mark a relation as conflictual when no explicit sign is set.
pub const DEFAULT_NEGATIVE_KEYWORDS: &[&str] = &[
    "conflict", "rival", "anti", "against", "enemy", "opponent", "fight", "konflikt", "rywal",
    "przeciw", "wro", "oppos",
];

/// Balance estimate over the sampled triads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalanceReport {
    /// Fraction of balanced triangles; 1.0 when there are none.
    pub balance: f64,
    pub triangles: usize,
    pub balanced: usize,
    /// Nodes considered (the first `cap` in node order).
    pub sampled_nodes: usize,
}

/// The edge's explicit sign, or one inferred from its label (falling back to
/// the relation name) by keyword match.
pub fn infer_sign<S: AsRef<str>>(edge: &Edge, negative_keywords: &[S]) -> EdgeSign {
    if let Some(sign) = edge.sign {
        return sign;
    }
    let text = edge
        .label
        .as_deref()
        .filter(|l| !l.trim().is_empty())
        .unwrap_or(edge.relation_type.as_str())
        .to_lowercase();
    let negative = negative_keywords
        .iter()
        .map(|k| k.as_ref().to_lowercase())
        .any(|k| !k.is_empty() && text.contains(&k));
    if negative {
        EdgeSign::Negative
    } else {
        EdgeSign::Positive
    }
}

/// Resolve every edge's sign, in edge order.
pub fn resolve_signs<S: AsRef<str>>(graph: &Graph, negative_keywords: &[S]) -> Vec<EdgeSign> {
    graph
        .edges
        .iter()
        .map(|e| infer_sign(e, negative_keywords))
        .collect()
}

/// Fraction of balanced triangles among the first `cap` nodes.
///
/// `signs[i]` is the sign of `graph.edges[i]`. Direction is ignored; a pair
/// joined by several edges is negative when any of them is.
pub fn triadic_balance(graph: &Graph, signs: &[EdgeSign], cap: usize) -> BalanceReport {
    let limit = graph.nodes.len().min(cap);
    let positions: HashMap<&str, usize> = graph.nodes[..limit]
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    let mut pairs: HashMap<(usize, usize), i8> = HashMap::new();
    for (edge, sign) in graph.edges.iter().zip(signs) {
        let (Some(&a), Some(&b)) = (
            positions.get(edge.source.as_str()),
            positions.get(edge.target.as_str()),
        ) else {
            continue;
        };
        if a == b {
            continue;
        }
        let factor = sign.factor();
        pairs
            .entry((a.min(b), a.max(b)))
            .and_modify(|f| *f = (*f).min(factor))
            .or_insert(factor);
    }

    let mut triangles = 0;
    let mut balanced = 0;
    for i in 0..limit {
        for j in (i + 1)..limit {
            let Some(&ij) = pairs.get(&(i, j)) else {
                continue;
            };
            for k in (j + 1)..limit {
                let (Some(&jk), Some(&ik)) = (pairs.get(&(j, k)), pairs.get(&(i, k))) else {
                    continue;
                };
                triangles += 1;
                if ij * jk * ik > 0 {
                    balanced += 1;
                }
            }
        }
    }

    BalanceReport {
        balance: if triangles == 0 {
            1.0
        } else {
            balanced as f64 / triangles as f64
        },
        triangles,
        balanced,
        sampled_nodes: limit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Node, RelationType};

    fn triangle(signs: [Option<EdgeSign>; 3]) -> Graph {
        let mut graph = Graph::new();
        graph.nodes = vec![Node::new("a", "A"), Node::new("b", "B"), Node::new("c", "C")];
        let pairs = [("a", "b"), ("b", "c"), ("c", "a")];
        for (i, ((s, t), sign)) in pairs.into_iter().zip(signs).enumerate() {
            let mut edge = Edge::new(format!("e{i}"), s, t, RelationType::RelatedTo);
            edge.sign = sign;
            graph.edges.push(edge);
        }
        graph
    }

    fn balance_of(graph: &Graph) -> BalanceReport {
        let signs = resolve_signs(graph, DEFAULT_NEGATIVE_KEYWORDS);
        triadic_balance(graph, &signs, 100)
    }

    #[test]
    fn all_positive_triangle_is_balanced() {
        let report = balance_of(&triangle([None, None, None]));
        assert_eq!(report.triangles, 1);
        assert_eq!(report.balance, 1.0);
    }

    #[test]
    fn enemy_of_my_enemy_is_balanced() {
        let n = Some(EdgeSign::Negative);
        let report = balance_of(&triangle([n, n, Some(EdgeSign::Positive)]));
        assert_eq!(report.balance, 1.0);
    }

    #[test]
    fn single_negative_edge_is_unbalanced() {
        let report = balance_of(&triangle([Some(EdgeSign::Negative), None, None]));
        assert_eq!(report.triangles, 1);
        assert_eq!(report.balanced, 0);
        assert_eq!(report.balance, 0.0);
    }

    #[test]
    fn neutral_counts_as_positive() {
        let report = balance_of(&triangle([Some(EdgeSign::Neutral), None, None]));
        assert_eq!(report.balance, 1.0);
    }

    #[test]
    fn no_edges_is_fully_balanced() {
        let mut graph = Graph::new();
        graph.nodes = vec![Node::new("a", "A"), Node::new("b", "B")];
        let report = balance_of(&graph);
        assert_eq!(report.triangles, 0);
        assert_eq!(report.balance, 1.0);
    }

    #[test]
    fn cap_limits_sampled_nodes() {
        let graph = triangle([None, None, None]);
        let signs = resolve_signs(&graph, DEFAULT_NEGATIVE_KEYWORDS);
        let report = triadic_balance(&graph, &signs, 2);
        assert_eq!(report.sampled_nodes, 2);
        assert_eq!(report.triangles, 0);
        assert_eq!(report.balance, 1.0);
    }

    #[test]
    fn infers_negative_from_label_then_relation() {
        let opposed = Edge::new("e", "a", "b", RelationType::Opposed);
        assert_eq!(infer_sign(&opposed, DEFAULT_NEGATIVE_KEYWORDS), EdgeSign::Negative);

        let rivalry = Edge::new("e", "a", "b", RelationType::RelatedTo).with_label("bitter rivalry");
        assert_eq!(infer_sign(&rivalry, DEFAULT_NEGATIVE_KEYWORDS), EdgeSign::Negative);

        let founded = Edge::new("e", "a", "b", RelationType::Founded);
        assert_eq!(infer_sign(&founded, DEFAULT_NEGATIVE_KEYWORDS), EdgeSign::Positive);

        let explicit = Edge::new("e", "a", "b", RelationType::Opposed).with_sign(EdgeSign::Positive);
        assert_eq!(infer_sign(&explicit, DEFAULT_NEGATIVE_KEYWORDS), EdgeSign::Positive);
    }
}
