//! Field-level conflicts between a patch and the current graph.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PatchError;
use crate::graph::{Graph, Node, NodeType};

use super::NormalizedNode;

/// Node fields that are checked for conflicting values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictField {
    Label,
    Type,
    Description,
    Validity,
    Region,
}

impl ConflictField {
    pub const ALL: [ConflictField; 5] = [
        ConflictField::Label,
        ConflictField::Type,
        ConflictField::Description,
        ConflictField::Validity,
        ConflictField::Region,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConflictField::Label => "label",
            ConflictField::Type => "type",
            ConflictField::Description => "description",
            ConflictField::Validity => "validity",
            ConflictField::Region => "region",
        }
    }
}

impl std::fmt::Display for ConflictField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node field where the patch proposes a different non-empty value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub entity_id: String,
    pub entity_label: String,
    pub field: ConflictField,
    pub existing_value: Value,
    pub proposed_value: Value,
}

impl Conflict {
    /// Key used in a [`Resolutions`] map: `"{entity_id}-{field}"`.
    pub fn key(&self) -> String {
        conflict_key(&self.entity_id, self.field)
    }
}

pub(crate) fn conflict_key(entity_id: &str, field: ConflictField) -> String {
    format!("{entity_id}-{}", field.as_str())
}

/// Which side wins a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Existing,
    Proposed,
}

impl FromStr for Resolution {
    type Err = PatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "existing" | "keep" => Ok(Resolution::Existing),
            "proposed" | "accept" => Ok(Resolution::Proposed),
            _ => Err(PatchError::InvalidResolution {
                input: s.to_string(),
            }),
        }
    }
}

/// Resolutions keyed by [`Conflict::key`].
pub type Resolutions = HashMap<String, Resolution>;

/// Current and proposed value of `field` as JSON, `null` when absent.
///
/// A label equal to the node id and the default type are placeholders from
/// node creation, so they count as absent on the existing side.
fn field_values(node: &Node, entry: &NormalizedNode, field: ConflictField) -> (Value, Value) {
    let json = |v: Option<Value>| v.unwrap_or(Value::Null);
    match field {
        ConflictField::Label => (
            json((node.label != node.id).then(|| Value::String(node.label.clone()))),
            json(entry.label.clone().map(Value::String)),
        ),
        ConflictField::Type => (
            json(
                (node.node_type != NodeType::default())
                    .then(|| Value::String(node.node_type.as_str().to_string())),
            ),
            json(entry.node_type.map(|t| Value::String(t.as_str().to_string()))),
        ),
        ConflictField::Description => (
            json(node.description.clone().map(Value::String)),
            json(entry.description.clone().map(Value::String)),
        ),
        ConflictField::Validity => (
            json(node.validity.as_ref().and_then(|v| serde_json::to_value(v).ok())),
            json(entry.validity.as_ref().and_then(|v| serde_json::to_value(v).ok())),
        ),
        ConflictField::Region => (
            json(node.region.as_ref().and_then(|r| serde_json::to_value(r).ok())),
            json(entry.region.as_ref().and_then(|r| serde_json::to_value(r).ok())),
        ),
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Conflicts between `entries` and the nodes they target.
///
/// Only entries whose id already exists are checked, and a field conflicts
/// only when both sides are non-empty and different. Output follows entry
/// order, then field order.
pub fn detect_conflicts(graph: &Graph, entries: &[NormalizedNode]) -> Vec<Conflict> {
    let mut conflicts = Vec::new();
    for entry in entries {
        let Some(node) = graph.node(&entry.id) else {
            continue;
        };
        for field in ConflictField::ALL {
            let (existing, proposed) = field_values(node, entry, field);
            if is_empty_value(&existing) || is_empty_value(&proposed) || existing == proposed {
                continue;
            }
            conflicts.push(Conflict {
                entity_id: node.id.clone(),
                entity_label: node.label.clone(),
                field,
                existing_value: existing,
                proposed_value: proposed,
            });
        }
    }
    conflicts
}

/// Drop every conflicting field of `entry` that is not explicitly resolved
/// to the proposed value.
pub(crate) fn strip_unaccepted(
    entry: &mut NormalizedNode,
    conflicts: &[Conflict],
    resolutions: &Resolutions,
) -> (usize, usize) {
    let mut kept_existing = 0;
    let mut accepted = 0;
    for conflict in conflicts.iter().filter(|c| c.entity_id == entry.id) {
        if resolutions.get(&conflict.key()) == Some(&Resolution::Proposed) {
            accepted += 1;
            continue;
        }
        kept_existing += 1;
        match conflict.field {
            ConflictField::Label => entry.label = None,
            ConflictField::Type => entry.node_type = None,
            ConflictField::Description => entry.description = None,
            ConflictField::Validity => entry.validity = None,
            ConflictField::Region => entry.region = None,
        }
    }
    (kept_existing, accepted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::TemporalFact;

    fn graph() -> Graph {
        let mut graph = Graph::new();
        graph.nodes = vec![
            Node::new("dmowski", "Roman Dmowski")
                .with_type(NodeType::Person)
                .with_description("Politician")
                .with_validity(TemporalFact::interval("1864", "1939")),
            Node::new("liga", "Liga Narodowa"),
        ];
        graph
    }

    fn entry(id: &str) -> NormalizedNode {
        NormalizedNode {
            id: id.to_string(),
            ..NormalizedNode::default()
        }
    }

    #[test]
    fn differing_fields_conflict() {
        let proposed = NormalizedNode {
            label: Some("R. Dmowski".into()),
            description: Some("Statesman".into()),
            node_type: Some(NodeType::Person),
            ..entry("dmowski")
        };
        let conflicts = detect_conflicts(&graph(), &[proposed]);
        let fields: Vec<ConflictField> = conflicts.iter().map(|c| c.field).collect();
        assert_eq!(fields, vec![ConflictField::Label, ConflictField::Description]);
        assert_eq!(conflicts[0].key(), "dmowski-label");
        assert_eq!(conflicts[1].existing_value, Value::String("Politician".into()));
    }

    #[test]
    fn empty_sides_do_not_conflict() {
        let proposed = NormalizedNode {
            description: Some("Secret society".into()),
            ..entry("liga")
        };
        assert!(detect_conflicts(&graph(), &[proposed]).is_empty());
        assert!(detect_conflicts(&graph(), &[entry("dmowski")]).is_empty());
    }

    #[test]
    fn placeholder_label_and_type_do_not_conflict() {
        let mut graph = graph();
        graph.nodes.push(Node::new("sn", "sn"));
        let proposed = NormalizedNode {
            label: Some("Stronnictwo Narodowe".into()),
            node_type: Some(NodeType::Organization),
            ..entry("sn")
        };
        assert!(detect_conflicts(&graph, &[proposed]).is_empty());

        let retyped = NormalizedNode {
            node_type: Some(NodeType::Organization),
            ..entry("dmowski")
        };
        let conflicts = detect_conflicts(&graph, &[retyped]);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].field, ConflictField::Type);
    }

    #[test]
    fn new_entities_never_conflict() {
        let proposed = NormalizedNode {
            label: Some("Someone".into()),
            ..entry("unknown")
        };
        assert!(detect_conflicts(&graph(), &[proposed]).is_empty());
    }

    #[test]
    fn structured_validity_compares_by_value() {
        let same = NormalizedNode {
            validity: Some(TemporalFact::interval("1864", "1939")),
            ..entry("dmowski")
        };
        assert!(detect_conflicts(&graph(), &[same]).is_empty());

        let different = NormalizedNode {
            validity: Some(TemporalFact::instant("1864")),
            ..entry("dmowski")
        };
        let conflicts = detect_conflicts(&graph(), &[different]);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].field, ConflictField::Validity);
    }

    #[test]
    fn unresolved_conflicts_keep_existing() {
        let mut proposed = NormalizedNode {
            label: Some("R. Dmowski".into()),
            description: Some("Statesman".into()),
            ..entry("dmowski")
        };
        let conflicts = detect_conflicts(&graph(), std::slice::from_ref(&proposed));
        let mut resolutions = Resolutions::new();
        resolutions.insert("dmowski-description".into(), Resolution::Proposed);

        let (kept, accepted) = strip_unaccepted(&mut proposed, &conflicts, &resolutions);
        assert_eq!((kept, accepted), (1, 1));
        assert_eq!(proposed.label, None);
        assert_eq!(proposed.description.as_deref(), Some("Statesman"));
    }

    #[test]
    fn resolution_parses_from_text() {
        assert_eq!("Proposed".parse::<Resolution>().unwrap(), Resolution::Proposed);
        assert_eq!("existing".parse::<Resolution>().unwrap(), Resolution::Existing);
        assert!(matches!(
            "maybe".parse::<Resolution>(),
            Err(PatchError::InvalidResolution { .. })
        ));
    }
}
