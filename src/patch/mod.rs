//! Graph patches: proposed node and edge changes from outside the engine.
//!
//! Patch entries arrive from AI extraction, document import, or manual forms
//! and are loosely typed: a temporal value may be a structured fact, a
//! `"1918-1939"` string, or a bare year number; a source may be a citation
//! object or a bare URL. Every such field is an untagged union here, so an
//! entry with one malformed field still parses and only that field is lost.
//!
//! - [`normalize`]: one coercion per legacy shape, producing canonical values
//! - [`conflict`]: field-level divergence between a patch and the graph
//! - [`reconcile`]: the merge itself

pub mod conflict;
pub mod normalize;
pub mod reconcile;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::PatchError;
use crate::graph::{
    Certainty, EdgeSign, Existence, RegionInfo, RelationType, Role, SourceCitation, TemporalFact,
    Visibility,
};

pub use conflict::{Conflict, ConflictField, Resolution, Resolutions};
pub use normalize::{NormalizedEdge, NormalizedNode};
pub use reconcile::{
    PossibleDuplicate, PreparedPatch, ReconcileOptions, ReconcileReport, Reconciliation,
};

/// Result type for patch parsing.
pub type PatchResult<T> = std::result::Result<T, PatchError>;

// ---------------------------------------------------------------------------
// Tolerant field shapes
// ---------------------------------------------------------------------------

/// A field that either has the expected type or is kept as raw JSON and
/// ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Loose<T> {
    Valid(T),
    Invalid(Value),
}

impl<T> Loose<T> {
    pub fn as_valid(&self) -> Option<&T> {
        match self {
            Loose::Valid(v) => Some(v),
            Loose::Invalid(_) => None,
        }
    }
}

impl<T> From<T> for Loose<T> {
    fn from(value: T) -> Self {
        Loose::Valid(value)
    }
}

/// Accepted shapes of a temporal value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemporalInput {
    Structured(TemporalFact),
    Text(String),
    Year(f64),
    Malformed(Value),
}

/// Accepted shapes of one source entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceInput {
    Citation(SourceCitation),
    Uri(String),
    Malformed(Value),
}

/// Accepted shapes of a region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegionInput {
    Structured(RegionInfo),
    Name(String),
    Malformed(Value),
}

// ---------------------------------------------------------------------------
// Patch entries
// ---------------------------------------------------------------------------

/// A partial node record. Absent fields leave the existing node untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PatchNode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Loose<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<Loose<String>>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub node_type: Option<Loose<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Loose<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validity: Option<TemporalInput>,
    /// Legacy free-form date string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dates: Option<Loose<String>>,
    /// Legacy bare year.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<Loose<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<RegionInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existence: Option<Loose<Vec<Existence>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Loose<Vec<Role>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub importance: Option<Loose<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certainty: Option<Loose<Certainty>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<Loose<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Loose<Vec<SourceInput>>>,
}

impl PatchNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(Loose::Valid(id.into())),
            ..Self::default()
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(Loose::Valid(label.into()));
        self
    }

    pub fn node_type(mut self, node_type: impl Into<String>) -> Self {
        self.node_type = Some(Loose::Valid(node_type.into()));
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(Loose::Valid(description.into()));
        self
    }

    pub fn validity(mut self, validity: TemporalFact) -> Self {
        self.validity = Some(TemporalInput::Structured(validity));
        self
    }

    pub fn dates(mut self, dates: impl Into<String>) -> Self {
        self.dates = Some(Loose::Valid(dates.into()));
        self
    }

    pub fn region_name(mut self, name: impl Into<String>) -> Self {
        self.region = Some(RegionInput::Name(name.into()));
        self
    }

    pub fn source_uri(mut self, uri: impl Into<String>) -> Self {
        let entry = SourceInput::Uri(uri.into());
        match &mut self.sources {
            Some(Loose::Valid(list)) => list.push(entry),
            _ => self.sources = Some(Loose::Valid(vec![entry])),
        }
        self
    }
}

/// A partial edge record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PatchEdge {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Loose<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Loose<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<Loose<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relation_type: Option<Loose<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<Loose<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporal: Option<TemporalInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dates: Option<Loose<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<Loose<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<Loose<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sign: Option<Loose<EdgeSign>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Loose<Visibility>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certainty: Option<Loose<Certainty>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<Loose<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Loose<Vec<SourceInput>>>,
}

impl PatchEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>, relation: RelationType) -> Self {
        Self {
            source: Some(Loose::Valid(source.into())),
            target: Some(Loose::Valid(target.into())),
            relation_type: Some(Loose::Valid(relation.as_str().to_string())),
            ..Self::default()
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(Loose::Valid(id.into()));
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(Loose::Valid(label.into()));
        self
    }

    pub fn sign(mut self, sign: EdgeSign) -> Self {
        self.sign = Some(Loose::Valid(sign));
        self
    }

    pub fn temporal(mut self, temporal: TemporalFact) -> Self {
        self.temporal = Some(TemporalInput::Structured(temporal));
        self
    }
}

/// Why a patch entry was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryRejection {
    #[error("node entry {index} is not an object")]
    NodeNotObject { index: usize },
    #[error("edge entry {index} is not an object")]
    EdgeNotObject { index: usize },
    #[error("node entry {index} has no usable id")]
    NodeWithoutId { index: usize },
    #[error("edge entry {index} has no usable source or target")]
    EdgeWithoutEndpoint { index: usize },
}

// ---------------------------------------------------------------------------
// Patch document
// ---------------------------------------------------------------------------

/// Where a patch came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchKind {
    Expansion,
    Deepening,
    DocumentIngestion,
    #[default]
    Manual,
}

/// A bundle of proposed changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphPatch {
    #[serde(rename = "type", default)]
    pub kind: PatchKind,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub nodes: Vec<PatchNode>,
    #[serde(default)]
    pub edges: Vec<PatchEdge>,
    /// Entries dropped while parsing because they were not objects.
    #[serde(skip)]
    pub skipped: Vec<EntryRejection>,
}

impl GraphPatch {
    pub fn new(nodes: Vec<PatchNode>, edges: Vec<PatchEdge>) -> Self {
        Self {
            nodes,
            edges,
            ..Self::default()
        }
    }

    /// Parse a patch document, skipping malformed entries individually.
    ///
    /// Accepts `{ "type", "reasoning", "nodes": [...], "edges": [...] }` or
    /// a bare array of node entries. Only unparsable JSON or a document of
    /// any other shape is an error.
    pub fn from_json_lenient(text: &str) -> PatchResult<Self> {
        let value: Value = serde_json::from_str(text).map_err(|e| PatchError::Parse {
            message: e.to_string(),
        })?;

        let mut patch = GraphPatch::default();
        let (nodes, edges) = match value {
            Value::Array(nodes) => (nodes, Vec::new()),
            Value::Object(mut map) => {
                patch.kind = map
                    .remove("type")
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default();
                patch.reasoning = map
                    .remove("reasoning")
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default();
                let take = |map: &mut serde_json::Map<String, Value>, key: &str| match map.remove(key) {
                    Some(Value::Array(items)) => items,
                    _ => Vec::new(),
                };
                (take(&mut map, "nodes"), take(&mut map, "edges"))
            }
            _ => {
                return Err(PatchError::Shape {
                    expected: "an object or an array of nodes".into(),
                });
            }
        };

        for (index, raw) in nodes.into_iter().enumerate() {
            match serde_json::from_value::<PatchNode>(raw) {
                Ok(node) => patch.nodes.push(node),
                Err(err) => {
                    tracing::debug!(index, error = %err, "skipping malformed node entry");
                    patch.skipped.push(EntryRejection::NodeNotObject { index });
                }
            }
        }
        for (index, raw) in edges.into_iter().enumerate() {
            match serde_json::from_value::<PatchEdge>(raw) {
                Ok(edge) => patch.edges.push(edge),
                Err(err) => {
                    tracing::debug!(index, error = %err, "skipping malformed edge entry");
                    patch.skipped.push(EntryRejection::EdgeNotObject { index });
                }
            }
        }
        Ok(patch)
    }
}
