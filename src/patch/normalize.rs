//! Coercion of loosely-typed patch entries into canonical values.
//!
//! Each legacy shape has exactly one coercion function. Whatever cannot be
//! coerced is dropped, never stored half-parsed. Past this module no
//! ambiguity remains: a field is either a canonical value or absent.

use crate::graph::{
    Certainty, Edge, EdgeSign, Existence, Node, NodeType, RegionInfo, RelationType, Role,
    SourceCitation, SourceKind, TemporalFact, Visibility,
};

use super::{EntryRejection, Loose, PatchEdge, PatchNode, RegionInput, SourceInput, TemporalInput};

/// Longest bare-string source label kept as-is.
const LEGACY_LABEL_MAX: usize = 50;
/// Characters kept before the ellipsis when a legacy label is truncated.
const LEGACY_LABEL_KEEP: usize = 47;

/// A patch node with every field in canonical form. `None` means the patch
/// does not touch that field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedNode {
    pub id: String,
    pub label: Option<String>,
    pub node_type: Option<NodeType>,
    pub description: Option<String>,
    pub validity: Option<TemporalFact>,
    pub region: Option<RegionInfo>,
    pub existence: Option<Vec<Existence>>,
    pub roles: Option<Vec<Role>>,
    pub importance: Option<f64>,
    pub certainty: Option<Certainty>,
    pub confidence_score: Option<f64>,
    pub sources: Option<Vec<SourceCitation>>,
}

impl NormalizedNode {
    /// Overwrite the node's fields that this entry defines.
    pub fn apply_to(&self, node: &mut Node) {
        if let Some(label) = &self.label {
            node.label = label.clone();
        }
        if let Some(node_type) = self.node_type {
            node.node_type = node_type;
        }
        if let Some(description) = &self.description {
            node.description = Some(description.clone());
        }
        if let Some(validity) = &self.validity {
            node.validity = Some(validity.clone());
        }
        if let Some(region) = &self.region {
            node.region = Some(region.clone());
        }
        if let Some(existence) = &self.existence {
            node.existence = existence.clone();
        }
        if let Some(roles) = &self.roles {
            node.roles = roles.clone();
        }
        if let Some(importance) = self.importance {
            node.importance = Some(importance);
        }
        if let Some(certainty) = self.certainty {
            node.certainty = certainty;
        }
        if let Some(confidence) = self.confidence_score {
            node.confidence_score = Some(confidence);
        }
        if let Some(sources) = &self.sources {
            node.sources = sources.clone();
        }
    }

    /// A fresh node: label falls back to the id, type and certainty to their defaults.
    pub fn to_node(&self) -> Node {
        let mut node = Node::new(self.id.clone(), self.id.clone());
        self.apply_to(&mut node);
        node
    }
}

/// A patch edge with canonical fields and present endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEdge {
    pub id: Option<String>,
    pub source: String,
    pub target: String,
    pub relation_type: RelationType,
    pub label: Option<String>,
    pub temporal: Option<TemporalFact>,
    pub sign: Option<EdgeSign>,
    pub visibility: Option<Visibility>,
    pub certainty: Option<Certainty>,
    pub confidence_score: Option<f64>,
    pub sources: Option<Vec<SourceCitation>>,
}

impl NormalizedEdge {
    pub fn into_edge(self, id: String) -> Edge {
        let mut edge = Edge::new(id, self.source, self.target, self.relation_type);
        edge.label = self.label;
        edge.temporal = self.temporal;
        edge.sign = self.sign;
        edge.visibility = self.visibility;
        edge.certainty = self.certainty.unwrap_or_default();
        edge.confidence_score = self.confidence_score;
        edge.sources = self.sources.unwrap_or_default();
        edge
    }
}

// ---------------------------------------------------------------------------
// Entry normalization
// ---------------------------------------------------------------------------

/// Normalize node entry `index`. Fails only when no usable id is present.
pub fn normalize_node(index: usize, raw: &PatchNode) -> Result<NormalizedNode, EntryRejection> {
    let id = text(raw.id.as_ref()).ok_or(EntryRejection::NodeWithoutId { index })?;

    Ok(NormalizedNode {
        id,
        label: text(raw.label.as_ref()),
        node_type: text(raw.node_type.as_ref()).and_then(|t| NodeType::parse_lenient(&t)),
        description: text(raw.description.as_ref()),
        validity: coerce_temporal(
            raw.validity.as_ref(),
            raw.dates.as_ref(),
            raw.year.as_ref().and_then(Loose::as_valid).copied(),
        ),
        region: coerce_region(raw.region.as_ref()),
        existence: raw.existence.as_ref().and_then(Loose::as_valid).cloned(),
        roles: raw.roles.as_ref().and_then(Loose::as_valid).cloned(),
        importance: number(raw.importance.as_ref()),
        certainty: raw.certainty.as_ref().and_then(Loose::as_valid).copied(),
        confidence_score: coerce_confidence(raw.confidence_score.as_ref()),
        sources: coerce_sources(raw.sources.as_ref()),
    })
}

/// Normalize edge entry `index`. Fails when source or target is missing.
///
/// An unknown relation name maps to `related_to`; the raw text becomes the
/// edge label unless the entry has its own.
pub fn normalize_edge(index: usize, raw: &PatchEdge) -> Result<NormalizedEdge, EntryRejection> {
    let (Some(source), Some(target)) = (text(raw.source.as_ref()), text(raw.target.as_ref())) else {
        return Err(EntryRejection::EdgeWithoutEndpoint { index });
    };

    let mut label = text(raw.label.as_ref());
    let relation_type = match text(raw.relation_type.as_ref()) {
        Some(name) => match RelationType::parse_lenient(&name) {
            Some(relation) => relation,
            None => {
                if label.is_none() {
                    label = Some(name);
                }
                RelationType::RelatedTo
            }
        },
        None => RelationType::RelatedTo,
    };

    let legacy_span = match (
        number(raw.valid_from.as_ref()),
        number(raw.valid_to.as_ref()),
    ) {
        (Some(from), Some(to)) if from <= to => TemporalFact::from_year(from)
            .zip(TemporalFact::from_year(to))
            .map(|(start, end)| TemporalFact::interval(start.to_string(), end.to_string())),
        (Some(from), _) => TemporalFact::from_year(from),
        _ => None,
    };
    let temporal = coerce_temporal(raw.temporal.as_ref(), raw.dates.as_ref(), None).or(legacy_span);

    Ok(NormalizedEdge {
        id: text(raw.id.as_ref()),
        source,
        target,
        relation_type,
        label,
        temporal,
        sign: raw.sign.as_ref().and_then(Loose::as_valid).copied(),
        visibility: raw.visibility.as_ref().and_then(Loose::as_valid).copied(),
        certainty: raw.certainty.as_ref().and_then(Loose::as_valid).copied(),
        confidence_score: coerce_confidence(raw.confidence_score.as_ref()),
        sources: coerce_sources(raw.sources.as_ref()),
    })
}

// ---------------------------------------------------------------------------
// Field coercions
// ---------------------------------------------------------------------------

/// Trimmed non-empty string.
fn text(raw: Option<&Loose<String>>) -> Option<String> {
    raw.and_then(Loose::as_valid)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn number(raw: Option<&Loose<f64>>) -> Option<f64> {
    raw.and_then(Loose::as_valid).copied().filter(|v| v.is_finite())
}

/// Confidence in [0, 1].
pub fn coerce_confidence(raw: Option<&Loose<f64>>) -> Option<f64> {
    number(raw).map(|v| v.clamp(0.0, 1.0))
}

/// One temporal input of any accepted shape.
pub fn coerce_temporal_input(input: &TemporalInput) -> Option<TemporalFact> {
    match input {
        TemporalInput::Structured(fact) => Some(fact.clone()).filter(TemporalFact::is_well_formed),
        TemporalInput::Text(text) => TemporalFact::parse_text(text),
        TemporalInput::Year(year) => TemporalFact::from_year(*year),
        TemporalInput::Malformed(_) => None,
    }
}

/// First usable value among the structured field, the legacy date string,
/// and the legacy year, in that order.
pub fn coerce_temporal(
    primary: Option<&TemporalInput>,
    dates: Option<&Loose<String>>,
    year: Option<f64>,
) -> Option<TemporalFact> {
    primary
        .and_then(coerce_temporal_input)
        .or_else(|| dates.and_then(Loose::as_valid).and_then(|d| TemporalFact::parse_text(d)))
        .or_else(|| year.and_then(TemporalFact::from_year))
}

/// Citation for a bare string source.
pub fn legacy_citation(uri: &str) -> SourceCitation {
    let label = if uri.chars().count() > LEGACY_LABEL_MAX {
        let kept: String = uri.chars().take(LEGACY_LABEL_KEEP).collect();
        format!("{kept}...")
    } else {
        uri.to_string()
    };
    SourceCitation {
        label: Some(label),
        kind: Some(SourceKind::Website),
        ..SourceCitation::new(uri)
    }
}

/// Citations from a mixed list. Entries without a uri are dropped; a list
/// that ends up empty means "no change".
pub fn coerce_sources(raw: Option<&Loose<Vec<SourceInput>>>) -> Option<Vec<SourceCitation>> {
    let list = raw.and_then(Loose::as_valid)?;
    let sources: Vec<SourceCitation> = list
        .iter()
        .filter_map(|entry| match entry {
            SourceInput::Citation(c) if !c.uri.trim().is_empty() => Some(c.clone()),
            SourceInput::Uri(uri) if !uri.trim().is_empty() => Some(legacy_citation(uri.trim())),
            _ => None,
        })
        .collect();
    (!sources.is_empty()).then_some(sources)
}

/// Region from a structured value or a bare name (`"Wielkopolska"` becomes
/// `{id: "wielkopolska", label: "Wielkopolska"}`).
pub fn coerce_region(raw: Option<&RegionInput>) -> Option<RegionInfo> {
    match raw? {
        RegionInput::Structured(region) if !region.id.trim().is_empty() => Some(region.clone()),
        RegionInput::Name(name) if !name.trim().is_empty() => {
            let label = name.trim();
            let id = label
                .to_lowercase()
                .chars()
                .map(|c| if c.is_whitespace() { '_' } else { c })
                .collect();
            Some(RegionInfo {
                id,
                label: label.to_string(),
                country: None,
                coordinates: None,
                kind: None,
            })
        }
        _ => None,
    }
}
