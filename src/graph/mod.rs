//! Historical knowledge graph: the canonical data model.
//!
//! A [`Graph`] is a plain value: a node list, an edge list, and a [`GraphMeta`]
//! block. The engine never mutates a committed graph in place. Every accepted
//! mutation produces a new `Graph` which replaces the current one wholesale,
//! so snapshots held by history or by subscribers stay untouched.
//!
//! Derived metrics ([`NodeMetrics`], edge weights, the analytic parts of
//! [`GraphMeta`]) are readable by anyone but writable only from inside the
//! crate, by [`analytics::enrich`].
//!
//! - [`index`]: petgraph projection used by every algorithm
//! - [`analytics`]: centrality, PageRank, clustering, k-core, global metrics
//! - [`community`]: Louvain community detection
//! - [`balance`]: signed-triad balance and edge sign inference
//! - [`ops`]: pure transforms (merge, update, delete, temporal slice)
//! - [`temporal`]: the [`TemporalFact`] union

pub mod analytics;
pub mod balance;
pub mod community;
pub mod index;
pub mod ops;
pub mod temporal;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

pub use temporal::TemporalFact;

/// Result type for graph operations.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// Schema version written into every persisted document.
///
/// A stored document carrying any other version is discarded and reseeded.
pub const SCHEMA_VERSION: &str = "2.0";

/// Milliseconds since the UNIX epoch.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ---------------------------------------------------------------------------
// Controlled vocabularies
// ---------------------------------------------------------------------------

/// The kind of entity a node represents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Person,
    Organization,
    Event,
    #[default]
    Concept,
    Publication,
    Document,
    Location,
}

impl NodeType {
    pub const ALL: [NodeType; 7] = [
        NodeType::Person,
        NodeType::Organization,
        NodeType::Event,
        NodeType::Concept,
        NodeType::Publication,
        NodeType::Document,
        NodeType::Location,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Person => "person",
            NodeType::Organization => "organization",
            NodeType::Event => "event",
            NodeType::Concept => "concept",
            NodeType::Publication => "publication",
            NodeType::Document => "document",
            NodeType::Location => "location",
        }
    }

    /// Case-insensitive parse; unknown names yield `None`.
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        let wanted = raw.trim().to_lowercase();
        Self::ALL.into_iter().find(|t| t.as_str() == wanted)
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Epistemic status of a node or edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Certainty {
    #[default]
    Confirmed,
    Disputed,
    Alleged,
    Hypothesized,
}

impl Certainty {
    pub fn as_str(self) -> &'static str {
        match self {
            Certainty::Confirmed => "confirmed",
            Certainty::Disputed => "disputed",
            Certainty::Alleged => "alleged",
            Certainty::Hypothesized => "hypothesized",
        }
    }
}

/// Relationship vocabulary for edges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    Founded,
    MemberOf,
    Led,
    Published,
    Influenced,
    Opposed,
    CollaboratedWith,
    ParticipatedIn,
    Created,
    Destroyed,
    #[default]
    RelatedTo,
    Supported,
    Criticized,
    Authored,
    Organized,
}

impl RelationType {
    pub const ALL: [RelationType; 15] = [
        RelationType::Founded,
        RelationType::MemberOf,
        RelationType::Led,
        RelationType::Published,
        RelationType::Influenced,
        RelationType::Opposed,
        RelationType::CollaboratedWith,
        RelationType::ParticipatedIn,
        RelationType::Created,
        RelationType::Destroyed,
        RelationType::RelatedTo,
        RelationType::Supported,
        RelationType::Criticized,
        RelationType::Authored,
        RelationType::Organized,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RelationType::Founded => "founded",
            RelationType::MemberOf => "member_of",
            RelationType::Led => "led",
            RelationType::Published => "published",
            RelationType::Influenced => "influenced",
            RelationType::Opposed => "opposed",
            RelationType::CollaboratedWith => "collaborated_with",
            RelationType::ParticipatedIn => "participated_in",
            RelationType::Created => "created",
            RelationType::Destroyed => "destroyed",
            RelationType::RelatedTo => "related_to",
            RelationType::Supported => "supported",
            RelationType::Criticized => "criticized",
            RelationType::Authored => "authored",
            RelationType::Organized => "organized",
        }
    }

    /// Parse a relation name, accepting any case and space or hyphen separators
    /// (`"Member of"`, `"member-of"`, `"MEMBER_OF"`).
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        let wanted: String = raw
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                c => c.to_ascii_lowercase(),
            })
            .collect();
        Self::ALL.into_iter().find(|r| r.as_str() == wanted)
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sign of a relationship for structural balance analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeSign {
    Positive,
    Negative,
    Neutral,
}

impl EdgeSign {
    /// Multiplicative factor in a triangle product. Neutral counts as positive.
    pub fn factor(self) -> i8 {
        match self {
            EdgeSign::Negative => -1,
            EdgeSign::Positive | EdgeSign::Neutral => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EdgeSign::Positive => "positive",
            EdgeSign::Negative => "negative",
            EdgeSign::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Clandestine,
    Private,
    Restricted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Primary,
    Secondary,
    Archival,
    Memoir,
    Report,
    Website,
    Book,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    City,
    Province,
    Country,
    GeopoliticalEntity,
    HistoricalRegion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistenceStatus {
    Active,
    Latent,
    Defunct,
    Reformed,
    Formed,
    Dissolved,
    Established,
}

// ---------------------------------------------------------------------------
// Structured attributes
// ---------------------------------------------------------------------------

/// A citation backing a node or edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceCitation {
    /// URL, ISBN, or archival reference.
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<SourceKind>,
    /// Milliseconds since epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieved_at: Option<u64>,
}

impl SourceCitation {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            label: None,
            page: None,
            kind: None,
            retrieved_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Structured location reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionInfo {
    /// Stable key such as `warszawa_1934`.
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<RegionKind>,
}

/// An existence period of an organization or movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Existence {
    pub start: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    pub status: ExistenceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// A role a person held, optionally within an organization or event node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    pub start: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

// ---------------------------------------------------------------------------
// Derived metrics
// ---------------------------------------------------------------------------

/// Structural exposure of a node: how fast it reaches others versus how
/// much traffic it brokers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkHealth {
    /// Closeness centrality.
    pub efficiency: f64,
    /// `1 - betweenness`.
    pub safety: f64,
    /// Harmonic mean of efficiency and safety.
    pub balance: f64,
    /// In [0, 1].
    pub vulnerability_score: f64,
    pub identified_issues: Vec<String>,
}

/// Per-node metrics. Every field stays `None` until the metrics engine has
/// run; `None` means "not computed", never zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degree_centrality: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closeness: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub betweenness: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagerank: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clustering: Option<f64>,
    #[serde(
        rename = "louvainCommunity",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub community: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k_core: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_health: Option<NetworkHealth>,
}

impl NodeMetrics {
    pub fn is_empty(&self) -> bool {
        *self == NodeMetrics::default()
    }
}

// ---------------------------------------------------------------------------
// Nodes and edges
// ---------------------------------------------------------------------------

/// An entity in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique within a graph.
    pub id: String,
    pub label: String,
    #[serde(rename = "type", default)]
    pub node_type: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validity: Option<TemporalFact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<RegionInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub existence: Vec<Existence>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<f64>,
    #[serde(default)]
    pub certainty: Certainty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceCitation>,
    #[serde(flatten)]
    pub(crate) metrics: NodeMetrics,
}

impl Node {
    /// A node with default type (concept) and certainty (confirmed).
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            node_type: NodeType::default(),
            description: None,
            validity: None,
            region: None,
            existence: Vec::new(),
            roles: Vec::new(),
            importance: None,
            certainty: Certainty::default(),
            confidence_score: None,
            sources: Vec::new(),
            metrics: NodeMetrics::default(),
        }
    }

    pub fn with_type(mut self, node_type: NodeType) -> Self {
        self.node_type = node_type;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_validity(mut self, validity: TemporalFact) -> Self {
        self.validity = Some(validity);
        self
    }

    pub fn with_region(mut self, region: RegionInfo) -> Self {
        self.region = Some(region);
        self
    }

    /// Metrics computed by the last enrichment.
    pub fn metrics(&self) -> &NodeMetrics {
        &self.metrics
    }
}

/// A directed relationship between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub relation_type: RelationType,
    /// Free-text qualifier ("secretly founded").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal: Option<TemporalFact>,
    /// Explicit sign. `None` is resolved by keyword inference during enrichment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign: Option<EdgeSign>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) weight: Option<f64>,
    #[serde(default)]
    pub certainty: Certainty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceCitation>,
}

impl Edge {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        relation_type: RelationType,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            relation_type,
            label: None,
            temporal: None,
            sign: None,
            visibility: None,
            weight: None,
            certainty: Certainty::default(),
            confidence_score: None,
            sources: Vec::new(),
        }
    }

    pub fn with_sign(mut self, sign: EdgeSign) -> Self {
        self.sign = Some(sign);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Importance-derived weight from the last enrichment.
    pub fn weight(&self) -> Option<f64> {
        self.weight
    }

    /// `(source, target, relation)`: two edges with equal triples are duplicates.
    pub fn triple(&self) -> (&str, &str, RelationType) {
        (&self.source, &self.target, self.relation_type)
    }
}

// ---------------------------------------------------------------------------
// Graph-level metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalMetrics {
    pub density: f64,
    pub transitivity: f64,
    pub number_connected_components: usize,
    pub is_connected: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommunityStructure {
    pub modularity: f64,
    pub num_communities: usize,
    pub largest_community_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InfluenceMetric {
    Pagerank,
    Betweenness,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyInfluencer {
    pub id: String,
    pub label: String,
    pub score: f64,
    pub metric: InfluenceMetric,
}

/// Version, mutation bookkeeping, and graph-wide analytics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMeta {
    pub version: String,
    /// Incremented by every committed mutation.
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub last_modified: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_saved: Option<u64>,
    /// Revision the metrics below were computed for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_revision: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_metrics: Option<GlobalMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community_structure: Option<CommunityStructure>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_influencers: Vec<KeyInfluencer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_balance: Option<f64>,
}

impl Default for GraphMeta {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            revision: 0,
            last_modified: 0,
            last_saved: None,
            metrics_revision: None,
            global_metrics: None,
            community_structure: None,
            key_influencers: Vec::new(),
            global_balance: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// The canonical document: `{ nodes, edges, meta }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub(crate) meta: GraphMeta,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from parts, dropping edges with a missing endpoint,
    /// self-loops, and repeated triples.
    pub fn from_parts(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        let mut graph = Self {
            nodes,
            edges: Vec::new(),
            meta: GraphMeta::default(),
        };
        let mut seen = HashSet::new();
        let ids: HashSet<String> = graph.nodes.iter().map(|n| n.id.clone()).collect();
        for edge in edges {
            if edge.source == edge.target
                || !ids.contains(&edge.source)
                || !ids.contains(&edge.target)
            {
                continue;
            }
            let key = (edge.source.clone(), edge.target.clone(), edge.relation_type);
            if seen.insert(key) {
                graph.edges.push(edge);
            }
        }
        graph
    }

    pub fn meta(&self) -> &GraphMeta {
        &self.meta
    }

    pub fn revision(&self) -> u64 {
        self.meta.revision
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub(crate) fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.node(id).is_some()
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    pub fn node_ids(&self) -> HashSet<&str> {
        self.nodes.iter().map(|n| n.id.as_str()).collect()
    }

    /// Whether an edge with this `(source, target, relation)` triple exists.
    pub fn has_triple(&self, source: &str, target: &str, relation: RelationType) -> bool {
        self.edges
            .iter()
            .any(|e| e.triple() == (source, target, relation))
    }

    /// Edges touching `id` in either direction.
    pub fn incident_edges<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.source == id || e.target == id)
    }

    /// Whether the stored metrics were computed for the current revision.
    pub fn metrics_current(&self) -> bool {
        self.meta.metrics_revision == Some(self.meta.revision)
    }

    /// Record a content mutation.
    pub(crate) fn touch(&mut self) {
        self.meta.revision += 1;
        self.meta.last_modified = now_millis().max(self.meta.last_modified);
    }

    pub(crate) fn mark_saved(&mut self, at: u64) {
        self.meta.last_saved = Some(at);
    }
}
