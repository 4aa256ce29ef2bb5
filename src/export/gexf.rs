//! GEXF 1.2 writer.
//!
//! Node and edge attribute tables mirror the data model's content and metric
//! fields. An absent value produces no `<attvalue>`, so Gephi shows it as
//! missing rather than as zero.

use crate::graph::{Edge, EdgeSign, Graph, Node};

use super::joined_uris;

/// `(id, title, type)` of every node attribute.
const NODE_ATTRIBUTES: [(&str, &str, &str); 14] = [
    ("type", "Type", "string"),
    ("description", "Description", "string"),
    ("validity", "Validity", "string"),
    ("region_label", "Region", "string"),
    ("importance", "Importance", "double"),
    ("certainty", "Certainty", "string"),
    ("pagerank", "PageRank", "double"),
    ("louvainCommunity", "Community", "integer"),
    ("degreeCentrality", "Degree Centrality", "double"),
    ("betweenness", "Betweenness Centrality", "double"),
    ("closeness", "Closeness Centrality", "double"),
    ("clustering", "Clustering Coefficient", "double"),
    ("vulnerabilityScore", "Vulnerability Score", "double"),
    ("sources_uri", "Sources URI", "string"),
];

const EDGE_ATTRIBUTES: [(&str, &str, &str); 6] = [
    ("relationType", "Relation Type", "string"),
    ("temporal", "Temporal", "string"),
    ("weight", "Weight", "double"),
    ("sign", "Sign", "string"),
    ("certainty", "Certainty", "string"),
    ("sources_uri", "Sources URI", "string"),
];

/// Escape text for use inside an XML attribute value.
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn attribute_table(out: &mut String, class: &str, attributes: &[(&str, &str, &str)]) {
    out.push_str(&format!("    <attributes class=\"{class}\">\n"));
    for (id, title, kind) in attributes {
        out.push_str(&format!(
            "      <attribute id=\"{id}\" title=\"{title}\" type=\"{kind}\"/>\n"
        ));
    }
    out.push_str("    </attributes>\n");
}

fn attvalues(out: &mut String, values: &[(&str, Option<String>)]) {
    out.push_str("        <attvalues>\n");
    for (key, value) in values {
        if let Some(value) = value {
            out.push_str(&format!(
                "          <attvalue for=\"{key}\" value=\"{}\"/>\n",
                escape_xml(value)
            ));
        }
    }
    out.push_str("        </attvalues>\n");
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

fn node_values(node: &Node) -> Vec<(&'static str, Option<String>)> {
    let metrics = node.metrics();
    vec![
        ("type", Some(node.node_type.as_str().to_string())),
        ("description", node.description.clone()),
        ("validity", node.validity.as_ref().map(ToString::to_string)),
        ("region_label", node.region.as_ref().map(|r| r.label.clone())),
        ("importance", node.importance.map(|v| v.to_string())),
        ("certainty", Some(node.certainty.as_str().to_string())),
        ("pagerank", metrics.pagerank.map(|v| v.to_string())),
        ("louvainCommunity", metrics.community.map(|v| v.to_string())),
        ("degreeCentrality", metrics.degree_centrality.map(|v| v.to_string())),
        ("betweenness", metrics.betweenness.map(|v| v.to_string())),
        ("closeness", metrics.closeness.map(|v| v.to_string())),
        ("clustering", metrics.clustering.map(|v| v.to_string())),
        (
            "vulnerabilityScore",
            metrics
                .network_health
                .as_ref()
                .map(|h| h.vulnerability_score.to_string()),
        ),
        ("sources_uri", non_empty(joined_uris(&node.sources))),
    ]
}

fn edge_values(edge: &Edge) -> Vec<(&'static str, Option<String>)> {
    vec![
        ("relationType", Some(edge.relation_type.as_str().to_string())),
        ("temporal", edge.temporal.as_ref().map(ToString::to_string)),
        ("weight", edge.weight().map(|v| v.to_string())),
        (
            "sign",
            Some(edge.sign.unwrap_or(EdgeSign::Positive).as_str().to_string()),
        ),
        ("certainty", Some(edge.certainty.as_str().to_string())),
        ("sources_uri", non_empty(joined_uris(&edge.sources))),
    ]
}

/// Serialize `graph` as a directed, static GEXF 1.2draft document.
pub fn to_gexf(graph: &Graph) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<gexf xmlns=\"http://www.gexf.net/1.2draft\" version=\"1.2\">\n");
    out.push_str("  <graph mode=\"static\" defaultedgetype=\"directed\">\n");
    attribute_table(&mut out, "node", &NODE_ATTRIBUTES);
    attribute_table(&mut out, "edge", &EDGE_ATTRIBUTES);

    out.push_str("    <nodes>\n");
    for node in &graph.nodes {
        out.push_str(&format!(
            "      <node id=\"{}\" label=\"{}\">\n",
            escape_xml(&node.id),
            escape_xml(&node.label)
        ));
        attvalues(&mut out, &node_values(node));
        out.push_str("      </node>\n");
    }
    out.push_str("    </nodes>\n");

    out.push_str("    <edges>\n");
    for edge in &graph.edges {
        let label = edge
            .label
            .clone()
            .unwrap_or_else(|| edge.relation_type.as_str().to_string());
        out.push_str(&format!(
            "      <edge id=\"{}\" source=\"{}\" target=\"{}\" label=\"{}\">\n",
            escape_xml(&edge.id),
            escape_xml(&edge.source),
            escape_xml(&edge.target),
            escape_xml(&label)
        ));
        attvalues(&mut out, &edge_values(edge));
        out.push_str("      </edge>\n");
    }
    out.push_str("    </edges>\n");
    out.push_str("  </graph>\n</gexf>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{RelationType, TemporalFact};

    fn graph() -> Graph {
        let mut graph = Graph::new();
        graph.nodes = vec![
            Node::new("a", "Dmowski & \"Co\"").with_validity(TemporalFact::interval("1864", "1939")),
            Node::new("b", "Liga <Narodowa>"),
        ];
        graph.edges = vec![Edge::new("e1", "a", "b", RelationType::Founded)];
        graph
    }

    #[test]
    fn escapes_markup_in_labels() {
        let xml = to_gexf(&graph());
        assert!(xml.contains("label=\"Dmowski &amp; &quot;Co&quot;\""));
        assert!(xml.contains("label=\"Liga &lt;Narodowa&gt;\""));
    }

    #[test]
    fn absent_metrics_are_omitted() {
        let xml = to_gexf(&graph());
        assert!(xml.contains("<attribute id=\"pagerank\" title=\"PageRank\" type=\"double\"/>"));
        assert!(!xml.contains("<attvalue for=\"pagerank\""));
        assert!(!xml.contains("<attvalue for=\"weight\""));
        assert!(xml.contains("<attvalue for=\"validity\" value=\"1864-1939\"/>"));
    }

    #[test]
    fn computed_metrics_are_written() {
        let mut graph = graph();
        graph.nodes[0].metrics.pagerank = Some(0.25);
        graph.nodes[0].metrics.community = Some(2);
        let xml = to_gexf(&graph);
        assert!(xml.contains("<attvalue for=\"pagerank\" value=\"0.25\"/>"));
        assert!(xml.contains("<attvalue for=\"louvainCommunity\" value=\"2\"/>"));
    }

    #[test]
    fn edges_default_to_relation_label_and_positive_sign() {
        let xml = to_gexf(&graph());
        assert!(xml.contains("<edge id=\"e1\" source=\"a\" target=\"b\" label=\"founded\">"));
        assert!(xml.contains("<attvalue for=\"sign\" value=\"positive\"/>"));
    }
}
